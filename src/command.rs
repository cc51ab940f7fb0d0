//! Shell commands.
//!
//! A line typed into the shell is either a dot command (`.exit`, `.mode table`, ...) or
//! SQL sent to the server as is. [`Command`] is the parsed form of that line.
//!
//! # Example
//! ```rust
//! use xproto::Command;
//!
//! let cmd: Command = ".find people age > 21".try_into().unwrap();
//! assert_eq!(
//!     cmd,
//!     Command::Find { target: "people".into(), filter: Some("age > 21".into()) }
//! );
//! ```
use thiserror::Error;

use crate::expr::Mode;

/// List of possible error that a command can throw.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("unrecognized command '{0}'")]
    UnrecognizedCommand(String),

    #[error("invalid '{command}' command, {reason}")]
    InvalidCommandArguments { command: String, reason: String },

    #[error("no command provided")]
    Empty,

    #[error("failed to read input: {0}")]
    Io(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `.exit`: close the session and leave.
    Exit,
    /// `.mode doc|table`: grammar used by `.parse` and `.find`.
    Mode(Mode),
    /// `.parse <expr>`: compile an expression and print its tree.
    Parse(String),
    /// `.find <collection> [filter]`
    Find {
        target: String,
        filter: Option<String>,
    },
    /// `.reset`: reset the server side session state.
    Reset,
    /// Anything else is SQL.
    Sql(String),
}

fn split_command(s: &str) -> (&str, &str) {
    match s.split_once(char::is_whitespace) {
        Some((cmd, rest)) => (cmd, rest.trim()),
        None => (s, ""),
    }
}

impl TryFrom<&str> for Command {
    type Error = CommandError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let s = value.trim();
        if s.is_empty() {
            return Err(CommandError::Empty);
        }
        if !s.starts_with('.') {
            return Ok(Command::Sql(s.trim_end_matches(';').to_string()));
        }

        let (command, args) = split_command(s);
        let invalid = |reason: &str| CommandError::InvalidCommandArguments {
            command: command.to_string(),
            reason: reason.to_string(),
        };

        match command {
            ".exit" | ".quit" => Ok(Command::Exit),
            ".reset" => Ok(Command::Reset),
            ".mode" => match args {
                "doc" | "document" => Ok(Command::Mode(Mode::Document)),
                "table" | "sql" => Ok(Command::Mode(Mode::Table)),
                _ => Err(invalid("expected 'doc' or 'table'. Example: .mode table")),
            },
            ".parse" if args.is_empty() => Err(invalid("requires an expression. Example: .parse a > 1")),
            ".parse" => Ok(Command::Parse(args.to_string())),
            ".find" => {
                let (target, filter) = split_command(args);
                if target.is_empty() {
                    return Err(invalid("requires a collection name. Example: .find people age > 21"));
                }
                Ok(Command::Find {
                    target: target.to_string(),
                    filter: (!filter.is_empty()).then(|| filter.to_string()),
                })
            }
            other => Err(CommandError::UnrecognizedCommand(other.to_string())),
        }
    }
}

//! X Protocol client.
//!
//! - [`expr`]: compiles filter, sort and projection strings into expression trees.
//! - [`protocol`]: framing, message codec, authentication, the work queue and
//!   resultset decoding.
//! - [`Session`]: an asynchronous connection built on top of both.
pub mod cli;
pub mod command;
pub mod config;
pub mod cursor;
pub mod expr;
pub mod protocol;
pub mod session;
pub mod statement;

pub use command::{Command, CommandError};
pub use config::{ConnectionParams, TlsMode};
pub use protocol::ProtocolError;
pub use session::Session;
pub use statement::{FindStatement, SqlStatement, StatementError};

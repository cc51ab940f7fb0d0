//! CLI utilities for the X Protocol shell.
//!
//! Reading commands from a prompt and rendering results as tab-separated text.
use std::io::{BufRead, Write};

use crate::{
    Command, CommandError,
    expr::Mode,
    protocol::{ColumnMeta, Outcome, Row},
};

/// Prompt user for a shell command. End of input reads as [`Command::Exit`].
pub fn prompt<R, W>(mut reader: R, mut writer: W, mode: Mode) -> Result<Command, CommandError>
where
    R: BufRead,
    W: Write,
{
    let label = match mode {
        Mode::Document => "doc",
        Mode::Table => "table",
    };
    write!(&mut writer, "{label}> ").map_err(|e| CommandError::Io(e.to_string()))?;
    writer.flush().map_err(|e| CommandError::Io(e.to_string()))?;

    let mut s = String::default();
    let read = reader
        .read_line(&mut s)
        .map_err(|e| CommandError::Io(e.to_string()))?;
    if read == 0 {
        return Ok(Command::Exit);
    }
    s.as_str().try_into()
}

pub fn format_header(columns: &[ColumnMeta]) -> String {
    columns
        .iter()
        .map(|c| c.name.as_str())
        .collect::<Vec<_>>()
        .join("\t")
}

pub fn format_row(row: &Row) -> String {
    row.values()
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\t")
}

/// Summary line printed after a statement, followed by its warnings.
pub fn format_outcome(rows: usize, outcome: &Outcome) -> String {
    let plural = |n: u64| if n == 1 { "" } else { "s" };
    let mut out = match outcome.rows_affected {
        Some(n) if rows == 0 => format!("Query OK, {n} row{} affected", plural(n)),
        _ => format!("{rows} row{} in set", plural(rows as u64)),
    };
    if let Some(id) = outcome.last_insert_id.filter(|id| *id > 0) {
        out.push_str(&format!(", last insert id {id}"));
    }
    for id in &outcome.generated_ids {
        out.push_str(&format!("\ngenerated id: {id}"));
    }
    for w in &outcome.warnings {
        out.push_str(&format!("\n{:?} ({}): {}", w.level, w.code, w.message));
    }
    out
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::protocol::{ColumnType, Value, Warning, message::WarningLevel};

    #[test]
    fn prompt_prints_correctly() {
        let input = b".exit\n";
        let mut output = Vec::new();

        prompt(&input[..], &mut output, Mode::Table).unwrap();

        let output = String::from_utf8(output).expect("not valid UTF-8");
        assert_eq!("table> ", output);
    }

    #[test]
    fn prompt_handles_statements() {
        let input = b"SELECT 1\n";
        let mut output = Vec::new();

        let res = prompt(&input[..], &mut output, Mode::Document).unwrap();
        assert_eq!(Command::Sql("SELECT 1".into()), res);
    }

    #[test]
    fn prompt_end_of_input_exits() {
        let mut output = Vec::new();
        assert_eq!(prompt(&b""[..], &mut output, Mode::Table).unwrap(), Command::Exit);
    }

    #[test]
    #[should_panic(expected = "unrecognized command '.something_wrong'")]
    fn prompt_unrecognized_command() {
        let input = b".something_wrong\n";
        let mut output = Vec::new();

        prompt(&input[..], &mut output, Mode::Table)
            .map_err(|e| e.to_string())
            .unwrap();
    }

    #[test]
    fn rows_are_tab_separated() {
        let columns = Arc::new(vec![
            ColumnMeta {
                name: "id".into(),
                column_type: ColumnType::Uint,
                ..Default::default()
            },
            ColumnMeta {
                name: "name".into(),
                ..Default::default()
            },
        ]);
        let row = Row::new(Arc::clone(&columns), vec![Value::UInt(1), Value::Null]);
        assert_eq!(format_header(&columns), "id\tname");
        assert_eq!(format_row(&row), "1\tNULL");
    }

    #[test]
    fn outcome_summary() {
        let mut outcome = Outcome {
            rows_affected: Some(1),
            last_insert_id: Some(7),
            ..Default::default()
        };
        assert_eq!(format_outcome(0, &outcome), "Query OK, 1 row affected, last insert id 7");

        outcome.warnings.push(Warning {
            level: WarningLevel::Warning,
            code: 1265,
            message: "Data truncated".into(),
        });
        assert_eq!(
            format_outcome(2, &outcome),
            "2 rows in set, last insert id 7\nWarning (1265): Data truncated"
        );
    }
}

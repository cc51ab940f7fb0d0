//! Resultset decoding.
//!
//! Frames routed to a statement arrive as a sequence of column metadata, rows and fetch
//! markers, closed by a terminal `StmtExecuteOk`. [`ResultSetBuilder`] turns that
//! sequence into [`ResultEvent`]s, and [`StatementHandler`] forwards them to the
//! [`Execution`] held by the caller, in the order the server sent them.
use std::sync::Arc;

use log::{debug, warn};
use tokio::sync::{mpsc, oneshot};

use crate::expr::Scalar;

use super::{
    ProtocolError,
    codec::{Notice, ServerMessage},
    message::{self, FieldType, SessionStateParameter, WarningLevel},
    queue::{Disposition, ResponseHandler},
    row::{Row, decode_row},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColumnType {
    Sint,
    Uint,
    Double,
    Float,
    #[default]
    Bytes,
    Time,
    Datetime,
    Set,
    Enum,
    Bit,
    Decimal,
}

impl From<FieldType> for ColumnType {
    fn from(value: FieldType) -> Self {
        match value {
            FieldType::Sint => ColumnType::Sint,
            FieldType::Uint => ColumnType::Uint,
            FieldType::Double => ColumnType::Double,
            FieldType::Float => ColumnType::Float,
            FieldType::Bytes => ColumnType::Bytes,
            FieldType::Time => ColumnType::Time,
            FieldType::Datetime => ColumnType::Datetime,
            FieldType::Set => ColumnType::Set,
            FieldType::Enum => ColumnType::Enum,
            FieldType::Bit => ColumnType::Bit,
            FieldType::Decimal => ColumnType::Decimal,
        }
    }
}

/// Description of one resultset column.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ColumnMeta {
    pub column_type: ColumnType,
    /// Label as written in the query (alias if any).
    pub name: String,
    pub original_name: String,
    pub table: String,
    pub original_table: String,
    pub schema: String,
    pub catalog: String,
    pub collation: u64,
    pub fractional_digits: u32,
    pub length: u32,
    pub flags: u32,
    pub content_type: u32,
}

impl ColumnMeta {
    pub fn is_json(&self) -> bool {
        self.column_type == ColumnType::Bytes && self.content_type == super::codec::CONTENT_TYPE_JSON
    }
}

impl TryFrom<message::ColumnMetaData> for ColumnMeta {
    type Error = ProtocolError;

    fn try_from(value: message::ColumnMetaData) -> Result<Self, Self::Error> {
        let field_type = FieldType::try_from(value.r#type)
            .map_err(|_| ProtocolError::Decode(format!("column type {}", value.r#type)))?;
        let text = |b: Option<Vec<u8>>| b.map(|b| String::from_utf8_lossy(&b).into_owned()).unwrap_or_default();

        Ok(ColumnMeta {
            column_type: field_type.into(),
            name: text(value.name),
            original_name: text(value.original_name),
            table: text(value.table),
            original_table: text(value.original_table),
            schema: text(value.schema),
            catalog: text(value.catalog),
            collation: value.collation.unwrap_or_default(),
            fractional_digits: value.fractional_digits.unwrap_or_default(),
            length: value.length.unwrap_or_default(),
            flags: value.flags.unwrap_or_default(),
            content_type: value.content_type.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Warning {
    pub level: WarningLevel,
    pub code: u32,
    pub message: String,
}

/// What a statement has produced so far, in server order.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultEvent {
    /// Columns of the resultset that the following rows belong to.
    Metadata(Arc<Vec<ColumnMeta>>),
    Row(Row),
    /// The current resultset is complete. `has_more` is set when another one follows
    /// for the same statement.
    ResultSetEnd { has_more: bool },
}

/// A fully collected resultset.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResultSet {
    pub columns: Arc<Vec<ColumnMeta>>,
    pub rows: Vec<Row>,
    pub warnings: Vec<Warning>,
    pub has_more: bool,
}

/// Statement-level results reported outside of the rows.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Outcome {
    pub warnings: Vec<Warning>,
    pub rows_affected: Option<u64>,
    pub last_insert_id: Option<u64>,
    pub generated_ids: Vec<String>,
    pub rows_found: Option<u64>,
    pub rows_matched: Option<u64>,
    pub messages: Vec<String>,
    pub current_schema: Option<String>,
    /// Text of the terminal `Ok`, when the server sends one.
    pub info: Option<String>,
}

impl Outcome {
    /// Folds a local notice into the outcome.
    pub fn apply(&mut self, notice: &Notice) {
        match notice {
            Notice::Warning(w) => self.warnings.push(w.clone()),
            Notice::SessionStateChanged { param, values } => {
                let first = values.first();
                match param {
                    SessionStateParameter::RowsAffected => self.rows_affected = first.and_then(as_u64),
                    SessionStateParameter::RowsFound => self.rows_found = first.and_then(as_u64),
                    SessionStateParameter::RowsMatched => self.rows_matched = first.and_then(as_u64),
                    SessionStateParameter::GeneratedInsertId => self.last_insert_id = first.and_then(as_u64),
                    SessionStateParameter::GeneratedDocumentIds => {
                        self.generated_ids.extend(values.iter().filter_map(as_text))
                    }
                    SessionStateParameter::ProducedMessage => {
                        self.messages.extend(values.iter().filter_map(as_text))
                    }
                    SessionStateParameter::CurrentSchema => self.current_schema = first.and_then(as_text),
                    _ => {}
                }
            }
            Notice::SessionVariableChanged { .. } | Notice::Other(_) => {}
        }
    }
}

fn as_u64(value: &Scalar) -> Option<u64> {
    match value {
        Scalar::UnsignedInt(v) => Some(*v),
        Scalar::SignedInt(v) => u64::try_from(*v).ok(),
        _ => None,
    }
}

fn as_text(value: &Scalar) -> Option<String> {
    match value {
        Scalar::Str(s) | Scalar::ExactString(s) => Some(s.clone()),
        Scalar::Bytes(b) => Some(String::from_utf8_lossy(b).into_owned()),
        _ => None,
    }
}

/// Incremental decoder for the resultsets of one statement.
///
/// Metadata frames accumulate until the first row (or the end of the resultset) fixes
/// the column list, which is then shared by every row decoded against it.
#[derive(Debug, Default)]
pub struct ResultSetBuilder {
    pending: Vec<ColumnMeta>,
    columns: Option<Arc<Vec<ColumnMeta>>>,
    rows: u64,
}

impl ResultSetBuilder {
    pub fn push_column(&mut self, meta: ColumnMeta) -> Result<(), ProtocolError> {
        if self.columns.is_some() {
            return Err(ProtocolError::Violation(
                "column metadata after the first row of a resultset".to_string(),
            ));
        }
        self.pending.push(meta);
        Ok(())
    }

    /// Decodes a row. The first row of a resultset is preceded by its metadata event.
    pub fn row(&mut self, fields: Vec<Vec<u8>>) -> Result<Vec<ResultEvent>, ProtocolError> {
        let mut events = Vec::with_capacity(2);
        if let Some(metadata) = self.seal() {
            events.push(metadata);
        }
        let columns = self.columns.as_ref().ok_or_else(|| {
            ProtocolError::Violation("row without column metadata".to_string())
        })?;
        events.push(ResultEvent::Row(decode_row(columns, fields)?));
        self.rows += 1;
        Ok(events)
    }

    /// Closes the current resultset and resets the column list for the next one.
    pub fn end(&mut self, has_more: bool) -> Vec<ResultEvent> {
        let mut events = Vec::with_capacity(2);
        if let Some(metadata) = self.seal() {
            events.push(metadata);
        }
        debug!("resultset done after {} rows, more={has_more}", self.rows);
        self.columns = None;
        self.rows = 0;
        events.push(ResultEvent::ResultSetEnd { has_more });
        events
    }

    fn seal(&mut self) -> Option<ResultEvent> {
        if self.columns.is_some() || self.pending.is_empty() {
            return None;
        }
        let columns = Arc::new(std::mem::take(&mut self.pending));
        self.columns = Some(Arc::clone(&columns));
        Some(ResultEvent::Metadata(columns))
    }
}

type Settle = oneshot::Sender<Result<Outcome, ProtocolError>>;

/// Queue entry of a statement execution.
pub struct StatementHandler {
    builder: ResultSetBuilder,
    outcome: Outcome,
    events: Option<mpsc::UnboundedSender<ResultEvent>>,
    settle: Option<Settle>,
}

impl StatementHandler {
    fn emit(&mut self, events: Vec<ResultEvent>) {
        if let Some(tx) = &self.events {
            for event in events {
                if tx.send(event).is_err() {
                    // The caller dropped its execution; keep consuming frames until the
                    // statement settles so the queue stays in step with the server.
                    debug!("execution abandoned, discarding its remaining events");
                    self.events = None;
                    break;
                }
            }
        }
    }

    fn complete(&mut self, info: Option<String>) -> Disposition {
        let mut outcome = std::mem::take(&mut self.outcome);
        outcome.info = info;
        self.settle(Ok(outcome));
        Disposition::Settled
    }

    fn settle(&mut self, result: Result<Outcome, ProtocolError>) {
        self.events = None;
        if let Some(tx) = self.settle.take() {
            let _ = tx.send(result);
        }
    }
}

impl ResponseHandler for StatementHandler {
    fn handle(&mut self, message: ServerMessage) -> Result<Disposition, ProtocolError> {
        match message {
            ServerMessage::ColumnMetaData(meta) => self.builder.push_column(meta)?,
            ServerMessage::Row(fields) => {
                let events = self.builder.row(fields)?;
                self.emit(events);
            }
            ServerMessage::FetchDone => {
                let events = self.builder.end(false);
                self.emit(events);
            }
            ServerMessage::FetchDoneMoreResultsets | ServerMessage::FetchDoneMoreOutParams => {
                let events = self.builder.end(true);
                self.emit(events);
            }
            ServerMessage::StmtExecuteOk => return Ok(self.complete(None)),
            ServerMessage::Ok(info) => return Ok(self.complete(info)),
            ServerMessage::Error(e) => return Err(e),
            ServerMessage::Unknown(tag) => warn!("ignoring unknown frame {tag} in a statement response"),
            other => {
                return Err(ProtocolError::Violation(format!(
                    "unexpected {} while executing a statement",
                    other.name()
                )));
            }
        }
        Ok(Disposition::Pending)
    }

    fn notice(&mut self, notice: &Notice) {
        self.outcome.apply(notice);
    }

    fn fail(mut self: Box<Self>, error: ProtocolError) {
        self.settle(Err(error));
    }
}

/// Caller side of a statement: the ordered event stream and the final outcome.
pub struct Execution {
    events: mpsc::UnboundedReceiver<ResultEvent>,
    settled: oneshot::Receiver<Result<Outcome, ProtocolError>>,
}

impl Execution {
    /// Creates a connected handler and execution pair.
    pub fn channel() -> (StatementHandler, Execution) {
        let (events_tx, events) = mpsc::unbounded_channel();
        let (settle_tx, settled) = oneshot::channel();
        let handler = StatementHandler {
            builder: ResultSetBuilder::default(),
            outcome: Outcome::default(),
            events: Some(events_tx),
            settle: Some(settle_tx),
        };
        (handler, Execution { events, settled })
    }

    /// Next event, or `None` once the statement has settled and every event was read.
    pub async fn next_event(&mut self) -> Option<ResultEvent> {
        self.events.recv().await
    }

    /// Next event if one is already buffered.
    pub fn try_next_event(&mut self) -> Option<ResultEvent> {
        self.events.try_recv().ok()
    }

    /// Next row across all resultsets of the statement.
    pub async fn next_row(&mut self) -> Option<Row> {
        while let Some(event) = self.next_event().await {
            if let ResultEvent::Row(row) = event {
                return Some(row);
            }
        }
        None
    }

    /// Discards any unread events and waits for the statement to settle.
    pub async fn finish(mut self) -> Result<Outcome, ProtocolError> {
        while self.events.recv().await.is_some() {}
        self.settled.await.unwrap_or(Err(ProtocolError::ConnectionClosed))
    }

    /// Gathers every resultset and the outcome.
    ///
    /// Warnings are reported after the last fetch marker, so they are attached to the
    /// final resultset.
    pub async fn collect(mut self) -> Result<(Vec<ResultSet>, Outcome), ProtocolError> {
        let mut sets = Vec::new();
        let mut current: Option<ResultSet> = None;

        while let Some(event) = self.events.recv().await {
            match event {
                ResultEvent::Metadata(columns) => {
                    current = Some(ResultSet {
                        columns,
                        ..Default::default()
                    })
                }
                ResultEvent::Row(row) => current.get_or_insert_with(ResultSet::default).rows.push(row),
                ResultEvent::ResultSetEnd { has_more } => {
                    let mut set = current.take().unwrap_or_default();
                    set.has_more = has_more;
                    sets.push(set);
                }
            }
        }
        if let Some(set) = current {
            sets.push(set);
        }

        let outcome = self.settled.await.unwrap_or(Err(ProtocolError::ConnectionClosed))?;
        if let Some(last) = sets.last_mut() {
            last.warnings = outcome.warnings.clone();
        }
        Ok((sets, outcome))
    }
}

//! Column value decoding.
//!
//! Row fields arrive as raw bytes whose layout depends on the column type announced by
//! the preceding metadata. An empty field is always `NULL`.
use std::{fmt, sync::Arc};

use crate::cursor::Cursor;

use super::{
    ProtocolError,
    codec::CONTENT_TYPE_JSON,
    resultset::{ColumnMeta, ColumnType},
};

/// Collation id of the `binary` character set.
const BINARY_COLLATION: u64 = 63;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Time {
    pub negative: bool,
    pub hours: u32,
    pub minutes: u32,
    pub seconds: u32,
    pub micros: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DateTime {
    pub year: u32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
    pub micros: u32,
    /// False for `DATE` columns, which carry no time of day.
    pub has_time: bool,
}

/// A decoded column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    UInt(u64),
    Double(f64),
    Float(f32),
    Text(String),
    Bytes(Vec<u8>),
    Json(serde_json::Value),
    /// Exact decimal text, never rounded through a float.
    Decimal(String),
    Time(Time),
    DateTime(DateTime),
    Set(Vec<String>),
    Enum(String),
    Bit(u64),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

/// One row of a resultset.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<Vec<ColumnMeta>>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(columns: Arc<Vec<ColumnMeta>>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    pub fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Value of the first column labelled `name`.
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c.name == name)
            .and_then(|i| self.values.get(i))
    }
}

/// Decodes every field of a row against the current column metadata.
pub fn decode_row(columns: &Arc<Vec<ColumnMeta>>, fields: Vec<Vec<u8>>) -> Result<Row, ProtocolError> {
    if fields.len() != columns.len() {
        return Err(ProtocolError::Violation(format!(
            "row has {} fields but {} columns were announced",
            fields.len(),
            columns.len()
        )));
    }
    let values = columns
        .iter()
        .zip(fields.iter())
        .map(|(meta, field)| decode_value(meta, field))
        .collect::<Result<_, _>>()?;
    Ok(Row::new(Arc::clone(columns), values))
}

pub fn decode_value(meta: &ColumnMeta, field: &[u8]) -> Result<Value, ProtocolError> {
    if field.is_empty() {
        return Ok(Value::Null);
    }
    let mut cursor = Cursor::new(field);

    Ok(match meta.column_type {
        ColumnType::Sint => Value::Int(cursor.read_zigzag_i64()?),
        ColumnType::Uint => Value::UInt(cursor.read_varint_u64()?),
        ColumnType::Bit => Value::Bit(cursor.read_varint_u64()?),
        ColumnType::Double => Value::Double(cursor.read_f64_le()?),
        ColumnType::Float => Value::Float(cursor.read_f32_le()?),
        ColumnType::Bytes => {
            let bytes = strip_pad(field);
            if meta.content_type == CONTENT_TYPE_JSON {
                Value::Json(
                    serde_json::from_slice(bytes)
                        .map_err(|e| ProtocolError::Decode(format!("JSON column {}: {e}", meta.name)))?,
                )
            } else if meta.collation == BINARY_COLLATION {
                Value::Bytes(bytes.to_vec())
            } else {
                match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => Value::Text(text),
                    Err(e) => Value::Bytes(e.into_bytes()),
                }
            }
        }
        ColumnType::Enum => Value::Enum(String::from_utf8_lossy(strip_pad(field)).into_owned()),
        ColumnType::Set => Value::Set(set(&mut cursor)?),
        ColumnType::Time => Value::Time(time(&mut cursor)?),
        ColumnType::Datetime => Value::DateTime(datetime(&mut cursor)?),
        ColumnType::Decimal => Value::Decimal(decimal(&mut cursor)?),
    })
}

/// Strings carry one trailing pad byte so that an empty string differs from `NULL`.
fn strip_pad(field: &[u8]) -> &[u8] {
    &field[..field.len().saturating_sub(1)]
}

fn small(cursor: &mut Cursor) -> Result<u32, ProtocolError> {
    let v = cursor.read_varint_u64()?;
    u32::try_from(v).map_err(|_| ProtocolError::Decode(format!("temporal component {v} out of range")))
}

fn optional_small(cursor: &mut Cursor) -> Result<u32, ProtocolError> {
    if cursor.remaining() == 0 {
        Ok(0)
    } else {
        small(cursor)
    }
}

fn time(cursor: &mut Cursor) -> Result<Time, ProtocolError> {
    let negative = cursor.read_byte()? == 0x01;
    Ok(Time {
        negative,
        hours: optional_small(cursor)?,
        minutes: optional_small(cursor)?,
        seconds: optional_small(cursor)?,
        micros: optional_small(cursor)?,
    })
}

fn datetime(cursor: &mut Cursor) -> Result<DateTime, ProtocolError> {
    let year = small(cursor)?;
    let month = small(cursor)?;
    let day = small(cursor)?;
    let has_time = cursor.remaining() > 0;
    Ok(DateTime {
        year,
        month,
        day,
        hour: optional_small(cursor)?,
        minute: optional_small(cursor)?,
        second: optional_small(cursor)?,
        micros: optional_small(cursor)?,
        has_time,
    })
}

/// `0x01` alone is the empty set, `0x00` alone a set holding one empty string.
/// Anything else is a sequence of varint length-prefixed items.
fn set(cursor: &mut Cursor) -> Result<Vec<String>, ProtocolError> {
    if cursor.len() == 1 {
        return match cursor.read_byte()? {
            0x01 => Ok(Vec::new()),
            0x00 => Ok(vec![String::new()]),
            other => Err(ProtocolError::Decode(format!("SET value 0x{other:02x}"))),
        };
    }
    let mut items = Vec::new();
    while cursor.remaining() > 0 {
        let len = cursor.read_varint_u64()? as usize;
        items.push(String::from_utf8_lossy(cursor.read_slice(len)?).into_owned());
    }
    Ok(items)
}

/// Packed BCD: a scale byte, then two digits per byte closed by a sign nibble
/// (`0xc` positive, `0xd` negative).
fn decimal(cursor: &mut Cursor) -> Result<String, ProtocolError> {
    let scale = cursor.read_byte()? as usize;
    let mut digits = String::new();
    let mut negative = None;

    'bytes: for byte in cursor.read_rest() {
        for nibble in [byte >> 4, byte & 0x0f] {
            match nibble {
                0..=9 => digits.push(char::from(b'0' + nibble)),
                0x0c => {
                    negative = Some(false);
                    break 'bytes;
                }
                0x0d => {
                    negative = Some(true);
                    break 'bytes;
                }
                other => return Err(ProtocolError::Decode(format!("decimal nibble 0x{other:x}"))),
            }
        }
    }
    let negative = negative.ok_or_else(|| ProtocolError::Decode("decimal without sign".to_string()))?;

    if digits.len() <= scale {
        digits = format!("{}{digits}", "0".repeat(scale + 1 - digits.len()));
    }
    let (int, frac) = digits.split_at(digits.len() - scale);
    let int = match int.trim_start_matches('0') {
        "" => "0",
        trimmed => trimmed,
    };

    let mut out = String::with_capacity(digits.len() + 2);
    if negative {
        out.push('-');
    }
    out.push_str(int);
    if scale > 0 {
        out.push('.');
        out.push_str(frac);
    }
    Ok(out)
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negative {
            write!(f, "-")?;
        }
        write!(f, "{:02}:{:02}:{:02}", self.hours, self.minutes, self.seconds)?;
        if self.micros > 0 {
            write!(f, ".{:06}", self.micros)?;
        }
        Ok(())
    }
}

impl fmt::Display for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)?;
        if self.has_time {
            write!(f, " {:02}:{:02}:{:02}", self.hour, self.minute, self.second)?;
            if self.micros > 0 {
                write!(f, ".{:06}", self.micros)?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Int(v) => write!(f, "{v}"),
            Value::UInt(v) | Value::Bit(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Text(s) | Value::Enum(s) | Value::Decimal(s) => write!(f, "{s}"),
            Value::Bytes(b) => write!(f, "0x{}", hex::encode(b)),
            Value::Json(j) => write!(f, "{j}"),
            Value::Time(t) => write!(f, "{t}"),
            Value::DateTime(d) => write!(f, "{d}"),
            Value::Set(items) => write!(f, "{}", items.join(",")),
        }
    }
}

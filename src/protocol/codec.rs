//! Conversions between crate values and wire messages.
//!
//! Everything here is a pure function of its input: expression trees and scalars go
//! in, protobuf bytes come out, and the reverse for server frames. No encoder state is
//! shared between calls.
use std::fmt;

use bytes::Bytes;
use log::warn;
use prost::Message;

use crate::expr::{ColumnIdent, Expr, PathItem, Placeholder, Scalar};

use super::{
    Frame, ProtocolError, encode_frame,
    message::{self, AnyType, DocumentPathItemType, ExprType, ScalarType, SessionStateParameter, client, server},
    resultset::{ColumnMeta, Warning},
};

/// Content type marking a JSON document in octets and column metadata.
pub const CONTENT_TYPE_JSON: u32 = 2;

/// A value of the protocol's `Any` type: a scalar, an object or an array.
#[derive(Debug, Clone, PartialEq)]
pub enum AnyValue {
    Scalar(Scalar),
    Object(Vec<(String, AnyValue)>),
    Array(Vec<AnyValue>),
}

impl From<Scalar> for AnyValue {
    fn from(value: Scalar) -> Self {
        AnyValue::Scalar(value)
    }
}

impl From<&str> for AnyValue {
    fn from(value: &str) -> Self {
        AnyValue::Scalar(value.into())
    }
}

impl From<bool> for AnyValue {
    fn from(value: bool) -> Self {
        AnyValue::Scalar(value.into())
    }
}

impl From<i64> for AnyValue {
    fn from(value: i64) -> Self {
        AnyValue::Scalar(value.into())
    }
}

impl From<serde_json::Value> for AnyValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value as Json;

        match value {
            Json::Null => AnyValue::Scalar(Scalar::Null),
            Json::Bool(b) => AnyValue::Scalar(Scalar::Bool(b)),
            Json::Number(n) => AnyValue::Scalar(if let Some(u) = n.as_u64() {
                Scalar::UnsignedInt(u)
            } else if let Some(i) = n.as_i64() {
                Scalar::SignedInt(i)
            } else {
                Scalar::Double(n.as_f64().unwrap_or_default())
            }),
            Json::String(s) => AnyValue::Scalar(Scalar::Str(s)),
            Json::Array(items) => AnyValue::Array(items.into_iter().map(AnyValue::from).collect()),
            Json::Object(fields) => {
                AnyValue::Object(fields.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

impl AnyValue {
    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            AnyValue::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// String items of an array, as used by `authentication.mechanisms`.
    pub fn string_list(&self) -> Vec<String> {
        match self {
            AnyValue::Array(items) => items
                .iter()
                .filter_map(|item| match item {
                    AnyValue::Scalar(Scalar::Str(s)) => Some(s.clone()),
                    AnyValue::Scalar(Scalar::Bytes(b)) => Some(String::from_utf8_lossy(b).into_owned()),
                    _ => None,
                })
                .collect(),
            AnyValue::Scalar(Scalar::Str(s)) => vec![s.clone()],
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for AnyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnyValue::Scalar(s) => write!(f, "{s}"),
            AnyValue::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            AnyValue::Object(fields) => {
                write!(f, "{{")?;
                for (i, (k, v)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k:?}: {v}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// Wire positions of the placeholders used by one request.
///
/// Positional `?` placeholders keep their own numbers. Named placeholders follow them,
/// numbered in order of first appearance across every expression of the request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Placeholders {
    positional: u32,
    named: Vec<String>,
}

impl Placeholders {
    /// Numbers the `?` placeholders of separately parsed expressions as one sequence:
    /// each expression's positionals are shifted past those of the expressions before it.
    pub fn assign<'a>(exprs: impl IntoIterator<Item = &'a mut Expr>) -> Self {
        let mut out = Self::default();
        for expr in exprs {
            let count = expr.positional_count();
            expr.shift_positionals(out.positional);
            out.positional += count;
            expr.collect_placeholders(&mut out.named);
        }
        out
    }

    /// Placeholders of expressions whose `?` numbers are already request-wide.
    pub fn from_exprs<'a>(exprs: impl IntoIterator<Item = &'a Expr>) -> Self {
        let mut out = Self::default();
        for expr in exprs {
            out.positional = out.positional.max(expr.positional_count());
            expr.collect_placeholders(&mut out.named);
        }
        out
    }

    pub fn positional(&self) -> u32 {
        self.positional
    }

    pub fn named(&self) -> &[String] {
        &self.named
    }

    /// Total number of arguments the request has to carry.
    pub fn len(&self) -> usize {
        self.positional as usize + self.named.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn position(&self, placeholder: &Placeholder) -> u32 {
        match placeholder {
            Placeholder::Positional(p) => *p,
            Placeholder::Named(name) => {
                let index = self
                    .named
                    .iter()
                    .position(|n| n == name)
                    .unwrap_or(self.named.len());
                self.positional + index as u32
            }
        }
    }
}

pub fn encode_scalar(value: &Scalar) -> message::Scalar {
    let mut out = message::Scalar {
        r#type: ScalarType::VNull as i32,
        ..Default::default()
    };
    match value {
        Scalar::Null => {}
        Scalar::Bool(b) => {
            out.r#type = ScalarType::VBool as i32;
            out.v_bool = Some(*b);
        }
        Scalar::SignedInt(i) => {
            out.r#type = ScalarType::VSint as i32;
            out.v_signed_int = Some(*i);
        }
        Scalar::UnsignedInt(u) => {
            out.r#type = ScalarType::VUint as i32;
            out.v_unsigned_int = Some(*u);
        }
        Scalar::Double(d) => {
            out.r#type = ScalarType::VDouble as i32;
            out.v_double = Some(*d);
        }
        Scalar::ExactString(text) => {
            if let Ok(u) = text.parse::<u64>() {
                out.r#type = ScalarType::VUint as i32;
                out.v_unsigned_int = Some(u);
            } else if let Ok(i) = text.parse::<i64>() {
                out.r#type = ScalarType::VSint as i32;
                out.v_signed_int = Some(i);
            } else {
                out.r#type = ScalarType::VOctets as i32;
                out.v_octets = Some(message::ScalarOctets {
                    value: text.as_bytes().to_vec(),
                    content_type: None,
                });
            }
        }
        Scalar::Str(s) => {
            out.r#type = ScalarType::VString as i32;
            out.v_string = Some(message::ScalarString {
                value: s.as_bytes().to_vec(),
                collation: None,
            });
        }
        Scalar::Bytes(b) => {
            out.r#type = ScalarType::VOctets as i32;
            out.v_octets = Some(message::ScalarOctets {
                value: b.clone(),
                content_type: None,
            });
        }
    }
    out
}

pub fn decode_scalar(value: message::Scalar) -> Result<Scalar, ProtocolError> {
    let kind = ScalarType::try_from(value.r#type)
        .map_err(|_| ProtocolError::Decode(format!("scalar type {}", value.r#type)))?;
    let missing = || ProtocolError::Decode(format!("scalar of type {kind:?} without a value"));
    Ok(match kind {
        ScalarType::VNull => Scalar::Null,
        ScalarType::VSint => Scalar::SignedInt(value.v_signed_int.ok_or_else(missing)?),
        ScalarType::VUint => Scalar::UnsignedInt(value.v_unsigned_int.ok_or_else(missing)?),
        ScalarType::VDouble => Scalar::Double(value.v_double.ok_or_else(missing)?),
        ScalarType::VFloat => Scalar::Double(value.v_float.ok_or_else(missing)? as f64),
        ScalarType::VBool => Scalar::Bool(value.v_bool.ok_or_else(missing)?),
        ScalarType::VOctets => Scalar::Bytes(value.v_octets.ok_or_else(missing)?.value),
        ScalarType::VString => {
            let bytes = value.v_string.ok_or_else(missing)?.value;
            Scalar::Str(String::from_utf8_lossy(&bytes).into_owned())
        }
    })
}

pub fn encode_any(value: &AnyValue) -> message::Any {
    match value {
        AnyValue::Scalar(s) => message::Any {
            r#type: AnyType::Scalar as i32,
            scalar: Some(encode_scalar(s)),
            ..Default::default()
        },
        AnyValue::Object(fields) => message::Any {
            r#type: AnyType::Object as i32,
            obj: Some(message::Object {
                fld: fields
                    .iter()
                    .map(|(key, value)| message::ObjectField {
                        key: key.clone(),
                        value: Some(encode_any(value)),
                    })
                    .collect(),
            }),
            ..Default::default()
        },
        AnyValue::Array(items) => message::Any {
            r#type: AnyType::Array as i32,
            array: Some(message::Array {
                value: items.iter().map(encode_any).collect(),
            }),
            ..Default::default()
        },
    }
}

pub fn decode_any(value: message::Any) -> Result<AnyValue, ProtocolError> {
    let kind = AnyType::try_from(value.r#type)
        .map_err(|_| ProtocolError::Decode(format!("any type {}", value.r#type)))?;
    match kind {
        AnyType::Scalar => {
            let scalar = value
                .scalar
                .ok_or_else(|| ProtocolError::Decode("any without its scalar".to_string()))?;
            Ok(AnyValue::Scalar(decode_scalar(scalar)?))
        }
        AnyType::Object => {
            let fields = value.obj.map(|o| o.fld).unwrap_or_default();
            fields
                .into_iter()
                .map(|f| -> Result<(String, AnyValue), ProtocolError> {
                    let value = f
                        .value
                        .ok_or_else(|| ProtocolError::Decode(format!("object field {} without value", f.key)))?;
                    Ok((f.key, decode_any(value)?))
                })
                .collect::<Result<_, _>>()
                .map(AnyValue::Object)
        }
        AnyType::Array => value
            .array
            .map(|a| a.value)
            .unwrap_or_default()
            .into_iter()
            .map(decode_any)
            .collect::<Result<_, _>>()
            .map(AnyValue::Array),
    }
}

fn encode_path(path: &[PathItem]) -> Vec<message::DocumentPathItem> {
    path.iter()
        .map(|item| {
            let (kind, value, index) = match item {
                PathItem::Member(name) => (DocumentPathItemType::Member, Some(name.clone()), None),
                PathItem::MemberAsterisk => (DocumentPathItemType::MemberAsterisk, None, None),
                PathItem::Index(i) => (DocumentPathItemType::ArrayIndex, None, Some(*i)),
                PathItem::IndexAsterisk => (DocumentPathItemType::ArrayIndexAsterisk, None, None),
                PathItem::DoubleAsterisk => (DocumentPathItemType::DoubleAsterisk, None, None),
            };
            message::DocumentPathItem {
                r#type: kind as i32,
                value,
                index,
            }
        })
        .collect()
}

fn expr_of(kind: ExprType) -> message::Expr {
    message::Expr {
        r#type: kind as i32,
        ..Default::default()
    }
}

/// Encodes an expression tree. Placeholders are numbered through `placeholders`.
pub fn encode_expr(expr: &Expr, placeholders: &Placeholders) -> message::Expr {
    let encode_all = |args: &[Expr]| -> Vec<message::Expr> {
        args.iter().map(|a| encode_expr(a, placeholders)).collect()
    };

    match expr {
        Expr::Literal(value) => message::Expr {
            literal: Some(encode_scalar(value)),
            ..expr_of(ExprType::Literal)
        },
        Expr::DocumentField(path) => message::Expr {
            identifier: Some(message::ColumnIdentifier {
                document_path: encode_path(path),
                ..Default::default()
            }),
            ..expr_of(ExprType::Ident)
        },
        Expr::Column(ColumnIdent {
            schema,
            table,
            name,
            path,
        }) => message::Expr {
            identifier: Some(message::ColumnIdentifier {
                document_path: encode_path(path),
                name: Some(name.clone()),
                table_name: table.clone(),
                schema_name: schema.clone(),
            }),
            ..expr_of(ExprType::Ident)
        },
        Expr::Placeholder(p) => message::Expr {
            position: Some(placeholders.position(p)),
            ..expr_of(ExprType::Placeholder)
        },
        Expr::FunctionCall { schema, name, args } => message::Expr {
            function_call: Some(message::FunctionCall {
                name: Some(message::Identifier {
                    name: name.clone(),
                    schema_name: schema.clone(),
                }),
                param: encode_all(args),
            }),
            ..expr_of(ExprType::FuncCall)
        },
        Expr::Operator { name, args } => message::Expr {
            operator: Some(message::Operator {
                name: name.clone(),
                param: encode_all(args),
            }),
            ..expr_of(ExprType::Operator)
        },
        Expr::UnaryOp { name, arg } => message::Expr {
            operator: Some(message::Operator {
                name: name.clone(),
                param: vec![encode_expr(arg, placeholders)],
            }),
            ..expr_of(ExprType::Operator)
        },
        Expr::JsonDoc(fields) => message::Expr {
            object: Some(message::ObjectExpr {
                fld: fields
                    .iter()
                    .map(|(key, value)| message::ObjectExprField {
                        key: key.clone(),
                        value: Some(encode_expr(value, placeholders)),
                    })
                    .collect(),
            }),
            ..expr_of(ExprType::Object)
        },
        Expr::JsonArray(items) => message::Expr {
            array: Some(message::ArrayExpr {
                value: encode_all(items),
            }),
            ..expr_of(ExprType::Array)
        },
    }
}

/// Requests the client sends.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    CapabilitiesGet,
    CapabilitiesSet(Vec<(String, AnyValue)>),
    AuthenticateStart {
        mechanism: String,
        auth_data: Option<Vec<u8>>,
    },
    AuthenticateContinue(Vec<u8>),
    SessionReset {
        keep_open: bool,
    },
    SessionClose,
    ConnectionClose,
    StmtExecute {
        namespace: String,
        stmt: String,
        args: Vec<AnyValue>,
    },
    Find(Box<message::Find>),
}

impl ClientMessage {
    pub fn sql(stmt: impl Into<String>, args: Vec<AnyValue>) -> Self {
        ClientMessage::StmtExecute {
            namespace: "sql".to_string(),
            stmt: stmt.into(),
            args,
        }
    }

    pub fn type_tag(&self) -> u8 {
        match self {
            ClientMessage::CapabilitiesGet => client::CON_CAPABILITIES_GET,
            ClientMessage::CapabilitiesSet(_) => client::CON_CAPABILITIES_SET,
            ClientMessage::AuthenticateStart { .. } => client::SESS_AUTHENTICATE_START,
            ClientMessage::AuthenticateContinue(_) => client::SESS_AUTHENTICATE_CONTINUE,
            ClientMessage::SessionReset { .. } => client::SESS_RESET,
            ClientMessage::SessionClose => client::SESS_CLOSE,
            ClientMessage::ConnectionClose => client::CON_CLOSE,
            ClientMessage::StmtExecute { .. } => client::SQL_STMT_EXECUTE,
            ClientMessage::Find(_) => client::CRUD_FIND,
        }
    }

    pub fn encode_payload(&self) -> Vec<u8> {
        match self {
            ClientMessage::CapabilitiesGet => message::CapabilitiesGet {}.encode_to_vec(),
            ClientMessage::CapabilitiesSet(caps) => message::CapabilitiesSet {
                capabilities: Some(message::Capabilities {
                    capabilities: caps
                        .iter()
                        .map(|(name, value)| message::Capability {
                            name: name.clone(),
                            value: Some(encode_any(value)),
                        })
                        .collect(),
                }),
            }
            .encode_to_vec(),
            ClientMessage::AuthenticateStart {
                mechanism,
                auth_data,
            } => message::AuthenticateStart {
                mech_name: mechanism.clone(),
                auth_data: auth_data.clone(),
                initial_response: None,
            }
            .encode_to_vec(),
            ClientMessage::AuthenticateContinue(data) => message::AuthenticateContinue {
                auth_data: data.clone(),
            }
            .encode_to_vec(),
            ClientMessage::SessionReset { keep_open } => message::SessionReset {
                keep_open: Some(*keep_open),
            }
            .encode_to_vec(),
            ClientMessage::SessionClose => message::SessionClose {}.encode_to_vec(),
            ClientMessage::ConnectionClose => message::ConnectionClose {}.encode_to_vec(),
            ClientMessage::StmtExecute {
                namespace,
                stmt,
                args,
            } => message::StmtExecute {
                stmt: stmt.as_bytes().to_vec(),
                args: args.iter().map(encode_any).collect(),
                namespace: Some(namespace.clone()),
                compact_metadata: None,
            }
            .encode_to_vec(),
            ClientMessage::Find(find) => find.encode_to_vec(),
        }
    }

    /// Complete wire frame for this request.
    pub fn to_frame(&self) -> Bytes {
        encode_frame(self.type_tag(), &self.encode_payload())
    }
}

/// Notice carried by a `NOTICE` frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    Warning(Warning),
    SessionVariableChanged {
        param: String,
        value: Option<Scalar>,
    },
    SessionStateChanged {
        param: SessionStateParameter,
        values: Vec<Scalar>,
    },
    /// A notice type this client does not interpret.
    Other(u32),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerNotice {
    /// Local notices belong to the statement being executed; global ones to the
    /// connection.
    pub local: bool,
    pub notice: Notice,
}

/// Decoded server frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    Ok(Option<String>),
    /// Always a [`ProtocolError::Server`].
    Error(ProtocolError),
    Capabilities(Vec<(String, AnyValue)>),
    AuthenticateContinue(Vec<u8>),
    AuthenticateOk(Vec<u8>),
    Notice(ServerNotice),
    ColumnMetaData(ColumnMeta),
    Row(Vec<Vec<u8>>),
    FetchDone,
    FetchSuspended,
    FetchDoneMoreResultsets,
    FetchDoneMoreOutParams,
    StmtExecuteOk,
    Unknown(u8),
}

impl ServerMessage {
    pub fn name(&self) -> &'static str {
        match self {
            ServerMessage::Ok(_) => "Ok",
            ServerMessage::Error(_) => "Error",
            ServerMessage::Capabilities(_) => "Capabilities",
            ServerMessage::AuthenticateContinue(_) => "AuthenticateContinue",
            ServerMessage::AuthenticateOk(_) => "AuthenticateOk",
            ServerMessage::Notice(_) => "Notice",
            ServerMessage::ColumnMetaData(_) => "ColumnMetaData",
            ServerMessage::Row(_) => "Row",
            ServerMessage::FetchDone => "FetchDone",
            ServerMessage::FetchSuspended => "FetchSuspended",
            ServerMessage::FetchDoneMoreResultsets => "FetchDoneMoreResultsets",
            ServerMessage::FetchDoneMoreOutParams => "FetchDoneMoreOutParams",
            ServerMessage::StmtExecuteOk => "StmtExecuteOk",
            ServerMessage::Unknown(_) => "Unknown",
        }
    }
}

/// Decodes the payload of an inbound frame according to its type tag.
pub fn decode(frame: &Frame) -> Result<ServerMessage, ProtocolError> {
    let payload = &frame.payload[..];
    Ok(match frame.type_tag {
        server::OK => ServerMessage::Ok(message::ServerOk::decode(payload)?.msg),
        server::ERROR => ServerMessage::Error(decode_error(payload)?),
        server::CONN_CAPABILITIES => {
            let caps = message::Capabilities::decode(payload)?;
            ServerMessage::Capabilities(
                caps.capabilities
                    .into_iter()
                    .map(|c| -> Result<(String, AnyValue), ProtocolError> {
                        let value = c.value.map(decode_any).transpose()?;
                        Ok((c.name, value.unwrap_or(AnyValue::Scalar(Scalar::Null))))
                    })
                    .collect::<Result<_, _>>()?,
            )
        }
        server::SESS_AUTHENTICATE_CONTINUE => {
            ServerMessage::AuthenticateContinue(message::AuthenticateContinue::decode(payload)?.auth_data)
        }
        server::SESS_AUTHENTICATE_OK => ServerMessage::AuthenticateOk(
            message::AuthenticateOk::decode(payload)?
                .auth_data
                .unwrap_or_default(),
        ),
        server::NOTICE => ServerMessage::Notice(decode_notice(payload)?),
        server::RESULTSET_COLUMN_META_DATA => {
            ServerMessage::ColumnMetaData(message::ColumnMetaData::decode(payload)?.try_into()?)
        }
        server::RESULTSET_ROW => ServerMessage::Row(message::Row::decode(payload)?.field),
        server::RESULTSET_FETCH_DONE => ServerMessage::FetchDone,
        server::RESULTSET_FETCH_SUSPENDED => ServerMessage::FetchSuspended,
        server::RESULTSET_FETCH_DONE_MORE_RESULTSETS => ServerMessage::FetchDoneMoreResultsets,
        server::RESULTSET_FETCH_DONE_MORE_OUT_PARAMS => ServerMessage::FetchDoneMoreOutParams,
        server::SQL_STMT_EXECUTE_OK => ServerMessage::StmtExecuteOk,
        tag => ServerMessage::Unknown(tag),
    })
}

fn decode_error(payload: &[u8]) -> Result<ProtocolError, ProtocolError> {
    let err = message::ServerError::decode(payload)?;
    Ok(ProtocolError::Server {
        code: err.code,
        sql_state: err.sql_state,
        message: err.msg,
        fatal: err.severity == Some(message::Severity::Fatal as i32),
    })
}

fn decode_notice(payload: &[u8]) -> Result<ServerNotice, ProtocolError> {
    let frame = message::NoticeFrame::decode(payload)?;
    let local = frame.scope == Some(message::NoticeScope::Local as i32);
    let body = frame.payload.unwrap_or_default();

    let notice = match frame.r#type {
        message::notice_type::WARNING => {
            let w = message::NoticeWarning::decode(&body[..])?;
            let level = w
                .level
                .and_then(|l| message::WarningLevel::try_from(l).ok())
                .unwrap_or(message::WarningLevel::Warning);
            Notice::Warning(Warning {
                level,
                code: w.code,
                message: w.msg,
            })
        }
        message::notice_type::SESSION_VARIABLE_CHANGED => {
            let v = message::SessionVariableChanged::decode(&body[..])?;
            Notice::SessionVariableChanged {
                param: v.param,
                value: v.value.map(decode_scalar).transpose()?,
            }
        }
        message::notice_type::SESSION_STATE_CHANGED => {
            let s = message::SessionStateChanged::decode(&body[..])?;
            let param = SessionStateParameter::try_from(s.param)
                .map_err(|_| ProtocolError::Decode(format!("session state parameter {}", s.param)))?;
            Notice::SessionStateChanged {
                param,
                values: s
                    .value
                    .into_iter()
                    .map(decode_scalar)
                    .collect::<Result<_, _>>()?,
            }
        }
        other => {
            warn!("ignoring notice of unknown type {other}");
            Notice::Other(other)
        }
    };
    Ok(ServerNotice { local, notice })
}

//! Protobuf messages exchanged with the server.
//!
//! The structs mirror the protocol's `.proto` definitions field for field (same tags,
//! same `required`/`optional` labels for scalars) so the bytes are interchangeable with
//! any other client. Required submessages are declared `optional` because prost only
//! models them as `Option<T>`; the encoders always fill them.
//! Only the messages this crate sends or understands are declared.

/// Type tags of client to server frames.
pub mod client {
    pub const CON_CAPABILITIES_GET: u8 = 1;
    pub const CON_CAPABILITIES_SET: u8 = 2;
    pub const CON_CLOSE: u8 = 3;
    pub const SESS_AUTHENTICATE_START: u8 = 4;
    pub const SESS_AUTHENTICATE_CONTINUE: u8 = 5;
    pub const SESS_RESET: u8 = 6;
    pub const SESS_CLOSE: u8 = 7;
    pub const SQL_STMT_EXECUTE: u8 = 12;
    pub const CRUD_FIND: u8 = 17;
}

/// Type tags of server to client frames.
pub mod server {
    pub const OK: u8 = 0;
    pub const ERROR: u8 = 1;
    pub const CONN_CAPABILITIES: u8 = 2;
    pub const SESS_AUTHENTICATE_CONTINUE: u8 = 3;
    pub const SESS_AUTHENTICATE_OK: u8 = 4;
    pub const NOTICE: u8 = 11;
    pub const RESULTSET_COLUMN_META_DATA: u8 = 12;
    pub const RESULTSET_ROW: u8 = 13;
    pub const RESULTSET_FETCH_DONE: u8 = 14;
    pub const RESULTSET_FETCH_SUSPENDED: u8 = 15;
    pub const RESULTSET_FETCH_DONE_MORE_RESULTSETS: u8 = 16;
    pub const SQL_STMT_EXECUTE_OK: u8 = 17;
    pub const RESULTSET_FETCH_DONE_MORE_OUT_PARAMS: u8 = 18;
}

// Datatypes

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum ScalarType {
    VSint = 1,
    VUint = 2,
    VNull = 3,
    VOctets = 4,
    VDouble = 5,
    VFloat = 6,
    VBool = 7,
    VString = 8,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ScalarString {
    #[prost(bytes = "vec", required, tag = "1")]
    pub value: Vec<u8>,
    #[prost(uint64, optional, tag = "2")]
    pub collation: Option<u64>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ScalarOctets {
    #[prost(bytes = "vec", required, tag = "1")]
    pub value: Vec<u8>,
    #[prost(uint32, optional, tag = "2")]
    pub content_type: Option<u32>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Scalar {
    #[prost(enumeration = "ScalarType", required, tag = "1")]
    pub r#type: i32,
    #[prost(sint64, optional, tag = "2")]
    pub v_signed_int: Option<i64>,
    #[prost(uint64, optional, tag = "3")]
    pub v_unsigned_int: Option<u64>,
    #[prost(message, optional, tag = "5")]
    pub v_octets: Option<ScalarOctets>,
    #[prost(double, optional, tag = "6")]
    pub v_double: Option<f64>,
    #[prost(float, optional, tag = "7")]
    pub v_float: Option<f32>,
    #[prost(bool, optional, tag = "8")]
    pub v_bool: Option<bool>,
    #[prost(message, optional, tag = "9")]
    pub v_string: Option<ScalarString>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum AnyType {
    Scalar = 1,
    Object = 2,
    Array = 3,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Any {
    #[prost(enumeration = "AnyType", required, tag = "1")]
    pub r#type: i32,
    #[prost(message, optional, tag = "2")]
    pub scalar: Option<Scalar>,
    #[prost(message, optional, tag = "3")]
    pub obj: Option<Object>,
    #[prost(message, optional, tag = "4")]
    pub array: Option<Array>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ObjectField {
    #[prost(string, required, tag = "1")]
    pub key: String,
    #[prost(message, optional, tag = "2")]
    pub value: Option<Any>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Object {
    #[prost(message, repeated, tag = "1")]
    pub fld: Vec<ObjectField>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Array {
    #[prost(message, repeated, tag = "1")]
    pub value: Vec<Any>,
}

// Connection

#[derive(Clone, PartialEq, prost::Message)]
pub struct Capability {
    #[prost(string, required, tag = "1")]
    pub name: String,
    #[prost(message, optional, tag = "2")]
    pub value: Option<Any>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Capabilities {
    #[prost(message, repeated, tag = "1")]
    pub capabilities: Vec<Capability>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CapabilitiesGet {}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CapabilitiesSet {
    #[prost(message, optional, tag = "1")]
    pub capabilities: Option<Capabilities>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ConnectionClose {}

// Session

#[derive(Clone, PartialEq, prost::Message)]
pub struct AuthenticateStart {
    #[prost(string, required, tag = "1")]
    pub mech_name: String,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub auth_data: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "3")]
    pub initial_response: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct AuthenticateContinue {
    #[prost(bytes = "vec", required, tag = "1")]
    pub auth_data: Vec<u8>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct AuthenticateOk {
    #[prost(bytes = "vec", optional, tag = "1")]
    pub auth_data: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct SessionReset {
    #[prost(bool, optional, tag = "1")]
    pub keep_open: Option<bool>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct SessionClose {}

// Generic replies

#[derive(Clone, PartialEq, prost::Message)]
pub struct ServerOk {
    #[prost(string, optional, tag = "1")]
    pub msg: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum Severity {
    Error = 0,
    Fatal = 1,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ServerError {
    #[prost(enumeration = "Severity", optional, tag = "1")]
    pub severity: Option<i32>,
    #[prost(uint32, required, tag = "2")]
    pub code: u32,
    #[prost(string, required, tag = "3")]
    pub msg: String,
    #[prost(string, required, tag = "4")]
    pub sql_state: String,
}

// Sql

#[derive(Clone, PartialEq, prost::Message)]
pub struct StmtExecute {
    #[prost(bytes = "vec", required, tag = "1")]
    pub stmt: Vec<u8>,
    #[prost(message, repeated, tag = "2")]
    pub args: Vec<Any>,
    #[prost(string, optional, tag = "3")]
    pub namespace: Option<String>,
    #[prost(bool, optional, tag = "4")]
    pub compact_metadata: Option<bool>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct StmtExecuteOk {}

// Expressions

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum DocumentPathItemType {
    Member = 1,
    MemberAsterisk = 2,
    ArrayIndex = 3,
    ArrayIndexAsterisk = 4,
    DoubleAsterisk = 5,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct DocumentPathItem {
    #[prost(enumeration = "DocumentPathItemType", required, tag = "1")]
    pub r#type: i32,
    #[prost(string, optional, tag = "2")]
    pub value: Option<String>,
    #[prost(uint32, optional, tag = "3")]
    pub index: Option<u32>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ColumnIdentifier {
    #[prost(message, repeated, tag = "1")]
    pub document_path: Vec<DocumentPathItem>,
    #[prost(string, optional, tag = "2")]
    pub name: Option<String>,
    #[prost(string, optional, tag = "3")]
    pub table_name: Option<String>,
    #[prost(string, optional, tag = "4")]
    pub schema_name: Option<String>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Identifier {
    #[prost(string, required, tag = "1")]
    pub name: String,
    #[prost(string, optional, tag = "2")]
    pub schema_name: Option<String>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct FunctionCall {
    #[prost(message, optional, tag = "1")]
    pub name: Option<Identifier>,
    #[prost(message, repeated, tag = "2")]
    pub param: Vec<Expr>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Operator {
    #[prost(string, required, tag = "1")]
    pub name: String,
    #[prost(message, repeated, tag = "2")]
    pub param: Vec<Expr>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ObjectExprField {
    #[prost(string, required, tag = "1")]
    pub key: String,
    #[prost(message, optional, tag = "2")]
    pub value: Option<Expr>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ObjectExpr {
    #[prost(message, repeated, tag = "1")]
    pub fld: Vec<ObjectExprField>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ArrayExpr {
    #[prost(message, repeated, tag = "1")]
    pub value: Vec<Expr>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum ExprType {
    Ident = 1,
    Literal = 2,
    Variable = 3,
    FuncCall = 4,
    Operator = 5,
    Placeholder = 6,
    Object = 7,
    Array = 8,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Expr {
    #[prost(enumeration = "ExprType", required, tag = "1")]
    pub r#type: i32,
    #[prost(message, optional, tag = "2")]
    pub identifier: Option<ColumnIdentifier>,
    #[prost(string, optional, tag = "3")]
    pub variable: Option<String>,
    #[prost(message, optional, tag = "4")]
    pub literal: Option<Scalar>,
    #[prost(message, optional, tag = "5")]
    pub function_call: Option<FunctionCall>,
    #[prost(message, optional, tag = "6")]
    pub operator: Option<Operator>,
    #[prost(uint32, optional, tag = "7")]
    pub position: Option<u32>,
    #[prost(message, optional, tag = "8")]
    pub object: Option<ObjectExpr>,
    #[prost(message, optional, tag = "9")]
    pub array: Option<ArrayExpr>,
}

// Crud

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum DataModel {
    Document = 1,
    Table = 2,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum OrderDirection {
    Asc = 1,
    Desc = 2,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Collection {
    #[prost(string, required, tag = "1")]
    pub name: String,
    #[prost(string, optional, tag = "2")]
    pub schema: Option<String>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Projection {
    #[prost(message, optional, tag = "1")]
    pub source: Option<Expr>,
    #[prost(string, optional, tag = "2")]
    pub alias: Option<String>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Order {
    #[prost(message, optional, tag = "1")]
    pub expr: Option<Expr>,
    #[prost(enumeration = "OrderDirection", optional, tag = "2")]
    pub direction: Option<i32>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Limit {
    #[prost(uint64, required, tag = "1")]
    pub row_count: u64,
    #[prost(uint64, optional, tag = "2")]
    pub offset: Option<u64>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Find {
    #[prost(message, optional, tag = "2")]
    pub collection: Option<Collection>,
    #[prost(enumeration = "DataModel", optional, tag = "3")]
    pub data_model: Option<i32>,
    #[prost(message, repeated, tag = "4")]
    pub projection: Vec<Projection>,
    #[prost(message, optional, tag = "5")]
    pub criteria: Option<Expr>,
    #[prost(message, optional, tag = "6")]
    pub limit: Option<Limit>,
    #[prost(message, repeated, tag = "7")]
    pub order: Vec<Order>,
    #[prost(message, repeated, tag = "8")]
    pub grouping: Vec<Expr>,
    #[prost(message, optional, tag = "9")]
    pub grouping_criteria: Option<Expr>,
    #[prost(message, repeated, tag = "11")]
    pub args: Vec<Scalar>,
}

// Resultset

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum FieldType {
    Sint = 1,
    Uint = 2,
    Double = 5,
    Float = 6,
    Bytes = 7,
    Time = 10,
    Datetime = 12,
    Set = 15,
    Enum = 16,
    Bit = 17,
    Decimal = 18,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ColumnMetaData {
    #[prost(enumeration = "FieldType", required, tag = "1")]
    pub r#type: i32,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub name: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "3")]
    pub original_name: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "4")]
    pub table: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "5")]
    pub original_table: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "6")]
    pub schema: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "7")]
    pub catalog: Option<Vec<u8>>,
    #[prost(uint64, optional, tag = "8")]
    pub collation: Option<u64>,
    #[prost(uint32, optional, tag = "9")]
    pub fractional_digits: Option<u32>,
    #[prost(uint32, optional, tag = "10")]
    pub length: Option<u32>,
    #[prost(uint32, optional, tag = "11")]
    pub flags: Option<u32>,
    #[prost(uint32, optional, tag = "12")]
    pub content_type: Option<u32>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Row {
    #[prost(bytes = "vec", repeated, tag = "1")]
    pub field: Vec<Vec<u8>>,
}

// Notices

/// `Frame.type` values.
pub mod notice_type {
    pub const WARNING: u32 = 1;
    pub const SESSION_VARIABLE_CHANGED: u32 = 2;
    pub const SESSION_STATE_CHANGED: u32 = 3;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum NoticeScope {
    Global = 1,
    Local = 2,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct NoticeFrame {
    #[prost(uint32, required, tag = "1")]
    pub r#type: u32,
    #[prost(enumeration = "NoticeScope", optional, tag = "2")]
    pub scope: Option<i32>,
    #[prost(bytes = "vec", optional, tag = "3")]
    pub payload: Option<Vec<u8>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum WarningLevel {
    Note = 1,
    Warning = 2,
    Error = 3,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct NoticeWarning {
    #[prost(enumeration = "WarningLevel", optional, tag = "1")]
    pub level: Option<i32>,
    #[prost(uint32, required, tag = "2")]
    pub code: u32,
    #[prost(string, required, tag = "3")]
    pub msg: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct SessionVariableChanged {
    #[prost(string, required, tag = "1")]
    pub param: String,
    #[prost(message, optional, tag = "2")]
    pub value: Option<Scalar>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum SessionStateParameter {
    CurrentSchema = 1,
    AccountExpired = 2,
    GeneratedInsertId = 3,
    RowsAffected = 4,
    RowsFound = 5,
    RowsMatched = 6,
    TrxCommitted = 7,
    TrxRolledback = 9,
    ProducedMessage = 10,
    ClientIdAssigned = 11,
    GeneratedDocumentIds = 12,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct SessionStateChanged {
    #[prost(enumeration = "SessionStateParameter", required, tag = "1")]
    pub param: i32,
    #[prost(message, repeated, tag = "2")]
    pub value: Vec<Scalar>,
}

//! X Protocol wire engine.
//!
//! This module owns everything between the socket and the session API: splitting the
//! inbound byte stream into frames, encoding requests, authenticating, attributing
//! inbound frames to the operation that asked for them and decoding resultsets.
//!
//! # Binary Format
//!
//! Every message, in both directions, is framed the same way:
//!
//! - a 4-byte little-endian length covering the type tag and the payload,
//! - a 1-byte message type tag,
//! - the protobuf-encoded payload.
//!
//! The tag tells the receiver which protobuf message the payload holds; the numbering
//! differs between client and server messages (see [`message::client`] and
//! [`message::server`]).
//!
//! # Key Components
//!
//! - [`FrameTransport`]: reassembles frames from arbitrarily fragmented reads.
//! - [`codec`]: pure conversions between expression trees, scalars and wire messages.
//! - [`AuthSession`]: the authentication handshake state machine.
//! - [`WorkQueue`]: FIFO correlation of pipelined requests with streamed responses.
//! - [`ResultSetBuilder`]: incremental decoding of column metadata and rows.
pub mod auth;
pub mod codec;
pub mod frame;
pub mod message;
pub mod queue;
pub mod resultset;
pub mod row;

pub use auth::{AuthMechanism, AuthMechanismKind, AuthSession, AuthState};
pub use codec::{ClientMessage, ServerMessage};
pub use error::ProtocolError;
pub use frame::{Frame, FrameTransport, encode_frame};
pub use queue::{Disposition, ResponseHandler, WorkQueue};
pub use resultset::{ColumnMeta, ColumnType, Outcome, ResultEvent, ResultSet, ResultSetBuilder, Warning};
pub use row::{Row, Value};

pub mod error {
    use std::io;

    use thiserror::Error;

    use crate::{cursor::OutOfBounds, expr::SyntaxError};

    /// Errors raised by the wire engine.
    ///
    /// Cloneable so that a single transport failure can settle every queued operation.
    #[derive(Debug, Error, Clone, PartialEq)]
    pub enum ProtocolError {
        #[error("protocol violation: {0}")]
        Violation(String),

        #[error("authentication failed: {0}")]
        Authentication(String),

        #[error("server error {code} ({sql_state}): {message}")]
        Server {
            code: u32,
            sql_state: String,
            message: String,
            fatal: bool,
        },

        #[error("transport error: {0}")]
        Transport(String),

        #[error("not an X Protocol server, the peer sent a classic protocol greeting")]
        NotXProtocol,

        #[error("connection closed")]
        ConnectionClosed,

        #[error("failed to decode {0}")]
        Decode(String),

        #[error(transparent)]
        OutOfBounds(#[from] OutOfBounds),

        #[error(transparent)]
        Syntax(#[from] SyntaxError),
    }

    impl ProtocolError {
        /// Whether the connection is unusable after this error.
        pub fn is_fatal(&self) -> bool {
            match self {
                ProtocolError::Transport(_)
                | ProtocolError::NotXProtocol
                | ProtocolError::ConnectionClosed => true,
                ProtocolError::Server { fatal, .. } => *fatal,
                _ => false,
            }
        }
    }

    impl From<io::Error> for ProtocolError {
        fn from(value: io::Error) -> Self {
            match value.kind() {
                io::ErrorKind::UnexpectedEof
                | io::ErrorKind::ConnectionReset
                | io::ErrorKind::BrokenPipe => ProtocolError::ConnectionClosed,
                _ => ProtocolError::Transport(value.to_string()),
            }
        }
    }

    impl From<prost::DecodeError> for ProtocolError {
        fn from(value: prost::DecodeError) -> Self {
            ProtocolError::Decode(value.to_string())
        }
    }
}

//! Resolved connection parameters.
//!
//! Connection strings, DNS SRV lookups and option files are resolved before this point;
//! a [`ConnectionParams`] is what is left once they have been.
use std::{future::Future, io, pin::Pin, time::Duration};

use tokio::io::{AsyncRead, AsyncWrite};

use crate::protocol::{AuthMechanismKind, auth::Credentials, frame::DEFAULT_MAX_FRAME_SIZE};

pub const DEFAULT_PORT: u16 = 33060;
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Byte stream a session runs over.
pub trait Stream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Stream for T {}

pub type BoxStream = Box<dyn Stream>;

/// Wraps a connected stream in TLS.
///
/// Certificate policy and cipher selection belong to the implementor.
pub trait TlsUpgrade: Send + Sync {
    fn upgrade<'a>(
        &'a self,
        stream: BoxStream,
        host: &'a str,
    ) -> Pin<Box<dyn Future<Output = io::Result<BoxStream>> + Send + 'a>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TlsMode {
    #[default]
    Disabled,
    /// Fail the connection unless TLS can be negotiated.
    Required,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub schema: Option<String>,
    pub tls: TlsMode,
    /// Mechanism to insist on; chosen from the server's offer when unset.
    pub auth: Option<AuthMechanismKind>,
    pub connect_timeout: Duration,
    pub max_frame_size: usize,
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            user: String::new(),
            password: String::new(),
            schema: None,
            tls: TlsMode::default(),
            auth: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl ConnectionParams {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn tls(mut self, tls: TlsMode) -> Self {
        self.tls = tls;
        self
    }

    pub fn auth(mut self, auth: AuthMechanismKind) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(&self.user, &self.password).with_schema(self.schema.clone().unwrap_or_default())
    }
}

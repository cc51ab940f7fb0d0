//! Authentication mechanisms and the handshake state machine.
//!
//! An [`AuthSession`] sends `AuthenticateStart`, answers at most the continuation its
//! mechanism defines, and ends in [`AuthState::Done`] or [`AuthState::Failed`]. Any
//! frame the mechanism did not ask for is a protocol violation; the session never
//! switches to another mechanism on its own.
use std::{fmt, str::FromStr};

use log::{debug, info};
use sha1::{Digest, Sha1};
use sha2::Sha256;
use tokio::sync::oneshot;

use super::{
    ProtocolError,
    codec::{ClientMessage, Notice, ServerMessage},
    queue::{Disposition, ResponseHandler},
};

/// Server error code for rejected credentials.
const ACCESS_DENIED: u32 = 1045;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthMechanismKind {
    Mysql41,
    Plain,
    Sha256Memory,
}

impl AuthMechanismKind {
    pub fn name(&self) -> &'static str {
        match self {
            AuthMechanismKind::Mysql41 => "MYSQL41",
            AuthMechanismKind::Plain => "PLAIN",
            AuthMechanismKind::Sha256Memory => "SHA256_MEMORY",
        }
    }
}

impl fmt::Display for AuthMechanismKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AuthMechanismKind {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "MYSQL41" => Ok(AuthMechanismKind::Mysql41),
            "PLAIN" => Ok(AuthMechanismKind::Plain),
            "SHA256_MEMORY" => Ok(AuthMechanismKind::Sha256Memory),
            other => Err(ProtocolError::Authentication(format!(
                "unknown authentication mechanism {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
    /// Default schema for the session, may be empty.
    pub schema: String,
}

impl Credentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
            schema: String::new(),
        }
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    /// `schema \0 user \0`, the prefix shared by every mechanism's payload.
    fn prefix(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.schema.len() + self.user.len() + 2);
        out.extend_from_slice(self.schema.as_bytes());
        out.push(0);
        out.extend_from_slice(self.user.as_bytes());
        out.push(0);
        out
    }
}

/// A named authentication exchange.
pub trait AuthMechanism: Send {
    fn kind(&self) -> AuthMechanismKind;

    fn requires_secure_transport(&self) -> bool {
        false
    }

    /// Payload of `AuthenticateStart`.
    fn initial_data(&self) -> Option<Vec<u8>>;

    /// Answers the `round`-th `AuthenticateContinue` challenge.
    fn continue_auth(&mut self, round: u32, _challenge: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        Err(ProtocolError::Violation(format!(
            "{} does not expect AuthenticateContinue (round {round})",
            self.kind()
        )))
    }

    /// Lets a mechanism turn a server error into a more useful one.
    fn map_error(&self, error: ProtocolError) -> ProtocolError {
        error
    }
}

fn xor(a: &[u8], b: &[u8]) -> Vec<u8> {
    a.iter().zip(b).map(|(x, y)| x ^ y).collect()
}

fn single_round(kind: AuthMechanismKind, round: u32) -> Result<(), ProtocolError> {
    if round > 0 {
        return Err(ProtocolError::Violation(format!(
            "{kind} expects a single challenge, got another"
        )));
    }
    Ok(())
}

/// SHA-1 challenge response.
pub struct Mysql41 {
    credentials: Credentials,
}

impl Mysql41 {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }

    /// `SHA1(pw) XOR SHA1(nonce + SHA1(SHA1(pw)))`.
    pub fn scramble(password: &str, nonce: &[u8]) -> Vec<u8> {
        let stage1 = Sha1::digest(password.as_bytes());
        let stage2 = Sha1::digest(stage1);
        let mut hasher = Sha1::new();
        hasher.update(nonce);
        hasher.update(stage2);
        xor(&stage1, &hasher.finalize())
    }
}

impl AuthMechanism for Mysql41 {
    fn kind(&self) -> AuthMechanismKind {
        AuthMechanismKind::Mysql41
    }

    fn initial_data(&self) -> Option<Vec<u8>> {
        None
    }

    fn continue_auth(&mut self, round: u32, challenge: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        single_round(self.kind(), round)?;
        let mut out = self.credentials.prefix();
        if !self.credentials.password.is_empty() {
            out.push(b'*');
            let scramble = Self::scramble(&self.credentials.password, challenge);
            out.extend_from_slice(hex::encode_upper(scramble).as_bytes());
        }
        Ok(out)
    }
}

/// Clear text password, only over TLS.
pub struct Plain {
    credentials: Credentials,
}

impl Plain {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }
}

impl AuthMechanism for Plain {
    fn kind(&self) -> AuthMechanismKind {
        AuthMechanismKind::Plain
    }

    fn requires_secure_transport(&self) -> bool {
        true
    }

    fn initial_data(&self) -> Option<Vec<u8>> {
        let mut out = self.credentials.prefix();
        out.extend_from_slice(self.credentials.password.as_bytes());
        Some(out)
    }
}

/// SHA-256 challenge response checked against the server's in-memory password cache.
pub struct Sha256Memory {
    credentials: Credentials,
}

impl Sha256Memory {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }

    /// `SHA256(pw) XOR SHA256(SHA256(SHA256(pw)) + nonce)`.
    pub fn scramble(password: &str, nonce: &[u8]) -> Vec<u8> {
        let stage1 = Sha256::digest(password.as_bytes());
        let stage2 = Sha256::digest(stage1);
        let mut hasher = Sha256::new();
        hasher.update(stage2);
        hasher.update(nonce);
        xor(&stage1, &hasher.finalize())
    }
}

impl AuthMechanism for Sha256Memory {
    fn kind(&self) -> AuthMechanismKind {
        AuthMechanismKind::Sha256Memory
    }

    fn initial_data(&self) -> Option<Vec<u8>> {
        None
    }

    fn continue_auth(&mut self, round: u32, challenge: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        single_round(self.kind(), round)?;
        let mut out = self.credentials.prefix();
        let scramble = Self::scramble(&self.credentials.password, challenge);
        out.extend_from_slice(hex::encode(scramble).as_bytes());
        Ok(out)
    }

    fn map_error(&self, error: ProtocolError) -> ProtocolError {
        match error {
            ProtocolError::Server { code: ACCESS_DENIED, .. } => ProtocolError::Authentication(
                "SHA256_MEMORY authentication is not supported by the server or the credentials are not cached"
                    .to_string(),
            ),
            other => other,
        }
    }
}

pub fn mechanism(kind: AuthMechanismKind, credentials: Credentials) -> Box<dyn AuthMechanism> {
    match kind {
        AuthMechanismKind::Mysql41 => Box::new(Mysql41::new(credentials)),
        AuthMechanismKind::Plain => Box::new(Plain::new(credentials)),
        AuthMechanismKind::Sha256Memory => Box::new(Sha256Memory::new(credentials)),
    }
}

/// Picks the mechanism for a connection.
///
/// An explicit request is honoured or refused, never replaced. Without one, PLAIN is
/// used over TLS and MYSQL41 otherwise, falling back to SHA256_MEMORY only when the
/// server does not offer MYSQL41. An empty `offered` list means the server was not asked.
pub fn choose_mechanism(
    requested: Option<AuthMechanismKind>,
    offered: &[String],
    secure: bool,
) -> Result<AuthMechanismKind, ProtocolError> {
    let is_offered = |kind: AuthMechanismKind| offered.is_empty() || offered.iter().any(|m| m == kind.name());

    let kind = match requested {
        Some(kind) => kind,
        None if secure => AuthMechanismKind::Plain,
        None if is_offered(AuthMechanismKind::Mysql41) => AuthMechanismKind::Mysql41,
        None => AuthMechanismKind::Sha256Memory,
    };

    if kind == AuthMechanismKind::Plain && !secure {
        return Err(ProtocolError::Authentication(
            "PLAIN authentication requires a secure connection".to_string(),
        ));
    }
    if !is_offered(kind) {
        return Err(ProtocolError::Authentication(format!(
            "{kind} is not offered by the server (offered: {})",
            offered.join(", ")
        )));
    }
    Ok(kind)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Start,
    AwaitingContinue,
    Done,
    Failed,
}

/// What the caller has to do after a server message.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthStep {
    Reply(ClientMessage),
    Done,
}

pub struct AuthSession {
    mechanism: Box<dyn AuthMechanism>,
    state: AuthState,
    round: u32,
}

impl AuthSession {
    pub fn new(mechanism: Box<dyn AuthMechanism>) -> Self {
        Self {
            mechanism,
            state: AuthState::Start,
            round: 0,
        }
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    pub fn kind(&self) -> AuthMechanismKind {
        self.mechanism.kind()
    }

    /// Builds `AuthenticateStart` and moves to [`AuthState::AwaitingContinue`].
    pub fn start(&mut self) -> Result<ClientMessage, ProtocolError> {
        if self.state != AuthState::Start {
            return Err(ProtocolError::Violation(format!(
                "authentication already started ({:?})",
                self.state
            )));
        }
        self.state = AuthState::AwaitingContinue;
        debug!("authenticating with {}", self.kind());
        Ok(ClientMessage::AuthenticateStart {
            mechanism: self.kind().name().to_string(),
            auth_data: self.mechanism.initial_data(),
        })
    }

    pub fn handle(&mut self, message: ServerMessage) -> Result<AuthStep, ProtocolError> {
        if self.state != AuthState::AwaitingContinue {
            return Err(ProtocolError::Violation(format!(
                "{} received in authentication state {:?}",
                message.name(),
                self.state
            )));
        }

        let result = match message {
            ServerMessage::AuthenticateContinue(challenge) => self
                .mechanism
                .continue_auth(self.round, &challenge)
                .map(|data| {
                    self.round += 1;
                    AuthStep::Reply(ClientMessage::AuthenticateContinue(data))
                }),
            ServerMessage::AuthenticateOk(_) => {
                self.state = AuthState::Done;
                info!("authenticated with {}", self.kind());
                return Ok(AuthStep::Done);
            }
            ServerMessage::Error(e) => Err(self.mechanism.map_error(e)),
            other => Err(ProtocolError::Violation(format!(
                "unexpected {} during authentication",
                other.name()
            ))),
        };

        if result.is_err() {
            self.state = AuthState::Failed;
        }
        result
    }
}

/// Queue entry driving an [`AuthSession`].
pub struct AuthHandler {
    session: AuthSession,
    settle: Option<oneshot::Sender<Result<AuthMechanismKind, ProtocolError>>>,
}

impl AuthHandler {
    pub fn channel(
        session: AuthSession,
    ) -> (Self, oneshot::Receiver<Result<AuthMechanismKind, ProtocolError>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                session,
                settle: Some(tx),
            },
            rx,
        )
    }
}

impl ResponseHandler for AuthHandler {
    fn handle(&mut self, message: ServerMessage) -> Result<Disposition, ProtocolError> {
        match self.session.handle(message)? {
            AuthStep::Reply(reply) => Ok(Disposition::Reply(vec![reply.to_frame()])),
            AuthStep::Done => {
                if let Some(tx) = self.settle.take() {
                    let _ = tx.send(Ok(self.session.kind()));
                }
                Ok(Disposition::Settled)
            }
        }
    }

    fn notice(&mut self, notice: &Notice) {
        debug!("notice during authentication: {notice:?}");
    }

    fn fail(mut self: Box<Self>, error: ProtocolError) {
        if let Some(tx) = self.settle.take() {
            let _ = tx.send(Err(error));
        }
    }
}

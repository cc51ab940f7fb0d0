//! Asynchronous client session.
//!
//! A [`Session`] owns one connection. The handshake (capabilities, optional TLS,
//! authentication) runs first; after that a background reader task feeds every inbound
//! frame to the [`WorkQueue`], while requests are written through a single enqueue path
//! that pushes the response handler and writes the request under the same writer lock,
//! so queue order always matches wire order.
use std::sync::{
    Arc, Mutex, MutexGuard,
    atomic::{AtomicBool, Ordering},
};

use bytes::Bytes;
use log::{debug, info, warn};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf},
    net::TcpStream,
    sync::{Mutex as AsyncMutex, mpsc, oneshot},
    task::JoinHandle,
};

use crate::{
    config::{BoxStream, ConnectionParams, TlsMode, TlsUpgrade},
    protocol::{
        AuthMechanismKind, AuthSession, ClientMessage, FrameTransport, ProtocolError, ServerMessage,
        WorkQueue,
        auth::{self, AuthHandler, choose_mechanism},
        codec::{self, AnyValue, ServerNotice},
        queue::{ResponseHandler, SingleReply},
        resultset::Execution,
    },
};

const MECHANISMS_CAPABILITY: &str = "authentication.mechanisms";

struct Shared {
    queue: Mutex<WorkQueue>,
    writer: AsyncMutex<WriteHalf<BoxStream>>,
    open: AtomicBool,
}

impl Shared {
    fn queue(&self) -> MutexGuard<'_, WorkQueue> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Marks the connection dead and settles everything still queued.
    fn shutdown(&self, reason: ProtocolError) {
        if self.open.swap(false, Ordering::SeqCst) {
            match &reason {
                ProtocolError::ConnectionClosed => info!("connection closed"),
                other => warn!("connection lost: {other}"),
            }
        }
        self.queue().close(reason);
    }

    async fn write(&self, frames: &[Bytes]) -> Result<(), ProtocolError> {
        let mut writer = self.writer.lock().await;
        for frame in frames {
            writer.write_all(frame).await?;
        }
        writer.flush().await?;
        Ok(())
    }
}

pub struct Session {
    shared: Arc<Shared>,
    reader: JoinHandle<()>,
    mechanism: AuthMechanismKind,
    secure: bool,
    server_capabilities: Vec<(String, AnyValue)>,
}

impl Session {
    /// Opens a TCP connection and runs the handshake over it.
    pub async fn connect(
        params: &ConnectionParams,
        tls: Option<&dyn TlsUpgrade>,
    ) -> Result<Session, ProtocolError> {
        let address = params.address();
        let stream = tokio::time::timeout(params.connect_timeout, TcpStream::connect(&address))
            .await
            .map_err(|_| ProtocolError::Transport(format!("timed out connecting to {address}")))??;
        stream.set_nodelay(true)?;
        info!("connected to {address}");

        Self::handshake(Box::new(stream), params, tls).await
    }

    /// Runs the handshake over an already connected stream.
    pub async fn handshake(
        mut stream: BoxStream,
        params: &ConnectionParams,
        tls: Option<&dyn TlsUpgrade>,
    ) -> Result<Session, ProtocolError> {
        let mut transport = FrameTransport::new(params.max_frame_size);

        let secure = match params.tls {
            TlsMode::Disabled => false,
            TlsMode::Required => {
                let upgrade = tls.ok_or_else(|| {
                    ProtocolError::Transport("TLS is required but no TLS implementation was given".to_string())
                })?;
                let enable = ClientMessage::CapabilitiesSet(vec![("tls".to_string(), AnyValue::from(true))]);
                exchange(&mut stream, &mut transport, &enable)
                    .await
                    .map_err(|e| ProtocolError::Transport(format!("server refused TLS: {e}")))?;
                stream = upgrade.upgrade(stream, &params.host).await?;
                transport = FrameTransport::new(params.max_frame_size);
                info!("TLS established with {}", params.host);
                true
            }
        };

        let server_capabilities = match exchange(&mut stream, &mut transport, &ClientMessage::CapabilitiesGet).await? {
            ServerMessage::Capabilities(caps) => caps,
            other => {
                return Err(ProtocolError::Violation(format!(
                    "expected capabilities, got {}",
                    other.name()
                )));
            }
        };
        let offered = capability(&server_capabilities, MECHANISMS_CAPABILITY)
            .map(AnyValue::string_list)
            .unwrap_or_default();
        debug!("server offers {offered:?}");
        let kind = choose_mechanism(params.auth, &offered, secure)?;

        let (read_half, write_half) = tokio::io::split(stream);
        let shared = Arc::new(Shared {
            queue: Mutex::new(WorkQueue::new()),
            writer: AsyncMutex::new(write_half),
            open: AtomicBool::new(true),
        });
        let reader = tokio::spawn(read_loop(read_half, transport, Arc::clone(&shared)));

        let session = Session {
            shared,
            reader,
            mechanism: kind,
            secure,
            server_capabilities,
        };

        let mut auth = AuthSession::new(auth::mechanism(kind, params.credentials()));
        let start = auth.start()?;
        let (handler, settled) = AuthHandler::channel(auth);
        session.submit(handler, &start).await?;
        settle(settled).await?;
        info!("authenticated as {} using {kind}", params.user);

        Ok(session)
    }

    pub fn is_open(&self) -> bool {
        self.shared.open.load(Ordering::SeqCst)
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    /// Mechanism the session authenticated with.
    pub fn mechanism(&self) -> AuthMechanismKind {
        self.mechanism
    }

    /// Capabilities the server reported during the handshake.
    pub fn server_capabilities(&self) -> &[(String, AnyValue)] {
        &self.server_capabilities
    }

    /// Every notice the server sends from now on.
    pub fn notices(&self) -> mpsc::UnboundedReceiver<ServerNotice> {
        self.shared.queue().subscribe()
    }

    /// Pushes `handler` and writes `request` as one step.
    async fn submit<H: ResponseHandler + 'static>(
        &self,
        handler: H,
        request: &ClientMessage,
    ) -> Result<(), ProtocolError> {
        if !self.is_open() {
            return Err(ProtocolError::ConnectionClosed);
        }
        let frame = request.to_frame();
        let mut writer = self.shared.writer.lock().await;
        self.shared.queue().enqueue(Box::new(handler))?;

        let written = async {
            writer.write_all(&frame).await?;
            writer.flush().await
        }
        .await;
        drop(writer);

        if let Err(e) = written {
            let error = ProtocolError::from(e);
            self.shared.shutdown(error.clone());
            return Err(error);
        }
        debug!("sent {} bytes, tag {}", frame.len(), request.type_tag());
        Ok(())
    }

    async fn single(&self, request: ClientMessage) -> Result<ServerMessage, ProtocolError> {
        let (handler, settled) = SingleReply::channel();
        self.submit(handler, &request).await?;
        settle(settled).await
    }

    /// Queries the server's current capabilities.
    pub async fn capabilities(&self) -> Result<Vec<(String, AnyValue)>, ProtocolError> {
        match self.single(ClientMessage::CapabilitiesGet).await? {
            ServerMessage::Capabilities(caps) => Ok(caps),
            other => Err(ProtocolError::Violation(format!(
                "expected capabilities, got {}",
                other.name()
            ))),
        }
    }

    /// Sends a statement and returns the stream of its results.
    pub async fn execute(&self, request: ClientMessage) -> Result<Execution, ProtocolError> {
        let (handler, execution) = Execution::channel();
        self.submit(handler, &request).await?;
        Ok(execution)
    }

    pub async fn execute_sql(&self, sql: &str, args: Vec<AnyValue>) -> Result<Execution, ProtocolError> {
        self.execute(ClientMessage::sql(sql, args)).await
    }

    /// Resets session state (variables, temporary tables) keeping the authentication.
    pub async fn reset(&self) -> Result<(), ProtocolError> {
        expect_ok(self.single(ClientMessage::SessionReset { keep_open: true }).await?)
    }

    /// Closes the connection, failing anything still queued.
    pub async fn close(self) -> Result<(), ProtocolError> {
        if !self.is_open() {
            return Ok(());
        }
        let reply = self.single(ClientMessage::ConnectionClose).await;
        self.shared.shutdown(ProtocolError::ConnectionClosed);
        let _ = self.shared.writer.lock().await.shutdown().await;
        expect_ok(reply?)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.reader.abort();
        self.shared.shutdown(ProtocolError::ConnectionClosed);
    }
}

fn capability<'a>(caps: &'a [(String, AnyValue)], name: &str) -> Option<&'a AnyValue> {
    caps.iter().find(|(n, _)| n == name).map(|(_, v)| v)
}

fn expect_ok(message: ServerMessage) -> Result<(), ProtocolError> {
    match message {
        ServerMessage::Ok(_) => Ok(()),
        other => Err(ProtocolError::Violation(format!("expected Ok, got {}", other.name()))),
    }
}

async fn settle<T>(settled: oneshot::Receiver<Result<T, ProtocolError>>) -> Result<T, ProtocolError> {
    settled.await.unwrap_or(Err(ProtocolError::ConnectionClosed))
}

/// Request and reply before the reader task exists.
async fn exchange(
    stream: &mut BoxStream,
    transport: &mut FrameTransport,
    request: &ClientMessage,
) -> Result<ServerMessage, ProtocolError> {
    stream.write_all(&request.to_frame()).await?;
    stream.flush().await?;

    loop {
        while let Some(frame) = transport.next_frame()? {
            match codec::decode(&frame)? {
                ServerMessage::Notice(notice) => debug!("notice during handshake: {notice:?}"),
                ServerMessage::Error(e) => return Err(e),
                message => return Ok(message),
            }
        }
        if stream.read_buf(transport.buffer_mut()).await? == 0 {
            return Err(ProtocolError::ConnectionClosed);
        }
    }
}

async fn read_loop(mut reader: ReadHalf<BoxStream>, mut transport: FrameTransport, shared: Arc<Shared>) {
    let reason = match pump(&mut reader, &mut transport, &shared).await {
        Ok(()) => ProtocolError::ConnectionClosed,
        Err(e) => e,
    };
    shared.shutdown(reason);
}

async fn pump(
    reader: &mut ReadHalf<BoxStream>,
    transport: &mut FrameTransport,
    shared: &Shared,
) -> Result<(), ProtocolError> {
    loop {
        for frame in transport.drain()? {
            let replies = shared.queue().route(&frame)?;
            if !replies.is_empty() {
                shared.write(&replies).await?;
            }
        }
        if reader.read_buf(transport.buffer_mut()).await? == 0 {
            debug!("server closed the stream");
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{future::Future, io, pin::Pin};

    use prost::Message;
    use tokio::io::DuplexStream;

    use super::*;
    use crate::{
        expr::Scalar,
        protocol::{
            Frame, Value,
            codec::{encode_any, tests::{error_frame, frame, state_notice}},
            message::{self, SessionStateParameter, client, server},
        },
    };

    const NONCE: [u8; 20] = [7; 20];

    /// Scripted server end of a duplex pipe.
    struct FakeServer {
        stream: DuplexStream,
        transport: FrameTransport,
    }

    impl FakeServer {
        async fn expect(&mut self, tag: u8) -> Frame {
            loop {
                if let Some(frame) = self.transport.next_frame().unwrap() {
                    assert_eq!(frame.type_tag, tag, "unexpected client frame");
                    return frame;
                }
                let n = self.stream.read_buf(self.transport.buffer_mut()).await.unwrap();
                assert!(n > 0, "client hung up");
            }
        }

        async fn send(&mut self, frame: Frame) {
            self.stream.write_all(&frame.encode()).await.unwrap();
        }

        async fn send_bare(&mut self, tag: u8) {
            self.send(Frame::new(tag, Bytes::new())).await;
        }

        async fn capabilities(&mut self, mechanisms: &[&str]) {
            self.expect(client::CON_CAPABILITIES_GET).await;
            let list = AnyValue::Array(mechanisms.iter().map(|m| AnyValue::from(*m)).collect());
            let caps = message::Capabilities {
                capabilities: vec![message::Capability {
                    name: MECHANISMS_CAPABILITY.to_string(),
                    value: Some(encode_any(&list)),
                }],
            };
            self.send(frame(server::CONN_CAPABILITIES, caps)).await;
        }

        async fn mysql41(&mut self) {
            self.capabilities(&["MYSQL41", "SHA256_MEMORY"]).await;
            let start = self.expect(client::SESS_AUTHENTICATE_START).await;
            let start = message::AuthenticateStart::decode(&start.payload[..]).unwrap();
            assert_eq!(start.mech_name, "MYSQL41");

            self.send(frame(
                server::SESS_AUTHENTICATE_CONTINUE,
                message::AuthenticateContinue { auth_data: NONCE.to_vec() },
            ))
            .await;
            let reply = self.expect(client::SESS_AUTHENTICATE_CONTINUE).await;
            let reply = message::AuthenticateContinue::decode(&reply.payload[..]).unwrap();
            assert!(reply.auth_data.starts_with(b"test\0root\0*"));

            self.send(frame(server::SESS_AUTHENTICATE_OK, message::AuthenticateOk { auth_data: None }))
                .await;
        }

        /// One `SELECT` answer with an unsigned column named `name`.
        async fn answer(&mut self, name: &str, values: &[u8]) {
            let stmt = self.expect(client::SQL_STMT_EXECUTE).await;
            assert!(message::StmtExecute::decode(&stmt.payload[..]).is_ok());
            self.send(frame(
                server::RESULTSET_COLUMN_META_DATA,
                message::ColumnMetaData {
                    r#type: message::FieldType::Uint as i32,
                    name: Some(name.as_bytes().to_vec()),
                    ..Default::default()
                },
            ))
            .await;
            for v in values {
                self.send(frame(server::RESULTSET_ROW, message::Row { field: vec![vec![*v]] }))
                    .await;
            }
            self.send_bare(server::RESULTSET_FETCH_DONE).await;
            self.send(state_notice(SessionStateParameter::RowsAffected, Scalar::UnsignedInt(0)))
                .await;
            self.send_bare(server::SQL_STMT_EXECUTE_OK).await;
        }
    }

    fn pipe() -> (BoxStream, FakeServer) {
        let (client, server) = tokio::io::duplex(64 * 1024);
        (
            Box::new(client),
            FakeServer {
                stream: server,
                transport: FrameTransport::default(),
            },
        )
    }

    fn params() -> ConnectionParams {
        ConnectionParams::default().user("root").password("secret").schema("test")
    }

    #[tokio::test]
    async fn handshake_then_query() {
        let (stream, mut server) = pipe();
        let fake = tokio::spawn(async move {
            server.mysql41().await;
            server.answer("n", &[1, 2]).await;
            server
        });

        let session = Session::handshake(stream, &params(), None).await.unwrap();
        assert_eq!(session.mechanism(), AuthMechanismKind::Mysql41);
        assert!(session.is_open());
        assert!(!session.is_secure());
        assert_eq!(session.server_capabilities().len(), 1);

        let (sets, outcome) = session
            .execute_sql("SELECT n FROM t", vec![])
            .await
            .unwrap()
            .collect()
            .await
            .unwrap();
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].rows.len(), 2);
        assert_eq!(sets[0].rows[1].get_by_name("n"), Some(&Value::UInt(2)));
        assert_eq!(outcome.rows_affected, Some(0));
        fake.await.unwrap();
    }

    #[tokio::test]
    async fn pipelined_statements_keep_their_order() {
        let (stream, mut server) = pipe();
        let fake = tokio::spawn(async move {
            server.mysql41().await;
            server.answer("first", &[1]).await;
            server.answer("second", &[2, 3]).await;
            server
        });

        let session = Session::handshake(stream, &params(), None).await.unwrap();
        let first = session.execute_sql("SELECT 1", vec![]).await.unwrap();
        let mut second = session.execute_sql("SELECT 2", vec![]).await.unwrap();

        let row = second.next_row().await.unwrap();
        assert_eq!(row.columns()[0].name, "second");

        // By the time the second statement has rows the first is settled.
        let (sets, _) = first.collect().await.unwrap();
        assert_eq!(sets[0].columns[0].name, "first");
        assert_eq!(sets[0].rows.len(), 1);
        fake.await.unwrap();
    }

    #[tokio::test]
    async fn server_error_fails_only_its_statement() {
        let (stream, mut server) = pipe();
        let fake = tokio::spawn(async move {
            server.mysql41().await;
            server.expect(client::SQL_STMT_EXECUTE).await;
            server.send(error_frame(1146, "Table 'test.nope' doesn't exist", false)).await;
            server.answer("n", &[5]).await;
            server
        });

        let session = Session::handshake(stream, &params(), None).await.unwrap();
        let err = session
            .execute_sql("SELECT * FROM nope", vec![])
            .await
            .unwrap()
            .finish()
            .await
            .unwrap_err();
        assert!(matches!(err, ProtocolError::Server { code: 1146, .. }));

        let mut ok = session.execute_sql("SELECT 5", vec![]).await.unwrap();
        assert_eq!(ok.next_row().await.unwrap().get(0), Some(&Value::UInt(5)));
        assert!(session.is_open());
        fake.await.unwrap();
    }

    #[tokio::test]
    async fn connection_loss_settles_pending_operations() {
        let (stream, mut server) = pipe();
        let fake = tokio::spawn(async move {
            server.mysql41().await;
            server.expect(client::SQL_STMT_EXECUTE).await;
            drop(server);
        });

        let session = Session::handshake(stream, &params(), None).await.unwrap();
        let execution = session.execute_sql("SELECT SLEEP(10)", vec![]).await.unwrap();
        fake.await.unwrap();

        assert_eq!(execution.finish().await, Err(ProtocolError::ConnectionClosed));
        assert!(!session.is_open());
        assert!(matches!(
            session.execute_sql("SELECT 1", vec![]).await,
            Err(ProtocolError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn classic_server_is_detected() {
        let (stream, mut server) = pipe();
        tokio::spawn(async move {
            server
                .stream
                .write_all(&[0x4a, 0x00, 0x00, 0x00, 0x0a, b'8', b'.', b'0', b'.', b'3'])
                .await
                .unwrap();
            server
        });

        let err = Session::handshake(stream, &params(), None).await.err().unwrap();
        assert_eq!(err, ProtocolError::NotXProtocol);
    }

    #[tokio::test]
    async fn plain_is_refused_without_tls() {
        let (stream, mut server) = pipe();
        tokio::spawn(async move {
            server.capabilities(&["MYSQL41", "PLAIN"]).await;
            server
        });

        let err = Session::handshake(stream, &params().auth(AuthMechanismKind::Plain), None)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ProtocolError::Authentication(m) if m.contains("secure")));
    }

    #[tokio::test]
    async fn sha256_memory_cache_miss() {
        let (stream, mut server) = pipe();
        tokio::spawn(async move {
            server.capabilities(&["SHA256_MEMORY"]).await;
            server.expect(client::SESS_AUTHENTICATE_START).await;
            server
                .send(frame(
                    server::SESS_AUTHENTICATE_CONTINUE,
                    message::AuthenticateContinue { auth_data: NONCE.to_vec() },
                ))
                .await;
            server.expect(client::SESS_AUTHENTICATE_CONTINUE).await;
            server.send(error_frame(1045, "Access denied", false)).await;
            server
        });

        let err = Session::handshake(stream, &params(), None).await.err().unwrap();
        assert!(matches!(err, ProtocolError::Authentication(m) if m.contains("SHA256_MEMORY")));
    }

    /// Pretends the stream is now encrypted.
    struct NoopTls;

    impl TlsUpgrade for NoopTls {
        fn upgrade<'a>(
            &'a self,
            stream: BoxStream,
            _host: &'a str,
        ) -> Pin<Box<dyn Future<Output = io::Result<BoxStream>> + Send + 'a>> {
            Box::pin(async move { Ok(stream) })
        }
    }

    #[tokio::test]
    async fn tls_upgrade_prefers_plain() {
        let (stream, mut server) = pipe();
        let fake = tokio::spawn(async move {
            server.expect(client::CON_CAPABILITIES_SET).await;
            server.send(frame(server::OK, message::ServerOk { msg: None })).await;
            server.capabilities(&["PLAIN", "MYSQL41"]).await;
            let start = server.expect(client::SESS_AUTHENTICATE_START).await;
            let start = message::AuthenticateStart::decode(&start.payload[..]).unwrap();
            assert_eq!(start.mech_name, "PLAIN");
            assert_eq!(start.auth_data.as_deref(), Some(&b"test\0root\0secret"[..]));
            server
                .send(frame(server::SESS_AUTHENTICATE_OK, message::AuthenticateOk { auth_data: None }))
                .await;
            server
        });

        let session = Session::handshake(stream, &params().tls(TlsMode::Required), Some(&NoopTls))
            .await
            .unwrap();
        assert!(session.is_secure());
        assert_eq!(session.mechanism(), AuthMechanismKind::Plain);
        fake.await.unwrap();
    }

    #[tokio::test]
    async fn tls_required_without_implementation() {
        let (stream, _server) = pipe();
        let err = Session::handshake(stream, &params().tls(TlsMode::Required), None)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ProtocolError::Transport(_)));
    }

    #[tokio::test]
    async fn reset_capabilities_and_close() {
        let (stream, mut server) = pipe();
        let fake = tokio::spawn(async move {
            server.mysql41().await;
            server.expect(client::SESS_RESET).await;
            server.send(frame(server::OK, message::ServerOk { msg: None })).await;
            server.capabilities(&["MYSQL41"]).await;
            server.expect(client::CON_CLOSE).await;
            server.send(frame(server::OK, message::ServerOk { msg: Some("bye!".into()) })).await;
            server
        });

        let session = Session::handshake(stream, &params(), None).await.unwrap();
        let mut notices = session.notices();
        session.reset().await.unwrap();
        let caps = session.capabilities().await.unwrap();
        assert_eq!(caps[0].1.string_list(), vec!["MYSQL41"]);
        session.close().await.unwrap();
        fake.await.unwrap();

        // Subscribers are released once the session is gone.
        assert!(notices.recv().await.is_none());
    }
}

//! FIFO correlation of requests and responses.
//!
//! The protocol has no request ids: the server answers requests strictly in the order
//! they were sent. Every request therefore pushes a [`ResponseHandler`] onto the
//! [`WorkQueue`], and every inbound frame belongs to the handler at the head until that
//! handler reports it has settled. Notices are the exception and are also broadcast to
//! subscribers regardless of what is queued.
use std::collections::VecDeque;

use bytes::Bytes;
use log::{debug, warn};
use tokio::sync::{mpsc, oneshot};

use super::{
    Frame, ProtocolError,
    codec::{self, Notice, ServerMessage, ServerNotice},
};

/// What a handler wants after consuming a message.
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    /// More frames belong to this operation.
    Pending,
    /// The operation is complete; pop it.
    Settled,
    /// Write these frames and keep routing to this operation.
    Reply(Vec<Bytes>),
}

/// One queued operation.
///
/// A handler settles exactly once: either it returns [`Disposition::Settled`], or the
/// queue calls [`fail`](Self::fail) with the error that removed it.
pub trait ResponseHandler: Send {
    fn handle(&mut self, message: ServerMessage) -> Result<Disposition, ProtocolError>;

    /// A local notice received while this operation is at the head.
    fn notice(&mut self, _notice: &Notice) {}

    fn fail(self: Box<Self>, error: ProtocolError);
}

struct Entry {
    id: u64,
    handler: Box<dyn ResponseHandler>,
}

#[derive(Default)]
pub struct WorkQueue {
    entries: VecDeque<Entry>,
    next_id: u64,
    closed: Option<ProtocolError>,
    subscribers: Vec<mpsc::UnboundedSender<ServerNotice>>,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_some()
    }

    /// Appends an operation. Fails with the close reason once the queue is closed.
    pub fn enqueue(&mut self, handler: Box<dyn ResponseHandler>) -> Result<u64, ProtocolError> {
        if let Some(reason) = &self.closed {
            return Err(reason.clone());
        }
        let id = self.next_id;
        self.next_id += 1;
        debug!("enqueue operation {id} behind {} others", self.entries.len());
        self.entries.push_back(Entry { id, handler });
        Ok(id)
    }

    /// Receives every notice, local or global.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<ServerNotice> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    /// Attributes one inbound frame and returns the frames to write in response.
    ///
    /// An error means the connection can no longer be trusted; the caller is expected
    /// to [`close`](Self::close) the queue with it.
    pub fn route(&mut self, frame: &Frame) -> Result<Vec<Bytes>, ProtocolError> {
        let message = codec::decode(frame)?;

        if let ServerMessage::Notice(notice) = message {
            self.subscribers.retain(|tx| tx.send(notice.clone()).is_ok());
            if notice.local {
                match self.entries.front_mut() {
                    Some(head) => head.handler.notice(&notice.notice),
                    None => debug!("local notice with no pending operation"),
                }
            }
            return Ok(Vec::new());
        }

        let Some(head) = self.entries.front_mut() else {
            return match message {
                ServerMessage::Error(e) if e.is_fatal() => {
                    warn!("fatal error with no pending operation: {e}");
                    Err(e)
                }
                other => {
                    warn!("dropping {} with no pending operation", other.name());
                    Ok(Vec::new())
                }
            };
        };

        debug!("route {} to operation {}", message.name(), head.id);
        match head.handler.handle(message) {
            Ok(Disposition::Pending) => Ok(Vec::new()),
            Ok(Disposition::Reply(frames)) => Ok(frames),
            Ok(Disposition::Settled) => {
                self.entries.pop_front();
                Ok(Vec::new())
            }
            Err(error) => {
                if let Some(entry) = self.entries.pop_front() {
                    debug!("operation {} failed: {error}", entry.id);
                    entry.handler.fail(error.clone());
                }
                if error.is_fatal() { Err(error) } else { Ok(Vec::new()) }
            }
        }
    }

    /// Fails every queued operation with `reason` and rejects later enqueues.
    pub fn close(&mut self, reason: ProtocolError) {
        if self.closed.is_none() {
            debug!("closing work queue with {} pending: {reason}", self.entries.len());
            self.closed = Some(reason.clone());
        }
        for entry in self.entries.drain(..) {
            entry.handler.fail(reason.clone());
        }
        self.subscribers.clear();
    }
}

/// Operation answered by a single message, such as capability or session requests.
pub struct SingleReply {
    settle: Option<oneshot::Sender<Result<ServerMessage, ProtocolError>>>,
}

impl SingleReply {
    pub fn channel() -> (Self, oneshot::Receiver<Result<ServerMessage, ProtocolError>>) {
        let (settle, rx) = oneshot::channel();
        (Self { settle: Some(settle) }, rx)
    }
}

impl ResponseHandler for SingleReply {
    fn handle(&mut self, message: ServerMessage) -> Result<Disposition, ProtocolError> {
        if let ServerMessage::Error(e) = message {
            return Err(e);
        }
        if let Some(tx) = self.settle.take() {
            let _ = tx.send(Ok(message));
        }
        Ok(Disposition::Settled)
    }

    fn fail(mut self: Box<Self>, error: ProtocolError) {
        if let Some(tx) = self.settle.take() {
            let _ = tx.send(Err(error));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Scalar;
    use crate::protocol::{
        codec::tests::{error_frame, frame, state_notice},
        message::{self, SessionStateParameter, server},
        resultset::{Execution, ResultEvent},
    };

    fn meta_frame(name: &str) -> Frame {
        frame(
            server::RESULTSET_COLUMN_META_DATA,
            message::ColumnMetaData {
                r#type: message::FieldType::Uint as i32,
                name: Some(name.as_bytes().to_vec()),
                ..Default::default()
            },
        )
    }

    fn row_frame(value: u8) -> Frame {
        frame(server::RESULTSET_ROW, message::Row { field: vec![vec![value]] })
    }

    fn bare(tag: u8) -> Frame {
        Frame::new(tag, Bytes::new())
    }

    #[tokio::test]
    async fn first_operation_settles_before_second_sees_rows() {
        let mut queue = WorkQueue::new();
        let (h1, mut first) = Execution::channel();
        let (h2, mut second) = Execution::channel();
        queue.enqueue(Box::new(h1)).unwrap();
        queue.enqueue(Box::new(h2)).unwrap();

        for f in [meta_frame("a"), row_frame(1), bare(server::RESULTSET_FETCH_DONE)] {
            queue.route(&f).unwrap();
        }
        queue.route(&bare(server::SQL_STMT_EXECUTE_OK)).unwrap();
        assert_eq!(queue.len(), 1);

        // Nothing for the second operation yet.
        assert!(second.try_next_event().is_none());

        assert!(matches!(first.next_event().await, Some(ResultEvent::Metadata(_))));
        assert!(first.next_row().await.is_some());
        assert!(first.next_row().await.is_none());
        first.finish().await.unwrap();

        for f in [meta_frame("b"), row_frame(2), bare(server::RESULTSET_FETCH_DONE)] {
            queue.route(&f).unwrap();
        }
        queue.route(&bare(server::SQL_STMT_EXECUTE_OK)).unwrap();
        assert!(queue.is_empty());

        let row = second.next_row().await.unwrap();
        assert_eq!(row.columns()[0].name, "b");
    }

    #[tokio::test]
    async fn server_error_fails_only_the_head() {
        let mut queue = WorkQueue::new();
        let (h1, first) = Execution::channel();
        let (h2, second) = Execution::channel();
        queue.enqueue(Box::new(h1)).unwrap();
        queue.enqueue(Box::new(h2)).unwrap();

        queue.route(&error_frame(1064, "You have an error", false)).unwrap();
        queue.route(&bare(server::SQL_STMT_EXECUTE_OK)).unwrap();

        match first.finish().await {
            Err(ProtocolError::Server { code, .. }) => assert_eq!(code, 1064),
            other => panic!("unexpected {other:?}"),
        }
        assert!(second.finish().await.is_ok());
    }

    #[tokio::test]
    async fn fatal_error_is_returned() {
        let mut queue = WorkQueue::new();
        let (h1, first) = Execution::channel();
        queue.enqueue(Box::new(h1)).unwrap();
        let err = queue.route(&error_frame(1053, "Server shutdown", true)).unwrap_err();
        assert!(err.is_fatal());
        assert!(first.finish().await.is_err());
    }

    #[tokio::test]
    async fn close_settles_everything() {
        let mut queue = WorkQueue::new();
        let (h1, first) = Execution::channel();
        let (h2, rx) = SingleReply::channel();
        queue.enqueue(Box::new(h1)).unwrap();
        queue.enqueue(Box::new(h2)).unwrap();

        queue.close(ProtocolError::ConnectionClosed);
        assert!(queue.is_empty());
        assert_eq!(first.finish().await, Err(ProtocolError::ConnectionClosed));
        assert_eq!(rx.await.unwrap(), Err(ProtocolError::ConnectionClosed));

        let (h3, _) = SingleReply::channel();
        assert_eq!(queue.enqueue(Box::new(h3)), Err(ProtocolError::ConnectionClosed));
    }

    #[tokio::test]
    async fn notices_reach_subscribers_and_head() {
        let mut queue = WorkQueue::new();
        let mut notices = queue.subscribe();

        // With an empty queue the notice still reaches the sink.
        queue
            .route(&state_notice(SessionStateParameter::CurrentSchema, Scalar::Str("db".into())))
            .unwrap();
        assert!(notices.recv().await.unwrap().local);

        let (h1, first) = Execution::channel();
        queue.enqueue(Box::new(h1)).unwrap();
        queue
            .route(&state_notice(SessionStateParameter::RowsAffected, Scalar::UnsignedInt(7)))
            .unwrap();
        queue.route(&bare(server::SQL_STMT_EXECUTE_OK)).unwrap();

        assert_eq!(first.finish().await.unwrap().rows_affected, Some(7));
        assert!(notices.recv().await.is_some());
    }

    #[test]
    fn frames_without_an_operation_are_dropped() {
        let mut queue = WorkQueue::new();
        assert!(queue.route(&row_frame(1)).unwrap().is_empty());
        assert!(queue.route(&error_frame(1, "late", false)).is_ok());
    }
}

//! In-memory transport fed through channels
//!
//! Each call to [`ChannelConnector::add_connection`] queues one connection
//! that the next `connect()` will hand out, and returns the [`FeedHandle`]
//! that drives it. `connect()` with nothing queued fails like a refused
//! connection. Used to replay captured upstream logs and to script sessions
//! in tests.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{MessageStream, StreamConnector};
use crate::monitor::errors::TransportError;

#[derive(Debug)]
enum FeedEvent {
    Text(String),
    Error(TransportError),
    Close,
}

/// Drives one scripted connection. Dropping every handle ends the stream
/// once queued frames are consumed.
#[derive(Debug, Clone)]
pub struct FeedHandle {
    tx: mpsc::UnboundedSender<FeedEvent>,
}

impl FeedHandle {
    /// Queue an inbound text frame. Returns false once the stream is gone.
    pub fn push(&self, text: impl Into<String>) -> bool {
        self.tx.send(FeedEvent::Text(text.into())).is_ok()
    }

    /// Make the next read fail with a transport error
    pub fn fail(&self, error: TransportError) -> bool {
        self.tx.send(FeedEvent::Error(error)).is_ok()
    }

    /// Make the next read report an upstream close
    pub fn close(&self) -> bool {
        self.tx.send(FeedEvent::Close).is_ok()
    }

    /// True once the session side has dropped the stream
    pub fn is_disconnected(&self) -> bool {
        self.tx.is_closed()
    }
}

struct ChannelStream {
    rx: mpsc::UnboundedReceiver<FeedEvent>,
    sent: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl MessageStream for ChannelStream {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.sent.lock().push(text);
        Ok(())
    }

    async fn next_text(&mut self) -> Option<Result<String, TransportError>> {
        match self.rx.recv().await {
            Some(FeedEvent::Text(text)) => Some(Ok(text)),
            Some(FeedEvent::Error(error)) => Some(Err(error)),
            Some(FeedEvent::Close) | None => None,
        }
    }

    async fn close(&mut self) {
        self.rx.close();
    }
}

/// Connector handing out pre-queued in-memory connections
#[derive(Default)]
pub struct ChannelConnector {
    pending: Mutex<VecDeque<ChannelStream>>,
    sent: Arc<Mutex<Vec<String>>>,
}

impl ChannelConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a connection for the next `connect()`
    pub fn add_connection(&self) -> FeedHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        self.pending.lock().push_back(ChannelStream {
            rx,
            sent: Arc::clone(&self.sent),
        });
        FeedHandle { tx }
    }

    /// Single connection that yields `lines` and then ends
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let connector = Self::new();
        let feed = connector.add_connection();
        for line in lines {
            feed.push(line);
        }
        connector
    }

    /// Every outbound frame written on any connection, in order
    pub fn sent_messages(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    /// Connections queued but not yet handed out
    pub fn pending_connections(&self) -> usize {
        self.pending.lock().len()
    }
}

#[async_trait]
impl StreamConnector for ChannelConnector {
    async fn connect(&self) -> Result<Box<dyn MessageStream>, TransportError> {
        match self.pending.lock().pop_front() {
            Some(stream) => Ok(Box::new(stream)),
            None => Err(TransportError::Connect(
                "no in-memory connection available".to_string(),
            )),
        }
    }

    fn endpoint(&self) -> String {
        "memory://channel".to_string()
    }
}

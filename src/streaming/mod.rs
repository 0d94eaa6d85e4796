//! Upstream transports for the ledger subscription
//!
//! The session only talks to [`StreamConnector`] / [`MessageStream`], so the
//! live WebSocket feed and the in-memory feed used for replays are
//! interchangeable.

pub mod channel_stream;
pub mod websocket_stream;

use async_trait::async_trait;

use crate::monitor::errors::TransportError;

pub use channel_stream::{ChannelConnector, FeedHandle};
pub use websocket_stream::WebSocketConnector;

/// Opens connections to the upstream feed
#[async_trait]
pub trait StreamConnector: Send + Sync {
    /// Open a new connection
    async fn connect(&self) -> Result<Box<dyn MessageStream>, TransportError>;

    /// Human-readable endpoint for logs
    fn endpoint(&self) -> String;
}

/// One open, text-framed, bidirectional connection
#[async_trait]
pub trait MessageStream: Send {
    /// Write one outbound text frame
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Next inbound text frame. `None` means upstream closed the stream.
    ///
    /// Implementations must be cancel-safe: the session races this against
    /// its stop signal.
    async fn next_text(&mut self) -> Option<Result<String, TransportError>>;

    /// Best-effort close
    async fn close(&mut self);
}

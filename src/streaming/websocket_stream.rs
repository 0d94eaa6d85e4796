//! WebSocket transport for the XRP Ledger public API

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

use super::{MessageStream, StreamConnector};
use crate::monitor::errors::TransportError;

/// Default public cluster endpoint
pub const DEFAULT_WS_URL: &str = "wss://xrplcluster.com";

/// Connector for a `ws://` or `wss://` endpoint
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: String,
}

impl WebSocketConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl Default for WebSocketConnector {
    fn default() -> Self {
        Self::new(DEFAULT_WS_URL)
    }
}

#[async_trait]
impl StreamConnector for WebSocketConnector {
    async fn connect(&self) -> Result<Box<dyn MessageStream>, TransportError> {
        info!(url = %self.url, "Connecting to WebSocket");

        let (ws, response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        info!(status = %response.status(), "WebSocket connected");
        Ok(Box::new(WebSocketMessageStream { inner: ws }))
    }

    fn endpoint(&self) -> String {
        self.url.clone()
    }
}

struct WebSocketMessageStream {
    inner: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl MessageStream for WebSocketMessageStream {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.inner
            .send(Message::Text(text))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn next_text(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            match self.inner.next().await {
                Some(Ok(Message::Text(text))) => return Some(Ok(text)),
                // Forwarded as text so the decoder counts it as malformed
                Some(Ok(Message::Binary(data))) => {
                    return Some(Ok(String::from_utf8_lossy(&data).into_owned()))
                }
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                Some(Ok(Message::Frame(_))) => continue,
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "WebSocket closed by server");
                    return None;
                }
                Some(Err(e)) => return Some(Err(TransportError::Receive(e.to_string()))),
                None => return None,
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.inner.close(None).await {
            debug!(error = %e, "WebSocket close failed");
        }
    }
}

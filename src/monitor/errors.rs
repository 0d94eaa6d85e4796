//! Error types for the ledger monitor

use std::time::Duration;
use thiserror::Error;

/// Failures of the upstream connection. Any of these ends the current
/// session in the `Failed` state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Could not establish the connection
    #[error("connection failed: {0}")]
    Connect(String),

    /// Connection attempt did not complete in time
    #[error("connection timed out after {0:?}")]
    Timeout(Duration),

    /// Outbound control message could not be written
    #[error("send failed: {0}")]
    Send(String),

    /// Read side of the connection failed
    #[error("receive failed: {0}")]
    Receive(String),

    /// Upstream closed the connection
    #[error("connection closed by upstream")]
    Closed,
}

/// A single inbound message could not be decoded. Never fatal to a session.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("top-level message is not an object")]
    NotAnObject,
}

/// Validation errors for operator-facing monitor settings
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MonitorError {
    #[error("whale threshold {value} outside allowed range [{min}, {max}]")]
    ThresholdOutOfRange { value: u64, min: u64, max: u64 },

    #[error("{name} capacity must be > 0")]
    ZeroCapacity { name: &'static str },
}

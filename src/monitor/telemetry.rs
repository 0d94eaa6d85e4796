//! Telemetry counters for the ingestion pipeline

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Atomic counters updated from the session read loop.
///
/// These count pipeline events (including ones the store never sees, such as
/// decode failures); the aggregate store holds the domain totals.
#[derive(Debug, Default)]
pub struct MonitorTelemetry {
    /// Raw frames received from upstream
    pub messages_received: AtomicU64,
    /// Frames that failed envelope decoding
    pub decode_errors: AtomicU64,
    /// Transaction messages skipped because they were not validated
    pub unvalidated_skipped: AtomicU64,
    /// Records applied to the store
    pub records_applied: AtomicU64,
    /// Records classified as whales
    pub whales_detected: AtomicU64,
    /// ledgerClosed events observed
    pub ledgers_closed: AtomicU64,
    /// Records lost on handoff overflow
    pub handoff_dropped: AtomicU64,
    /// Messages ignored by the dispatcher
    pub ignored_messages: AtomicU64,
    /// Sessions that reached `Connected`
    pub sessions_started: AtomicU64,
    /// Sessions ended by a transport error
    pub transport_failures: AtomicU64,
}

/// Plain copy of the counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TelemetrySnapshot {
    pub messages_received: u64,
    pub decode_errors: u64,
    pub unvalidated_skipped: u64,
    pub records_applied: u64,
    pub whales_detected: u64,
    pub ledgers_closed: u64,
    pub handoff_dropped: u64,
    pub ignored_messages: u64,
    pub sessions_started: u64,
    pub transport_failures: u64,
}

impl MonitorTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            messages_received: self.messages_received.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            unvalidated_skipped: self.unvalidated_skipped.load(Ordering::Relaxed),
            records_applied: self.records_applied.load(Ordering::Relaxed),
            whales_detected: self.whales_detected.load(Ordering::Relaxed),
            ledgers_closed: self.ledgers_closed.load(Ordering::Relaxed),
            handoff_dropped: self.handoff_dropped.load(Ordering::Relaxed),
            ignored_messages: self.ignored_messages.load(Ordering::Relaxed),
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
            transport_failures: self.transport_failures.load(Ordering::Relaxed),
        }
    }

    /// JSON export for logs and the metrics endpoint
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.snapshot()).unwrap_or_else(|_| "{}".to_string())
    }

    /// Reset all counters (useful for testing)
    pub fn reset(&self) {
        for counter in [
            &self.messages_received,
            &self.decode_errors,
            &self.unvalidated_skipped,
            &self.records_applied,
            &self.whales_detected,
            &self.ledgers_closed,
            &self.handoff_dropped,
            &self.ignored_messages,
            &self.sessions_started,
            &self.transport_failures,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

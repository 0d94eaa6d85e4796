//! Subscription session: owns one upstream connection at a time
//!
//! State machine:
//! `Disconnected -> Connecting -> Connected -> (Disconnected | Failed)`.
//!
//! The run task is the only writer of the aggregate store. `stop()` only
//! flips a per-run signal; the run task notices it (it is raced against every
//! pending read) and moves the state to `Disconnected` itself. There is no
//! automatic reconnect: a transport error parks the session in `Failed` until
//! the operator calls `start()` again.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::classifier::Classifier;
use super::errors::TransportError;
use super::handoff::{HandoffResult, HandoffSender};
use super::parser::{decode_message, parse_transaction, InboundMessage, SERVER_INFO_ID, SUBSCRIPTION_ID};
use super::record::TransactionRecord;
use super::store::AggregateStore;
use super::telemetry::MonitorTelemetry;
use crate::streaming::{MessageStream, StreamConnector};

/// Default bound on establishing the upstream connection
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection lifecycle as seen by the operator
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    /// Ended by a transport error; carries the reason
    Failed(String),
}

impl SessionState {
    /// Connecting or connected
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Connecting | SessionState::Connected)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, SessionState::Failed(_))
    }

    /// Numeric code for gauges
    pub fn code(&self) -> i64 {
        match self {
            SessionState::Disconnected => 0,
            SessionState::Connecting => 1,
            SessionState::Connected => 2,
            SessionState::Failed(_) => 3,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Disconnected => write!(f, "Disconnected"),
            SessionState::Connecting => write!(f, "Connecting"),
            SessionState::Connected => write!(f, "Connected"),
            SessionState::Failed(reason) => write!(f, "Failed: {}", reason),
        }
    }
}

/// Subscribe request for the transaction and ledger streams
pub fn subscribe_request() -> String {
    serde_json::json!({
        "id": SUBSCRIPTION_ID,
        "command": "subscribe",
        "streams": ["transactions", "ledger"],
    })
    .to_string()
}

/// One-shot server info query sent after subscribing
pub fn server_info_request() -> String {
    serde_json::json!({
        "id": SERVER_INFO_ID,
        "command": "server_info",
    })
    .to_string()
}

/// Per-message processing shared by every run of a session:
/// decode, parse, classify, apply, publish.
#[derive(Debug, Clone)]
pub struct RecordPipeline {
    classifier: Classifier,
    store: Arc<AggregateStore>,
    handoff: HandoffSender<Arc<TransactionRecord>>,
    telemetry: Arc<MonitorTelemetry>,
}

impl RecordPipeline {
    pub fn new(
        classifier: Classifier,
        store: Arc<AggregateStore>,
        handoff: HandoffSender<Arc<TransactionRecord>>,
        telemetry: Arc<MonitorTelemetry>,
    ) -> Self {
        Self {
            classifier,
            store,
            handoff,
            telemetry,
        }
    }

    /// Process one raw inbound frame. Never fails; bad frames are counted.
    pub fn handle_text(&self, text: &str) {
        MonitorTelemetry::incr(&self.telemetry.messages_received);

        let message = match decode_message(text) {
            Ok(message) => message,
            Err(e) => {
                MonitorTelemetry::incr(&self.telemetry.decode_errors);
                debug!(error = %e, "Skipping undecodable message");
                return;
            }
        };

        match message {
            InboundMessage::Transaction(value) => self.handle_transaction(&value),
            InboundMessage::LedgerClosed { ledger_index } => {
                self.store.set_current_ledger(ledger_index);
                MonitorTelemetry::incr(&self.telemetry.ledgers_closed);
                debug!(ledger_index, "Ledger closed");
            }
            InboundMessage::ServerInfo(result) => {
                let version = result
                    .pointer("/info/build_version")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown");
                debug!(build_version = version, "Server info received");
            }
            InboundMessage::Other { kind, id, error } => {
                MonitorTelemetry::incr(&self.telemetry.ignored_messages);
                match error {
                    Some(error) if id.as_deref() == Some(SUBSCRIPTION_ID) => {
                        warn!(error = %error, "Subscription request rejected");
                    }
                    Some(error) => warn!(error = %error, id = ?id, "Upstream error response"),
                    None => debug!(kind = ?kind, id = ?id, "Ignoring message"),
                }
            }
        }
    }

    fn handle_transaction(&self, value: &Value) {
        let Some(parsed) = parse_transaction(value) else {
            MonitorTelemetry::incr(&self.telemetry.unvalidated_skipped);
            return;
        };

        let record = Arc::new(self.classifier.classify(parsed));
        if record.is_whale {
            MonitorTelemetry::incr(&self.telemetry.whales_detected);
            debug!(
                amount = record.amount(),
                from = %record.source_account,
                to = %record.destination_account,
                ledger = record.ledger_index,
                "Whale transaction"
            );
        }

        self.store.apply(Arc::clone(&record));
        MonitorTelemetry::incr(&self.telemetry.records_applied);

        match self.handoff.publish(record) {
            HandoffResult::EvictedOldest | HandoffResult::Dropped => {
                MonitorTelemetry::incr(&self.telemetry.handoff_dropped);
            }
            HandoffResult::Sent | HandoffResult::Closed => {}
        }
    }

    pub fn store(&self) -> &Arc<AggregateStore> {
        &self.store
    }

    pub fn telemetry(&self) -> &Arc<MonitorTelemetry> {
        &self.telemetry
    }
}

/// Lifecycle owner for the upstream subscription
pub struct SubscriptionSession {
    connector: Arc<dyn StreamConnector>,
    pipeline: RecordPipeline,
    connect_timeout: Duration,
    reset_on_start: bool,
    state: Arc<watch::Sender<SessionState>>,
    stop: parking_lot::Mutex<Option<watch::Sender<bool>>>,
    worker: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl SubscriptionSession {
    pub fn new(
        connector: Arc<dyn StreamConnector>,
        pipeline: RecordPipeline,
        connect_timeout: Duration,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Disconnected);
        Self {
            connector,
            pipeline,
            connect_timeout,
            reset_on_start: false,
            state: Arc::new(state),
            stop: parking_lot::Mutex::new(None),
            worker: tokio::sync::Mutex::new(None),
        }
    }

    /// Clear the aggregate store at every accepted `start()`
    pub fn with_reset_on_start(mut self, reset_on_start: bool) -> Self {
        self.reset_on_start = reset_on_start;
        self
    }

    /// Begin a new run. Returns `false` (and does nothing) while a run is
    /// already connecting or connected.
    pub async fn start(&self) -> bool {
        let mut worker = self.worker.lock().await;

        let live = worker.as_ref().is_some_and(|handle| !handle.is_finished());
        if live && !self.stop_requested() && self.state().is_active() {
            debug!("Session already active, start ignored");
            return false;
        }

        // Join the previous run so its connection is released first
        if let Some(previous) = worker.take() {
            self.signal_stop();
            if let Err(e) = previous.await {
                error!(error = %e, "Previous session task ended abnormally");
            }
        }

        if self.reset_on_start {
            self.pipeline.store.reset();
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        *self.stop.lock() = Some(stop_tx);
        self.state.send_replace(SessionState::Connecting);

        let span = info_span!(
            "session",
            session_id = %Uuid::new_v4(),
            endpoint = %self.connector.endpoint()
        );
        let run = SessionRun {
            connector: Arc::clone(&self.connector),
            pipeline: self.pipeline.clone(),
            connect_timeout: self.connect_timeout,
            state: Arc::clone(&self.state),
        };
        *worker = Some(tokio::spawn(run.run(stop_rx).instrument(span)));
        true
    }

    /// Request the current run to end. Idempotent and non-blocking.
    pub fn stop(&self) {
        if self.signal_stop() {
            info!("Session stop requested");
        }
    }

    /// Stop and wait for the run task to finish
    pub async fn shutdown(&self) {
        self.stop();
        let handle = self.worker.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "Session task ended abnormally");
            }
        }
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Receiver observing every state transition
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Wait until the state satisfies `predicate`
    pub async fn wait_for_state<F>(&self, mut predicate: F) -> SessionState
    where
        F: FnMut(&SessionState) -> bool,
    {
        let mut rx = self.state.subscribe();
        let result = rx.wait_for(|state| predicate(state)).await.map(|state| state.clone());
        result.unwrap_or_else(|_| self.state())
    }

    pub fn endpoint(&self) -> String {
        self.connector.endpoint()
    }

    fn stop_requested(&self) -> bool {
        self.stop.lock().as_ref().map_or(true, |tx| *tx.borrow())
    }

    /// Returns true if this call flipped the signal
    fn signal_stop(&self) -> bool {
        match self.stop.lock().as_ref() {
            Some(tx) => !tx.send_replace(true),
            None => false,
        }
    }
}

impl Drop for SubscriptionSession {
    fn drop(&mut self) {
        self.signal_stop();
    }
}

/// Everything one spawned run needs, moved into the task
struct SessionRun {
    connector: Arc<dyn StreamConnector>,
    pipeline: RecordPipeline,
    connect_timeout: Duration,
    state: Arc<watch::Sender<SessionState>>,
}

impl SessionRun {
    async fn run(self, mut stop: watch::Receiver<bool>) {
        info!("Connecting");

        let connect = tokio::time::timeout(self.connect_timeout, self.connector.connect());
        let mut stream = tokio::select! {
            biased;
            _ = stopped(&mut stop) => {
                self.transition(SessionState::Disconnected);
                return;
            }
            result = connect => match result {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => return self.fail(e),
                Err(_) => return self.fail(TransportError::Timeout(self.connect_timeout)),
            },
        };

        for request in [subscribe_request(), server_info_request()] {
            if let Err(e) = stream.send_text(request).await {
                stream.close().await;
                return self.fail(e);
            }
        }

        MonitorTelemetry::incr(&self.pipeline.telemetry.sessions_started);
        self.transition(SessionState::Connected);

        if let Err(e) = self.read_loop(stream.as_mut(), &mut stop).await {
            return self.fail(e);
        }
        stream.close().await;
        self.transition(SessionState::Disconnected);
    }

    /// Returns `Ok(())` when stopped, `Err` on any transport failure
    async fn read_loop(
        &self,
        stream: &mut dyn MessageStream,
        stop: &mut watch::Receiver<bool>,
    ) -> Result<(), TransportError> {
        loop {
            tokio::select! {
                biased;
                _ = stopped(stop) => return Ok(()),
                frame = stream.next_text() => match frame {
                    Some(Ok(text)) => self.pipeline.handle_text(&text),
                    Some(Err(e)) => return Err(e),
                    None => return Err(TransportError::Closed),
                },
            }
        }
    }

    fn transition(&self, next: SessionState) {
        info!(state = %next, "Session state changed");
        self.state.send_replace(next);
    }

    fn fail(&self, error: TransportError) {
        error!(error = %error, "Session failed");
        MonitorTelemetry::incr(&self.pipeline.telemetry.transport_failures);
        self.state.send_replace(SessionState::Failed(error.to_string()));
    }
}

/// Resolves once stop is requested or the session handle is gone
async fn stopped(stop: &mut watch::Receiver<bool>) {
    let _ = stop.wait_for(|requested| *requested).await;
}

//! `LedgerMonitor`: explicit owner of the store, session and handoff
//!
//! Constructed once by the binary (or a test) and shared by reference; there
//! is no process-wide instance.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use super::classifier::{Classifier, WhaleThreshold};
use super::config::MonitorConfig;
use super::errors::MonitorError;
use super::handoff::{self, HandoffReceiver};
use super::record::TransactionRecord;
use super::session::{RecordPipeline, SessionState, SubscriptionSession};
use super::store::{AggregateStore, StoreSnapshot};
use super::telemetry::MonitorTelemetry;
use crate::streaming::StreamConnector;

pub struct LedgerMonitor {
    store: Arc<AggregateStore>,
    threshold: Arc<WhaleThreshold>,
    telemetry: Arc<MonitorTelemetry>,
    records: HandoffReceiver<Arc<TransactionRecord>>,
    session: SubscriptionSession,
    rate_window: Duration,
}

impl LedgerMonitor {
    pub fn new(
        config: &MonitorConfig,
        connector: Arc<dyn StreamConnector>,
        connect_timeout: Duration,
    ) -> Result<Self, MonitorError> {
        let store = Arc::new(AggregateStore::new(
            config.recent_capacity,
            config.whale_capacity,
        )?);
        let threshold = Arc::new(WhaleThreshold::new(config.whale_threshold)?);
        let telemetry = Arc::new(MonitorTelemetry::new());
        let (sender, records) = handoff::channel(config.handoff_capacity, config.drop_policy)?;

        let pipeline = RecordPipeline::new(
            Classifier::new(Arc::clone(&threshold)),
            Arc::clone(&store),
            sender,
            Arc::clone(&telemetry),
        );
        let session = SubscriptionSession::new(connector, pipeline, connect_timeout)
            .with_reset_on_start(config.reset_on_start);

        Ok(Self {
            store,
            threshold,
            telemetry,
            records,
            session,
            rate_window: config.rate_window(),
        })
    }

    /// See [`SubscriptionSession::start`]
    pub async fn start(&self) -> bool {
        self.session.start().await
    }

    pub fn stop(&self) {
        self.session.stop();
    }

    pub async fn shutdown(&self) {
        self.session.shutdown().await;
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.session.watch_state()
    }

    pub async fn wait_for_state<F>(&self, predicate: F) -> SessionState
    where
        F: FnMut(&SessionState) -> bool,
    {
        self.session.wait_for_state(predicate).await
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        self.store.snapshot()
    }

    /// Transactions observed within the configured rate window
    pub fn recent_rate(&self) -> usize {
        self.store.recent_rate(self.rate_window)
    }

    pub fn rate_window(&self) -> Duration {
        self.rate_window
    }

    /// Takes effect for records classified after this call
    pub fn set_whale_threshold(&self, xrp: u64) -> Result<(), MonitorError> {
        self.threshold.set(xrp)
    }

    pub fn whale_threshold(&self) -> u64 {
        self.threshold.get()
    }

    /// Live feed of newly applied records. All clones share one queue.
    pub fn subscribe_records(&self) -> HandoffReceiver<Arc<TransactionRecord>> {
        self.records.clone()
    }

    pub fn telemetry(&self) -> &Arc<MonitorTelemetry> {
        &self.telemetry
    }

    pub fn store(&self) -> &Arc<AggregateStore> {
        &self.store
    }

    pub fn endpoint(&self) -> String {
        self.session.endpoint()
    }

    /// Operator reset of every aggregate
    pub fn reset(&self) {
        self.store.reset();
    }
}

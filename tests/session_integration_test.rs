//! End-to-end session tests over the in-memory transport

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::time::{sleep, timeout};

use xrpl_watch::monitor::{LedgerMonitor, MonitorConfig, SessionState, TransportError};
use xrpl_watch::streaming::{ChannelConnector, MessageStream, StreamConnector};

const WAIT: Duration = Duration::from_secs(5);

fn payment(amount: &str, from: &str, to: &str) -> String {
    json!({
        "type": "transaction",
        "validated": true,
        "ledger_index": 91_000_000u64,
        "transaction": {
            "TransactionType": "Payment",
            "Account": from,
            "Destination": to,
            "Amount": amount,
        },
        "meta": { "TransactionResult": "tesSUCCESS" }
    })
    .to_string()
}

fn monitor_with(connector: Arc<ChannelConnector>, config: &MonitorConfig) -> LedgerMonitor {
    LedgerMonitor::new(config, connector, Duration::from_secs(2)).unwrap()
}

async fn wait_state<F>(monitor: &LedgerMonitor, predicate: F) -> SessionState
where
    F: FnMut(&SessionState) -> bool,
{
    timeout(WAIT, monitor.wait_for_state(predicate))
        .await
        .expect("state not reached in time")
}

async fn wait_transactions(monitor: &LedgerMonitor, count: u64) {
    timeout(WAIT, async {
        while monitor.store().totals().total_transactions < count {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("transactions not applied in time");
}

#[tokio::test]
async fn test_subscribes_and_processes_records() {
    let connector = Arc::new(ChannelConnector::new());
    let feed = connector.add_connection();
    let monitor = monitor_with(Arc::clone(&connector), &MonitorConfig::default());
    let records = monitor.subscribe_records();

    assert!(monitor.start().await);
    wait_state(&monitor, |s| *s == SessionState::Connected).await;

    let sent = connector.sent_messages();
    assert_eq!(sent.len(), 2);
    let subscribe: serde_json::Value = serde_json::from_str(&sent[0]).unwrap();
    assert_eq!(subscribe["command"], "subscribe");
    assert_eq!(subscribe["streams"], json!(["transactions", "ledger"]));
    let info: serde_json::Value = serde_json::from_str(&sent[1]).unwrap();
    assert_eq!(info["command"], "server_info");

    feed.push(r#"{"id":"dashboard_subscription","status":"success","type":"response","result":{}}"#);
    feed.push(payment("12000000000", "rWhale", "rDest"));
    feed.push(payment("1500000", "rSmall", "rDest"));
    feed.push(r#"{"type":"ledgerClosed","ledger_index":91000001}"#);
    wait_transactions(&monitor, 2).await;

    let snapshot = timeout(WAIT, async {
        loop {
            let snapshot = monitor.snapshot();
            if snapshot.current_ledger == 91_000_001 {
                return snapshot;
            }
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    assert_eq!(snapshot.totals.total_transactions, 2);
    assert_eq!(snapshot.totals.whale_count, 1);
    assert_eq!(snapshot.totals.total_volume_drops, 12_001_500_000);
    assert_eq!(snapshot.totals.active_accounts, 3);
    assert_eq!(snapshot.whales.len(), 1);
    assert_eq!(snapshot.whales[0].amount(), 12_000.0);

    let delivered = records.drain();
    assert_eq!(delivered.len(), 2);
    assert!(delivered[0].is_whale);
    assert!(!delivered[1].is_whale);

    monitor.shutdown().await;
    assert_eq!(monitor.state(), SessionState::Disconnected);
}

#[tokio::test]
async fn test_malformed_and_unvalidated_messages_do_not_stop_the_loop() {
    let connector = Arc::new(ChannelConnector::new());
    let feed = connector.add_connection();
    let monitor = monitor_with(Arc::clone(&connector), &MonitorConfig::default());

    monitor.start().await;
    feed.push("{not json");
    feed.push("[1,2,3]");
    feed.push(r#"{"type":"transaction","validated":false,"transaction":{"TransactionType":"Payment","Amount":"5"}}"#);
    feed.push(payment("abc", "rA", "rB"));
    wait_transactions(&monitor, 1).await;

    assert_eq!(monitor.state(), SessionState::Connected);
    let telemetry = monitor.telemetry().snapshot();
    assert_eq!(telemetry.decode_errors, 2);
    assert_eq!(telemetry.unvalidated_skipped, 1);
    assert_eq!(telemetry.records_applied, 1);

    let totals = monitor.store().totals();
    assert_eq!(totals.total_transactions, 1);
    assert_eq!(totals.whale_count, 0);
    assert_eq!(totals.total_volume_drops, 0);

    monitor.shutdown().await;
}

#[tokio::test]
async fn test_stop_then_start_reconnects_and_retains_state() {
    let connector = Arc::new(ChannelConnector::new());
    let first = connector.add_connection();
    let second = connector.add_connection();
    let monitor = monitor_with(Arc::clone(&connector), &MonitorConfig::default());

    monitor.start().await;
    wait_state(&monitor, |s| *s == SessionState::Connected).await;
    first.push(payment("20000000000", "rA", "rB"));
    wait_transactions(&monitor, 1).await;

    monitor.stop();
    monitor.stop();
    wait_state(&monitor, |s| *s == SessionState::Disconnected).await;
    assert!(first.is_disconnected());

    assert!(monitor.start().await);
    wait_state(&monitor, |s| *s == SessionState::Connected).await;
    assert_eq!(connector.sent_messages().len(), 4);
    assert_eq!(monitor.telemetry().snapshot().sessions_started, 2);

    second.push(payment("1000000", "rC", "rD"));
    wait_transactions(&monitor, 2).await;

    let totals = monitor.store().totals();
    assert_eq!(totals.total_transactions, 2);
    assert_eq!(totals.whale_count, 1);
    assert_eq!(totals.active_accounts, 4);

    monitor.shutdown().await;
}

#[tokio::test]
async fn test_reset_on_start_clears_previous_run() {
    let connector = Arc::new(ChannelConnector::new());
    let first = connector.add_connection();
    let _second = connector.add_connection();
    let config = MonitorConfig {
        reset_on_start: true,
        ..Default::default()
    };
    let monitor = monitor_with(Arc::clone(&connector), &config);

    monitor.start().await;
    first.push(payment("20000000000", "rA", "rB"));
    wait_transactions(&monitor, 1).await;
    monitor.stop();
    wait_state(&monitor, |s| *s == SessionState::Disconnected).await;

    monitor.start().await;
    wait_state(&monitor, |s| *s == SessionState::Connected).await;
    assert_eq!(monitor.store().totals().total_transactions, 0);
    assert!(monitor.snapshot().recent.is_empty());

    monitor.shutdown().await;
}

#[tokio::test]
async fn test_start_is_noop_while_connected() {
    let connector = Arc::new(ChannelConnector::new());
    let _feed = connector.add_connection();
    let _spare = connector.add_connection();
    let monitor = monitor_with(Arc::clone(&connector), &MonitorConfig::default());

    assert!(monitor.start().await);
    wait_state(&monitor, |s| *s == SessionState::Connected).await;

    assert!(!monitor.start().await);
    assert_eq!(connector.pending_connections(), 1);
    assert_eq!(monitor.telemetry().snapshot().sessions_started, 1);

    monitor.shutdown().await;
}

#[tokio::test]
async fn test_read_error_fails_session() {
    let connector = Arc::new(ChannelConnector::new());
    let feed = connector.add_connection();
    let monitor = monitor_with(Arc::clone(&connector), &MonitorConfig::default());

    monitor.start().await;
    wait_state(&monitor, |s| *s == SessionState::Connected).await;
    feed.push(payment("1000000", "rA", "rB"));
    feed.fail(TransportError::Receive("connection reset".to_string()));

    let state = wait_state(&monitor, |s| s.is_failed()).await;
    assert_eq!(
        state,
        SessionState::Failed("receive failed: connection reset".to_string())
    );
    assert_eq!(monitor.telemetry().snapshot().transport_failures, 1);
    // Data read before the failure is kept
    assert_eq!(monitor.store().totals().total_transactions, 1);
}

#[tokio::test]
async fn test_upstream_close_fails_session() {
    let connector = Arc::new(ChannelConnector::new());
    let feed = connector.add_connection();
    let monitor = monitor_with(Arc::clone(&connector), &MonitorConfig::default());

    monitor.start().await;
    feed.close();

    let state = wait_state(&monitor, |s| s.is_failed()).await;
    assert_eq!(
        state,
        SessionState::Failed("connection closed by upstream".to_string())
    );
}

#[tokio::test]
async fn test_connect_failure_fails_session_and_restart_recovers() {
    let connector = Arc::new(ChannelConnector::new());
    let monitor = monitor_with(Arc::clone(&connector), &MonitorConfig::default());

    monitor.start().await;
    let state = wait_state(&monitor, |s| s.is_failed()).await;
    assert!(state.to_string().contains("connection failed"));

    // Manual restart after a failure
    let _feed = connector.add_connection();
    assert!(monitor.start().await);
    wait_state(&monitor, |s| *s == SessionState::Connected).await;
    monitor.shutdown().await;
}

struct HangingConnector;

#[async_trait]
impl StreamConnector for HangingConnector {
    async fn connect(&self) -> Result<Box<dyn MessageStream>, TransportError> {
        std::future::pending().await
    }

    fn endpoint(&self) -> String {
        "hang://".to_string()
    }
}

#[tokio::test]
async fn test_connect_timeout_fails_session() {
    let monitor = LedgerMonitor::new(
        &MonitorConfig::default(),
        Arc::new(HangingConnector),
        Duration::from_millis(50),
    )
    .unwrap();

    monitor.start().await;
    let state = wait_state(&monitor, |s| s.is_failed()).await;
    assert!(state.to_string().contains("timed out"));
}

#[tokio::test]
async fn test_stop_while_connecting() {
    let monitor = LedgerMonitor::new(
        &MonitorConfig::default(),
        Arc::new(HangingConnector),
        Duration::from_secs(60),
    )
    .unwrap();

    monitor.start().await;
    assert_eq!(monitor.state(), SessionState::Connecting);
    monitor.stop();
    wait_state(&monitor, |s| *s == SessionState::Disconnected).await;
    monitor.shutdown().await;
}

#[tokio::test]
async fn test_threshold_change_applies_to_later_records_only() {
    let connector = Arc::new(ChannelConnector::new());
    let feed = connector.add_connection();
    let monitor = monitor_with(Arc::clone(&connector), &MonitorConfig::default());

    monitor.start().await;
    feed.push(payment("5000000000", "rA", "rB"));
    wait_transactions(&monitor, 1).await;

    monitor.set_whale_threshold(2_000).unwrap();
    feed.push(payment("5000000000", "rA", "rB"));
    wait_transactions(&monitor, 2).await;

    let snapshot = monitor.snapshot();
    assert!(!snapshot.recent[0].is_whale);
    assert!(snapshot.recent[1].is_whale);
    assert_eq!(snapshot.totals.whale_count, 1);

    assert!(monitor.set_whale_threshold(999).is_err());
    assert_eq!(monitor.whale_threshold(), 2_000);

    monitor.shutdown().await;
}

#[tokio::test]
async fn test_replay_of_captured_stream() {
    let capture = include_str!("../demos/sample_stream.jsonl");
    let connector = Arc::new(ChannelConnector::from_lines(
        capture.lines().filter(|line| !line.trim().is_empty()),
    ));
    let monitor = monitor_with(connector, &MonitorConfig::default());

    monitor.start().await;
    let state = wait_state(&monitor, |s| s.is_failed()).await;
    assert_eq!(
        state,
        SessionState::Failed("connection closed by upstream".to_string())
    );

    let snapshot = monitor.snapshot();
    assert_eq!(snapshot.totals.total_transactions, 5);
    assert_eq!(snapshot.totals.whale_count, 1);
    assert_eq!(snapshot.totals.total_volume_drops, 12_525_000_000);
    assert_eq!(snapshot.totals.active_accounts, 5);
    assert_eq!(snapshot.current_ledger, 91_000_002);

    let telemetry = monitor.telemetry().snapshot();
    assert_eq!(telemetry.decode_errors, 1);
    assert_eq!(telemetry.unvalidated_skipped, 1);
    assert_eq!(telemetry.ledgers_closed, 2);
}

//! Prometheus metrics mirrored from monitor snapshots

use prometheus::{Encoder, Gauge, IntGauge, Opts, Registry, TextEncoder};

use crate::monitor::{SessionState, StoreSnapshot, TelemetrySnapshot};

/// Registry plus the gauges refreshed by the reporter on every tick.
///
/// Owned by the binary and shared with the endpoint; not a global.
pub struct Metrics {
    registry: Registry,

    // Aggregates
    pub transactions_total: IntGauge,
    pub whales_total: IntGauge,
    pub volume_xrp_total: Gauge,
    pub active_accounts: IntGauge,
    pub current_ledger: IntGauge,
    pub transactions_in_window: IntGauge,

    // Pipeline
    pub messages_received: IntGauge,
    pub decode_errors: IntGauge,
    pub handoff_dropped: IntGauge,
    pub transport_failures: IntGauge,

    /// 0 disconnected, 1 connecting, 2 connected, 3 failed
    pub session_state: IntGauge,
}

fn int_gauge(registry: &Registry, name: &str, help: &str) -> prometheus::Result<IntGauge> {
    let gauge = IntGauge::with_opts(Opts::new(name, help).namespace("xrpl_watch"))?;
    registry.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

impl Metrics {
    /// Create new metrics instance
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let volume_xrp_total = Gauge::with_opts(
            Opts::new("volume_xrp_total", "Cumulative native payment volume in XRP")
                .namespace("xrpl_watch"),
        )?;
        registry.register(Box::new(volume_xrp_total.clone()))?;

        Ok(Self {
            transactions_total: int_gauge(
                &registry,
                "transactions_total",
                "Validated transactions applied since start or reset",
            )?,
            whales_total: int_gauge(&registry, "whales_total", "Transactions classified as whales")?,
            volume_xrp_total,
            active_accounts: int_gauge(&registry, "active_accounts", "Distinct accounts seen")?,
            current_ledger: int_gauge(&registry, "current_ledger", "Latest closed ledger index")?,
            transactions_in_window: int_gauge(
                &registry,
                "transactions_in_window",
                "Buffered transactions observed within the rate window",
            )?,
            messages_received: int_gauge(&registry, "messages_received", "Raw upstream frames")?,
            decode_errors: int_gauge(&registry, "decode_errors", "Frames that failed decoding")?,
            handoff_dropped: int_gauge(
                &registry,
                "handoff_dropped",
                "Records lost on handoff overflow",
            )?,
            transport_failures: int_gauge(
                &registry,
                "transport_failures",
                "Sessions ended by a transport error",
            )?,
            session_state: int_gauge(&registry, "session_state", "Subscription session state")?,
            registry,
        })
    }

    /// Get the registry for exporting
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Refresh every gauge from one reporter tick
    pub fn observe(
        &self,
        snapshot: &StoreSnapshot,
        rate: usize,
        telemetry: &TelemetrySnapshot,
        state: &SessionState,
    ) {
        let totals = &snapshot.totals;
        self.transactions_total.set(saturating_i64(totals.total_transactions));
        self.whales_total.set(saturating_i64(totals.whale_count));
        self.volume_xrp_total.set(totals.total_volume());
        self.active_accounts.set(saturating_i64(totals.active_accounts as u64));
        self.current_ledger.set(saturating_i64(snapshot.current_ledger));
        self.transactions_in_window.set(saturating_i64(rate as u64));

        self.messages_received.set(saturating_i64(telemetry.messages_received));
        self.decode_errors.set(saturating_i64(telemetry.decode_errors));
        self.handoff_dropped.set(saturating_i64(telemetry.handoff_dropped));
        self.transport_failures.set(saturating_i64(telemetry.transport_failures));

        self.session_state.set(state.code());
    }

    /// Prometheus text exposition of the registry
    pub fn render(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

fn saturating_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

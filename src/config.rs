//! Configuration for the xrpl-watch binary
//!
//! Loaded from a TOML file (every section and field optional), then
//! overridden from the environment (`.env` honoured).

use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::monitor::session::DEFAULT_CONNECT_TIMEOUT;
use crate::monitor::MonitorConfig;
use crate::streaming::websocket_stream::DEFAULT_WS_URL;

/// Upper bound for the volume chart span
pub const MAX_VOLUME_MINUTES: usize = 60;

/// Main application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Upstream WebSocket stream
    pub stream: StreamConfig,

    /// Ingestion, classification and buffering
    pub monitor: MonitorConfig,

    /// HTTP lookups (account info, price)
    pub lookup: LookupConfig,

    /// Terminal presentation
    pub display: DisplayConfig,

    /// Monitoring and metrics
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// WebSocket endpoint
    #[serde(default = "default_ws_url")]
    pub url: String,

    /// Connect timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupConfig {
    /// JSON-RPC endpoint for account_info
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,

    /// Price endpoint returning `{"ripple":{"usd":..}}`
    #[serde(default = "default_price_url")]
    pub price_url: String,

    /// Request timeout in seconds
    #[serde(default = "default_lookup_timeout")]
    pub timeout_secs: u64,

    /// Fetch the price once at `watch` startup
    #[serde(default = "default_true")]
    pub fetch_price: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Presentation cadence in seconds (1 - 10)
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,

    /// Rows in the live feed
    #[serde(default = "default_feed_rows")]
    pub feed_rows: usize,

    /// Rows in the whale table
    #[serde(default = "default_whale_rows")]
    pub whale_rows: usize,

    /// Show only whales in the live feed
    #[serde(default)]
    pub whales_only: bool,

    /// Minutes covered by the volume chart (1 - 60)
    #[serde(default = "default_volume_minutes")]
    pub volume_minutes: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringConfig {
    /// Serve Prometheus metrics
    #[serde(default)]
    pub enable_metrics: bool,

    /// Metrics port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

// Default value functions
fn default_ws_url() -> String { DEFAULT_WS_URL.to_string() }
fn default_connect_timeout() -> u64 { DEFAULT_CONNECT_TIMEOUT.as_secs() }
fn default_rpc_url() -> String { "https://s1.ripple.com:51234/".to_string() }
fn default_price_url() -> String {
    "https://api.coingecko.com/api/v3/simple/price?ids=ripple&vs_currencies=usd".to_string()
}
fn default_lookup_timeout() -> u64 { 10 }
fn default_refresh_interval() -> u64 { 3 }
fn default_feed_rows() -> usize { 20 }
fn default_whale_rows() -> usize { 10 }
fn default_volume_minutes() -> usize { 10 }
fn default_metrics_port() -> u16 { 9090 }
fn default_true() -> bool { true }

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            url: default_ws_url(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            price_url: default_price_url(),
            timeout_secs: default_lookup_timeout(),
            fetch_price: default_true(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_refresh_interval(),
            feed_rows: default_feed_rows(),
            whale_rows: default_whale_rows(),
            whales_only: false,
            volume_minutes: default_volume_minutes(),
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enable_metrics: false,
            metrics_port: default_metrics_port(),
        }
    }
}

impl StreamConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl LookupConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl DisplayConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config {}", path.display()))?;
        Ok(config)
    }

    /// Load file (or defaults when it does not exist), apply `.env` and
    /// environment overrides, then validate
    pub fn from_file_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        dotenvy::dotenv().ok();

        let path = path.as_ref();
        let mut config = if path.exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!(path = %path.display(), "Config file not found, using defaults");
            Self::default()
        };

        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Environment variables override file values
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("XRPL_WS_URL") {
            self.stream.url = url;
        }

        if let Ok(url) = std::env::var("XRPL_RPC_URL") {
            self.lookup.rpc_url = url;
        }

        if let Ok(interval) = std::env::var("XRPL_REFRESH_INTERVAL_SECS") {
            self.display.refresh_interval_secs = interval
                .trim()
                .parse()
                .map_err(|e| anyhow!("Invalid XRPL_REFRESH_INTERVAL_SECS: {}", e))?;
        }

        if let Ok(port) = std::env::var("XRPL_METRICS_PORT") {
            self.monitoring.metrics_port = port
                .trim()
                .parse()
                .map_err(|e| anyhow!("Invalid XRPL_METRICS_PORT: {}", e))?;
            self.monitoring.enable_metrics = true;
        }

        self.monitor.from_env()?;
        Ok(())
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if !(self.stream.url.starts_with("ws://") || self.stream.url.starts_with("wss://")) {
            return Err(anyhow!("stream.url must be a ws:// or wss:// URL"));
        }
        if self.stream.connect_timeout_secs == 0 {
            return Err(anyhow!("stream.connect_timeout_secs must be > 0"));
        }
        if self.lookup.timeout_secs == 0 {
            return Err(anyhow!("lookup.timeout_secs must be > 0"));
        }
        if !(1..=10).contains(&self.display.refresh_interval_secs) {
            return Err(anyhow!("display.refresh_interval_secs must be in range [1, 10]"));
        }
        if !(1..=MAX_VOLUME_MINUTES).contains(&self.display.volume_minutes) {
            return Err(anyhow!(
                "display.volume_minutes must be in range [1, {}]",
                MAX_VOLUME_MINUTES
            ));
        }
        self.monitor.validate()
    }
}

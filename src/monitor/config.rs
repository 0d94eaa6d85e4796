//! Monitor settings with TOML and environment variable support

use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use super::classifier::{validate_threshold, DEFAULT_WHALE_THRESHOLD};
use super::handoff::DropPolicy;
use super::store::{DEFAULT_RECENT_CAPACITY, DEFAULT_WHALE_CAPACITY};

/// Ingestion-side settings: classification, buffer sizes, handoff
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Whale threshold in whole XRP (1,000 - 100,000)
    pub whale_threshold: u64,

    /// Capacity of the recent-transactions buffer
    pub recent_capacity: usize,

    /// Capacity of the whale buffer
    pub whale_capacity: usize,

    /// Capacity of the handoff channel to the display; defaults to the
    /// recent-buffer size
    pub handoff_capacity: usize,

    /// What the handoff drops when the display falls behind
    pub drop_policy: DropPolicy,

    /// Window for the transactions-per-window rate
    pub rate_window_secs: u64,

    /// Clear aggregates at every `start()` instead of keeping them
    pub reset_on_start: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            whale_threshold: DEFAULT_WHALE_THRESHOLD,
            recent_capacity: DEFAULT_RECENT_CAPACITY,
            whale_capacity: DEFAULT_WHALE_CAPACITY,
            handoff_capacity: DEFAULT_RECENT_CAPACITY,
            drop_policy: DropPolicy::DropOldest,
            rate_window_secs: 60,
            reset_on_start: false,
        }
    }
}

impl MonitorConfig {
    /// Apply `XRPL_WHALE_THRESHOLD` if set
    pub fn from_env(&mut self) -> Result<()> {
        if let Ok(threshold) = std::env::var("XRPL_WHALE_THRESHOLD") {
            self.whale_threshold = threshold
                .trim()
                .parse()
                .map_err(|e| anyhow!("Invalid XRPL_WHALE_THRESHOLD: {}", e))?;
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<()> {
        validate_threshold(self.whale_threshold)?;
        if self.recent_capacity == 0 {
            return Err(anyhow!("recent_capacity must be > 0"));
        }
        if self.whale_capacity == 0 {
            return Err(anyhow!("whale_capacity must be > 0"));
        }
        if self.handoff_capacity == 0 {
            return Err(anyhow!("handoff_capacity must be > 0"));
        }
        if self.rate_window_secs == 0 {
            return Err(anyhow!("rate_window_secs must be > 0"));
        }
        Ok(())
    }

    pub fn rate_window(&self) -> Duration {
        Duration::from_secs(self.rate_window_secs)
    }
}

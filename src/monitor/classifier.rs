//! Whale classification against an operator-settable threshold

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::errors::MonitorError;
use super::parser::ParsedTransaction;
use super::record::{TransactionRecord, DROPS_PER_XRP};

/// Default whale threshold in XRP
pub const DEFAULT_WHALE_THRESHOLD: u64 = 10_000;
/// Lowest threshold an operator may set, in XRP
pub const MIN_WHALE_THRESHOLD: u64 = 1_000;
/// Highest threshold an operator may set, in XRP
pub const MAX_WHALE_THRESHOLD: u64 = 100_000;

/// Validate a threshold against the operator range
pub fn validate_threshold(xrp: u64) -> Result<(), MonitorError> {
    if (MIN_WHALE_THRESHOLD..=MAX_WHALE_THRESHOLD).contains(&xrp) {
        Ok(())
    } else {
        Err(MonitorError::ThresholdOutOfRange {
            value: xrp,
            min: MIN_WHALE_THRESHOLD,
            max: MAX_WHALE_THRESHOLD,
        })
    }
}

/// Runtime-mutable whale threshold, in whole XRP.
///
/// Written by the operator, read by the session on every classification.
#[derive(Debug)]
pub struct WhaleThreshold {
    xrp: AtomicU64,
}

impl WhaleThreshold {
    pub fn new(xrp: u64) -> Result<Self, MonitorError> {
        validate_threshold(xrp)?;
        Ok(Self {
            xrp: AtomicU64::new(xrp),
        })
    }

    /// Current threshold in XRP
    #[inline]
    pub fn get(&self) -> u64 {
        self.xrp.load(Ordering::Acquire)
    }

    /// Change the threshold. Already classified records keep their flag.
    pub fn set(&self, xrp: u64) -> Result<(), MonitorError> {
        validate_threshold(xrp)?;
        let previous = self.xrp.swap(xrp, Ordering::AcqRel);
        tracing::info!(previous, current = xrp, "Whale threshold updated");
        Ok(())
    }

    /// Current threshold in drops
    #[inline]
    pub fn drops(&self) -> u64 {
        self.get().saturating_mul(DROPS_PER_XRP)
    }
}

impl Default for WhaleThreshold {
    fn default() -> Self {
        Self {
            xrp: AtomicU64::new(DEFAULT_WHALE_THRESHOLD),
        }
    }
}

/// Whale rule. Zero amounts are never whales regardless of threshold.
#[inline(always)]
pub fn is_whale(amount_drops: u64, threshold_drops: u64) -> bool {
    amount_drops > 0 && amount_drops >= threshold_drops
}

/// Turns parsed transactions into immutable records using the threshold in
/// effect at the moment of classification
#[derive(Debug, Clone)]
pub struct Classifier {
    threshold: Arc<WhaleThreshold>,
}

impl Classifier {
    pub fn new(threshold: Arc<WhaleThreshold>) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> &Arc<WhaleThreshold> {
        &self.threshold
    }

    /// Classify with the current wall-clock time as `observed_at`
    pub fn classify(&self, parsed: ParsedTransaction) -> TransactionRecord {
        self.classify_at(parsed, Utc::now())
    }

    pub fn classify_at(
        &self,
        parsed: ParsedTransaction,
        observed_at: DateTime<Utc>,
    ) -> TransactionRecord {
        let is_whale = is_whale(parsed.amount_drops, self.threshold.drops());

        TransactionRecord {
            observed_at,
            tx_type: parsed.tx_type,
            source_account: parsed.source_account,
            destination_account: parsed.destination_account,
            amount_drops: parsed.amount_drops,
            result: parsed.result,
            is_whale,
            ledger_index: parsed.ledger_index,
        }
    }
}

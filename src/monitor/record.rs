//! Classified transaction record shared between the store and the handoff

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Drops per native XRP unit
pub const DROPS_PER_XRP: u64 = 1_000_000;

/// Convert an integer drop count into native units
#[inline]
pub fn drops_to_xrp(drops: u64) -> f64 {
    drops as f64 / DROPS_PER_XRP as f64
}

/// One validated ledger transaction after parsing and classification.
///
/// Records are immutable once built and are passed around as
/// `Arc<TransactionRecord>` so the ring buffers, snapshots and the handoff
/// channel share a single allocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionRecord {
    /// Local processing time (not the ledger close time)
    pub observed_at: DateTime<Utc>,
    /// `TransactionType` label, "Unknown" when absent
    pub tx_type: String,
    /// Sending account, empty when absent
    pub source_account: String,
    /// Receiving account, empty when absent
    pub destination_account: String,
    /// Transferred native amount in drops, 0 when not valued
    pub amount_drops: u64,
    /// `TransactionResult` code, "Unknown" when absent
    pub result: String,
    /// Whale flag fixed at classification time
    pub is_whale: bool,
    /// Containing ledger sequence, 0 when absent
    pub ledger_index: u64,
}

impl TransactionRecord {
    /// Amount in native units
    #[inline]
    pub fn amount(&self) -> f64 {
        drops_to_xrp(self.amount_drops)
    }

    /// Non-empty participant accounts of this record
    pub fn accounts(&self) -> impl Iterator<Item = &str> {
        [self.source_account.as_str(), self.destination_account.as_str()]
            .into_iter()
            .filter(|account| !account.is_empty())
    }
}

//! Aggregate store: running totals plus bounded recent-activity buffers
//!
//! All mutable aggregate state lives behind one `parking_lot::Mutex`, so a
//! reader never sees half of an `apply`. Both `apply` and `snapshot` keep the
//! critical section short: `apply` does O(1) work plus one set insert per
//! account, `snapshot` copies `Arc` handles out of the ring buffers and never
//! clones the account set.
//!
//! Cumulative totals are never derived from the ring buffers; eviction only
//! bounds the "recent" views.
//!
//! `active_accounts` is unbounded for the lifetime of the store. Long-running
//! sessions grow it monotonically; `reset()` is the only way to release it.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use super::errors::MonitorError;
use super::record::{TransactionRecord, DROPS_PER_XRP};

/// Default capacity of the all-transactions buffer
pub const DEFAULT_RECENT_CAPACITY: usize = 100;
/// Default capacity of the whale buffer
pub const DEFAULT_WHALE_CAPACITY: usize = 50;

/// Fixed-capacity FIFO that evicts the oldest entry on overflow
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Push a new entry, returning the evicted one if the buffer was full
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.items.len() >= self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest to newest
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> {
        self.items.iter()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl<T: Clone> RingBuffer<T> {
    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}

/// Cumulative metrics, replayable from the full sequence of applied records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AggregateTotals {
    pub total_transactions: u64,
    pub whale_count: u64,
    /// Exact volume in drops
    pub total_volume_drops: u128,
    /// Number of distinct accounts seen
    pub active_accounts: usize,
}

impl AggregateTotals {
    /// Total volume in XRP
    pub fn total_volume(&self) -> f64 {
        self.total_volume_drops as f64 / DROPS_PER_XRP as f64
    }
}

#[derive(Debug)]
struct StoreInner {
    total_transactions: u64,
    whale_count: u64,
    total_volume_drops: u128,
    active_accounts: HashSet<String>,
    recent: RingBuffer<Arc<TransactionRecord>>,
    whales: RingBuffer<Arc<TransactionRecord>>,
}

impl StoreInner {
    fn totals(&self) -> AggregateTotals {
        AggregateTotals {
            total_transactions: self.total_transactions,
            whale_count: self.whale_count,
            total_volume_drops: self.total_volume_drops,
            active_accounts: self.active_accounts.len(),
        }
    }
}

/// Owner of all aggregate state. Shared as `Arc<AggregateStore>` between the
/// session task (writer) and the presentation side (readers).
#[derive(Debug)]
pub struct AggregateStore {
    inner: Mutex<StoreInner>,
    current_ledger: AtomicU64,
}

impl AggregateStore {
    pub fn new(recent_capacity: usize, whale_capacity: usize) -> Result<Self, MonitorError> {
        if recent_capacity == 0 {
            return Err(MonitorError::ZeroCapacity { name: "recent" });
        }
        if whale_capacity == 0 {
            return Err(MonitorError::ZeroCapacity { name: "whale" });
        }

        Ok(Self {
            inner: Mutex::new(StoreInner {
                total_transactions: 0,
                whale_count: 0,
                total_volume_drops: 0,
                active_accounts: HashSet::new(),
                recent: RingBuffer::new(recent_capacity),
                whales: RingBuffer::new(whale_capacity),
            }),
            current_ledger: AtomicU64::new(0),
        })
    }

    /// Apply one classified record as a single atomic unit
    pub fn apply(&self, record: Arc<TransactionRecord>) {
        let mut inner = self.inner.lock();

        inner.total_transactions += 1;
        if record.is_whale {
            inner.whale_count += 1;
        }
        if record.amount_drops > 0 {
            inner.total_volume_drops += u128::from(record.amount_drops);
        }
        for account in record.accounts() {
            if !inner.active_accounts.contains(account) {
                inner.active_accounts.insert(account.to_owned());
            }
        }

        if record.is_whale {
            inner.whales.push(Arc::clone(&record));
        }
        inner.recent.push(record);
    }

    /// Consistent read-only view for display
    pub fn snapshot(&self) -> StoreSnapshot {
        let (totals, recent, whales) = {
            let inner = self.inner.lock();
            (inner.totals(), inner.recent.to_vec(), inner.whales.to_vec())
        };

        StoreSnapshot {
            totals,
            recent,
            whales,
            current_ledger: self.current_ledger(),
            taken_at: Utc::now(),
        }
    }

    /// Cumulative totals only, without copying the buffers
    pub fn totals(&self) -> AggregateTotals {
        self.inner.lock().totals()
    }

    /// Number of buffered records observed within `window` of now
    pub fn recent_rate(&self, window: Duration) -> usize {
        self.recent_rate_at(Utc::now(), window)
    }

    pub fn recent_rate_at(&self, now: DateTime<Utc>, window: Duration) -> usize {
        let inner = self.inner.lock();
        count_within(inner.recent.iter(), now, window)
    }

    pub fn set_current_ledger(&self, ledger_index: u64) {
        self.current_ledger.store(ledger_index, Ordering::Release);
    }

    pub fn current_ledger(&self) -> u64 {
        self.current_ledger.load(Ordering::Acquire)
    }

    /// Drop every metric, buffered record and the ledger index
    pub fn reset(&self) {
        {
            let mut inner = self.inner.lock();
            inner.total_transactions = 0;
            inner.whale_count = 0;
            inner.total_volume_drops = 0;
            inner.active_accounts = HashSet::new();
            inner.recent.clear();
            inner.whales.clear();
        }
        self.current_ledger.store(0, Ordering::Release);
        tracing::info!("Aggregate store reset");
    }
}

impl Default for AggregateStore {
    fn default() -> Self {
        Self {
            inner: Mutex::new(StoreInner {
                total_transactions: 0,
                whale_count: 0,
                total_volume_drops: 0,
                active_accounts: HashSet::new(),
                recent: RingBuffer::new(DEFAULT_RECENT_CAPACITY),
                whales: RingBuffer::new(DEFAULT_WHALE_CAPACITY),
            }),
            current_ledger: AtomicU64::new(0),
        }
    }
}

fn window_start(now: DateTime<Utc>, window: Duration) -> Option<DateTime<Utc>> {
    TimeDelta::from_std(window)
        .ok()
        .and_then(|delta| now.checked_sub_signed(delta))
}

fn count_within<'a>(
    records: impl Iterator<Item = &'a Arc<TransactionRecord>>,
    now: DateTime<Utc>,
    window: Duration,
) -> usize {
    let start = window_start(now, window);
    records
        .filter(|r| r.observed_at <= now && start.map_or(true, |s| r.observed_at >= s))
        .count()
}

/// Per-interval native volume for the recent-activity chart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VolumeBucket {
    /// Inclusive end of the interval
    pub end: DateTime<Utc>,
    pub volume_drops: u128,
}

impl VolumeBucket {
    pub fn volume(&self) -> f64 {
        self.volume_drops as f64 / DROPS_PER_XRP as f64
    }
}

/// Point-in-time copy of the store
#[derive(Debug, Clone, Serialize)]
pub struct StoreSnapshot {
    pub totals: AggregateTotals,
    /// Oldest to newest
    pub recent: Vec<Arc<TransactionRecord>>,
    /// Oldest to newest
    pub whales: Vec<Arc<TransactionRecord>>,
    pub current_ledger: u64,
    pub taken_at: DateTime<Utc>,
}

impl StoreSnapshot {
    /// Newest-first feed, optionally restricted to whales
    pub fn feed(&self, limit: usize, whales_only: bool) -> Vec<Arc<TransactionRecord>> {
        self.recent
            .iter()
            .rev()
            .filter(|r| !whales_only || r.is_whale)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Newest-first whale records
    pub fn recent_whales(&self, limit: usize) -> Vec<Arc<TransactionRecord>> {
        self.whales.iter().rev().take(limit).cloned().collect()
    }

    pub fn recent_rate(&self, now: DateTime<Utc>, window: Duration) -> usize {
        count_within(self.recent.iter(), now, window)
    }

    /// Volume of the buffered records in consecutive one-minute slots ending
    /// at `now`, oldest slot first. Each slot is `(end - 1min, end]`.
    pub fn volume_by_minute(&self, now: DateTime<Utc>, minutes: usize) -> Vec<VolumeBucket> {
        let minute = TimeDelta::minutes(1);
        let mut buckets: Vec<VolumeBucket> = (0..minutes)
            .map_while(|i| {
                let end = now.checked_sub_signed(minute.checked_mul(i32::try_from(i).ok()?)?)?;
                let start = end.checked_sub_signed(minute)?;
                let volume_drops = self
                    .recent
                    .iter()
                    .filter(|r| r.observed_at > start && r.observed_at <= end)
                    .map(|r| u128::from(r.amount_drops))
                    .sum();
                Some(VolumeBucket { end, volume_drops })
            })
            .collect();
        buckets.reverse();
        buckets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(drops: u64, is_whale: bool, source: &str, dest: &str) -> Arc<TransactionRecord> {
        record_at(drops, is_whale, source, dest, Utc::now())
    }

    fn record_at(
        drops: u64,
        is_whale: bool,
        source: &str,
        dest: &str,
        observed_at: DateTime<Utc>,
    ) -> Arc<TransactionRecord> {
        Arc::new(TransactionRecord {
            observed_at,
            tx_type: "Payment".to_string(),
            source_account: source.to_string(),
            destination_account: dest.to_string(),
            amount_drops: drops,
            result: "tesSUCCESS".to_string(),
            is_whale,
            ledger_index: 1,
        })
    }

    #[test]
    fn test_ring_buffer_fifo_eviction() {
        let mut ring = RingBuffer::new(3);
        assert_eq!(ring.push(1), None);
        assert_eq!(ring.push(2), None);
        assert_eq!(ring.push(3), None);
        assert_eq!(ring.push(4), Some(1));
        assert_eq!(ring.push(5), Some(2));
        assert_eq!(ring.to_vec(), vec![3, 4, 5]);
        assert_eq!(ring.len(), ring.capacity());
    }

    #[test]
    fn test_apply_updates_all_totals() {
        let store = AggregateStore::default();
        store.apply(record(12_000_000_000, true, "rA", "rB"));
        store.apply(record(1_500_000, false, "rA", "rC"));

        let totals = store.totals();
        assert_eq!(totals.total_transactions, 2);
        assert_eq!(totals.whale_count, 1);
        assert_eq!(totals.total_volume_drops, 12_001_500_000);
        assert_eq!(totals.active_accounts, 3);
        assert_eq!(totals.total_volume(), 12_001.5);
    }

    #[test]
    fn test_zero_amount_only_counts_transaction() {
        let store = AggregateStore::default();
        store.apply(record(0, false, "", ""));

        let totals = store.totals();
        assert_eq!(totals.total_transactions, 1);
        assert_eq!(totals.whale_count, 0);
        assert_eq!(totals.total_volume_drops, 0);
        assert_eq!(totals.active_accounts, 0);
    }

    #[test]
    fn test_buffers_bounded_but_totals_cumulative() {
        let store = AggregateStore::new(5, 2).unwrap();
        for i in 0..20u64 {
            store.apply(record(i + 1, i % 2 == 0, &format!("r{i}"), ""));
        }

        let snapshot = store.snapshot();
        assert_eq!(snapshot.recent.len(), 5);
        assert_eq!(snapshot.whales.len(), 2);
        assert_eq!(snapshot.totals.total_transactions, 20);
        assert_eq!(snapshot.totals.whale_count, 10);
        assert_eq!(snapshot.totals.active_accounts, 20);

        let amounts: Vec<u64> = snapshot.recent.iter().map(|r| r.amount_drops).collect();
        assert_eq!(amounts, vec![16, 17, 18, 19, 20]);
        let whale_amounts: Vec<u64> = snapshot.whales.iter().map(|r| r.amount_drops).collect();
        assert_eq!(whale_amounts, vec![17, 19]);
    }

    #[test]
    fn test_recent_rate_window() {
        let store = AggregateStore::default();
        let now = Utc::now();
        store.apply(record_at(1, false, "rA", "", now - TimeDelta::seconds(120)));
        store.apply(record_at(1, false, "rA", "", now - TimeDelta::seconds(30)));
        store.apply(record_at(1, false, "rA", "", now - TimeDelta::seconds(5)));
        store.apply(record_at(1, false, "rA", "", now + TimeDelta::seconds(5)));

        assert_eq!(store.recent_rate_at(now, Duration::from_secs(60)), 2);
        assert_eq!(store.recent_rate_at(now, Duration::from_secs(600)), 3);
        assert_eq!(store.recent_rate_at(now, Duration::MAX), 3);
    }

    #[test]
    fn test_snapshot_feed_and_whales() {
        let store = AggregateStore::default();
        store.apply(record(1, false, "rA", ""));
        store.apply(record(20_000_000_000, true, "rB", ""));
        store.apply(record(2, false, "rC", ""));

        let snapshot = store.snapshot();
        let feed = snapshot.feed(2, false);
        assert_eq!(feed.len(), 2);
        assert_eq!(feed[0].source_account, "rC");
        assert_eq!(feed[1].source_account, "rB");

        let whales_only = snapshot.feed(10, true);
        assert_eq!(whales_only.len(), 1);
        assert_eq!(whales_only[0].source_account, "rB");
        assert_eq!(snapshot.recent_whales(10).len(), 1);
    }

    #[test]
    fn test_volume_by_minute() {
        let store = AggregateStore::default();
        let now = Utc::now();
        store.apply(record_at(1_000_000, false, "rA", "", now - TimeDelta::seconds(10)));
        store.apply(record_at(2_000_000, false, "rA", "", now - TimeDelta::seconds(20)));
        store.apply(record_at(5_000_000, false, "rA", "", now - TimeDelta::seconds(90)));

        let buckets = store.snapshot().volume_by_minute(now, 3);
        assert_eq!(buckets.len(), 3);
        assert_eq!(buckets[2].volume_drops, 3_000_000);
        assert_eq!(buckets[1].volume_drops, 5_000_000);
        assert_eq!(buckets[0].volume_drops, 0);
        assert_eq!(buckets[2].end, now);
    }

    #[test]
    fn test_volume_by_minute_sums_past_u64() {
        let store = AggregateStore::default();
        let now = Utc::now();
        let half = u64::MAX / 2 + 1;
        store.apply(record_at(half, true, "rA", "rB", now - TimeDelta::seconds(5)));
        store.apply(record_at(half, true, "rC", "rD", now - TimeDelta::seconds(15)));

        let snapshot = store.snapshot();
        assert_eq!(snapshot.totals.total_volume_drops, u128::from(u64::MAX) + 1);

        let buckets = snapshot.volume_by_minute(now, 3);
        assert_eq!(buckets[2].volume_drops, u128::from(u64::MAX) + 1);
        assert_eq!(buckets[1].volume_drops, 0);
    }

    #[test]
    fn test_reset_clears_everything() {
        let store = AggregateStore::default();
        store.apply(record(5, true, "rA", "rB"));
        store.set_current_ledger(99);

        store.reset();

        let snapshot = store.snapshot();
        assert_eq!(snapshot.totals, AggregateTotals::default());
        assert!(snapshot.recent.is_empty());
        assert!(snapshot.whales.is_empty());
        assert_eq!(snapshot.current_ledger, 0);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(AggregateStore::new(0, 10).is_err());
        assert!(AggregateStore::new(10, 0).is_err());
    }
}

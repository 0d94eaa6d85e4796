//! XRPL Watch - real-time XRP Ledger transaction monitor
//!
//! Subscribes to a rippled WebSocket feed, parses validated transactions,
//! flags whale payments and keeps bounded recent-activity aggregates for a
//! terminal dashboard.

pub mod config;
pub mod dashboard;
pub mod endpoints;
pub mod lookup;
pub mod metrics;
pub mod monitor;
pub mod streaming;

pub use config::Config;
pub use monitor::{LedgerMonitor, SessionState, StoreSnapshot, TransactionRecord};

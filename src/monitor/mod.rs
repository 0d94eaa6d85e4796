//! Real-time ledger monitor
//!
//! Pipeline: upstream frame -> [`parser`] -> [`classifier`] -> [`store`]
//! (+ [`handoff`] to the display), driven by the [`session`] task and owned
//! by [`LedgerMonitor`].

pub mod classifier;
pub mod config;
pub mod errors;
pub mod handoff;
pub mod integration;
pub mod parser;
pub mod record;
pub mod session;
pub mod store;
pub mod telemetry;

pub use classifier::{Classifier, WhaleThreshold};
pub use config::MonitorConfig;
pub use errors::{DecodeError, MonitorError, TransportError};
pub use handoff::{DropPolicy, HandoffReceiver, HandoffResult, HandoffSender};
pub use integration::LedgerMonitor;
pub use parser::{decode_message, parse_transaction, InboundMessage, ParsedTransaction};
pub use record::TransactionRecord;
pub use session::{RecordPipeline, SessionState, SubscriptionSession};
pub use store::{AggregateStore, AggregateTotals, StoreSnapshot, VolumeBucket};
pub use telemetry::{MonitorTelemetry, TelemetrySnapshot};

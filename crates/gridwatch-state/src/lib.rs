//! gridwatch-state — durable watchdog state.
//!
//! A redb-backed store holding the three watchdog maps: registered health
//! checks (lexicographic string keys), the execution schedule (numeric
//! ascending keys), and metric subscriptions. Access is gated on the
//! replica role so engines running on a demoted replica become no-ops.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StoreError, StoreResult};
pub use store::{AccessStatus, ReplicaRole, Snapshot, Tx, WatchdogStore};
pub use types::{HealthCheck, MetricCheck, ScheduledItem};

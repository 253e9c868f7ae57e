//! gridwatch-cleanup — the diagnostic-cleanup engine.
//!
//! Ages out old rows from three fixed diagnostic tables on an external
//! table store: query by timestamp, delete in per-partition-key batches
//! with throttle pauses, stop at the per-tick deletion budget.

pub mod engine;
pub mod tables;

pub use engine::{CleanupEngine, DIAGNOSTIC_TABLES};
pub use tables::{BatchOptions, MockTableStore, TableError, TableResult, TableRow, TableStore};

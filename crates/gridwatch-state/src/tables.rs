//! redb table definitions for the watchdog store.
//!
//! String-keyed tables iterate lexicographically, the schedule table
//! iterates in ascending tick order. Values are JSON-serialized domain
//! types; unknown fields are tolerated on read.

use redb::TableDefinition;

/// Registered health checks keyed by `{service absolute path}/{partition}`.
pub const HEALTH_CHECKS: TableDefinition<&str, &[u8]> = TableDefinition::new("health_checks");

/// Pending executions keyed by wall-clock ticks (100-ns units).
pub const SCHEDULE: TableDefinition<u64, &[u8]> = TableDefinition::new("schedule");

/// Metric subscriptions keyed by `{app}[/{svc}[/{partition}]]`.
pub const METRIC_CHECKS: TableDefinition<&str, &[u8]> = TableDefinition::new("metric_checks");

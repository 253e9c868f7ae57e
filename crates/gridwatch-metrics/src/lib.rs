//! gridwatch-metrics — the metrics engine.
//!
//! For every registered subscription, pulls load data from the platform
//! (per partition, per replica, or per application depending on the
//! subscription shape) and fans the observations out to the telemetry
//! sink. Paged platform enumerations carry independent bounded retry
//! budgets and give up silently when exhausted.

pub mod engine;
pub mod error;

pub use engine::MetricsEngine;
pub use error::{MetricsError, MetricsResult};

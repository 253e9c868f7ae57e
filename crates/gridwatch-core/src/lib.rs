//! gridwatch-core — shared vocabulary for the GridWatch watchdog.
//!
//! Health states with monotone worsening, the 100-ns wall-clock tick type
//! used by the durable schedule, the telemetry sink abstraction, and the
//! watchdog configuration section.

pub mod config;
pub mod health;
pub mod telemetry;
pub mod time;

pub use config::{parse_duration, ConfigSections, WatchdogSettings};
pub use health::{is_success_code, HealthState, HealthStateCell};
pub use telemetry::{LogSink, NullSink, RecordingSink, TelemetrySink};
pub use time::Ticks;

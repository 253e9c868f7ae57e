//! Watchdog configuration.
//!
//! Configuration is hierarchical: sections map parameter names to string
//! values. The `Watchdog` section carries every tunable; missing or
//! malformed parameters fall back to their defaults so a partial file is
//! always usable.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Raw configuration: section → parameter → value.
pub type ConfigSections = HashMap<String, HashMap<String, String>>;

/// Parsed settings of the `Watchdog` section.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchdogSettings {
    /// Health-check tick interval.
    pub health_check_interval: Duration,
    /// Metric-harvest tick interval.
    pub metric_interval: Duration,
    /// Diagnostic-cleanup tick interval.
    pub diagnostic_interval: Duration,
    /// Age beyond which diagnostic rows are deleted.
    pub diagnostic_time_to_keep: Duration,
    /// Deletion budget per cleanup tick.
    pub diagnostic_target_count: u32,
    /// Table-store endpoint. Cleanup is a no-op without it.
    pub diagnostic_endpoint: Option<String>,
    /// Table-store SAS token. Cleanup is a no-op without it.
    pub diagnostic_sas_token: Option<String>,
    /// Self-report interval.
    pub report_interval: Duration,
    /// Telemetry instrumentation key.
    pub telemetry_key: Option<String>,
}

impl Default for WatchdogSettings {
    fn default() -> Self {
        Self {
            health_check_interval: Duration::from_secs(5 * 60),
            metric_interval: Duration::from_secs(5 * 60),
            diagnostic_interval: Duration::from_secs(2 * 60),
            diagnostic_time_to_keep: Duration::from_secs(10 * 24 * 60 * 60),
            diagnostic_target_count: 8000,
            diagnostic_endpoint: None,
            diagnostic_sas_token: None,
            report_interval: Duration::from_secs(60),
            telemetry_key: None,
        }
    }
}

impl WatchdogSettings {
    /// The configuration section holding the watchdog parameters.
    pub const SECTION: &'static str = "Watchdog";

    /// Parse the `Watchdog` section out of raw sections, falling back to
    /// defaults for anything missing or unparseable.
    pub fn from_sections(sections: &ConfigSections) -> Self {
        let defaults = Self::default();
        let Some(section) = sections.get(Self::SECTION) else {
            return defaults;
        };

        Self {
            health_check_interval: duration_param(
                section,
                "HealthCheckInterval",
                defaults.health_check_interval,
            ),
            metric_interval: duration_param(section, "MetricInterval", defaults.metric_interval),
            diagnostic_interval: duration_param(
                section,
                "DiagnosticInterval",
                defaults.diagnostic_interval,
            ),
            diagnostic_time_to_keep: duration_param(
                section,
                "DiagnosticTimeToKeep",
                defaults.diagnostic_time_to_keep,
            ),
            diagnostic_target_count: int_param(
                section,
                "DiagnosticTargetCount",
                defaults.diagnostic_target_count,
            ),
            diagnostic_endpoint: string_param(section, "DiagnosticEndpoint"),
            diagnostic_sas_token: string_param(section, "DiagnosticSasToken"),
            report_interval: duration_param(
                section,
                "WatchdogHealthReportInterval",
                defaults.report_interval,
            ),
            telemetry_key: string_param(section, "TelemetryKey"),
        }
    }

    /// Load settings from a toml file of sections.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let sections: ConfigSections = toml::from_str(&content)?;
        Ok(Self::from_sections(&sections))
    }
}

fn duration_param(section: &HashMap<String, String>, name: &str, default: Duration) -> Duration {
    section
        .get(name)
        .and_then(|v| parse_duration(v))
        .unwrap_or(default)
}

fn int_param(section: &HashMap<String, String>, name: &str, default: u32) -> u32 {
    section
        .get(name)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn string_param(section: &HashMap<String, String>, name: &str) -> Option<String> {
    section
        .get(name)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Parse a duration string like "200ms", "30s", "5m", "12h", "10d".
/// A bare number is seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else if let Some(hours) = s.strip_suffix('h') {
        hours
            .parse::<u64>()
            .ok()
            .map(|h| Duration::from_secs(h * 60 * 60))
    } else if let Some(days) = s.strip_suffix('d') {
        days.parse::<u64>()
            .ok()
            .map(|d| Duration::from_secs(d * 24 * 60 * 60))
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

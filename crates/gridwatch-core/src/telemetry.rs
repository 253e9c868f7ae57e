//! Telemetry sink abstraction.
//!
//! Engines publish metrics, availability results, and health events through
//! a sink; the backend is swappable (null when no telemetry key is
//! configured, structured logging otherwise).

use std::sync::Mutex;

use async_trait::async_trait;
use tracing::info;

use crate::health::HealthState;
use crate::time::Ticks;

/// Destination for watchdog telemetry.
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    /// A load-metric observation for a role (service or application) and
    /// instance (partition or replica).
    async fn report_metric(&self, role: &str, instance: &str, name: &str, value: f64);

    /// An availability observation produced by one probe execution.
    #[allow(clippy::too_many_arguments)]
    async fn report_availability(
        &self,
        service: &str,
        instance: &str,
        name: &str,
        captured_at: Ticks,
        duration_ms: i64,
        location: &str,
        success: bool,
    );

    /// A health event for an application/service/instance triple.
    async fn report_health(
        &self,
        application: &str,
        service: &str,
        instance: &str,
        source: &str,
        property: &str,
        state: HealthState,
    );

    /// Replace the instrumentation key. Applied on config reload.
    fn set_key(&self, key: &str);
}

/// Discards everything. Used when no telemetry key is configured.
pub struct NullSink;

#[async_trait]
impl TelemetrySink for NullSink {
    async fn report_metric(&self, _role: &str, _instance: &str, _name: &str, _value: f64) {}

    async fn report_availability(
        &self,
        _service: &str,
        _instance: &str,
        _name: &str,
        _captured_at: Ticks,
        _duration_ms: i64,
        _location: &str,
        _success: bool,
    ) {
    }

    async fn report_health(
        &self,
        _application: &str,
        _service: &str,
        _instance: &str,
        _source: &str,
        _property: &str,
        _state: HealthState,
    ) {
    }

    fn set_key(&self, _key: &str) {}
}

/// Emits telemetry as structured tracing events.
pub struct LogSink {
    key: Mutex<String>,
}

impl LogSink {
    pub fn new(key: &str) -> Self {
        Self {
            key: Mutex::new(key.to_string()),
        }
    }

    fn key(&self) -> String {
        self.key.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl TelemetrySink for LogSink {
    async fn report_metric(&self, role: &str, instance: &str, name: &str, value: f64) {
        info!(key = %self.key(), %role, %instance, %name, value, "telemetry metric");
    }

    async fn report_availability(
        &self,
        service: &str,
        instance: &str,
        name: &str,
        captured_at: Ticks,
        duration_ms: i64,
        location: &str,
        success: bool,
    ) {
        info!(
            key = %self.key(),
            %service,
            %instance,
            %name,
            captured_at = captured_at.0,
            duration_ms,
            %location,
            success,
            "telemetry availability"
        );
    }

    async fn report_health(
        &self,
        application: &str,
        service: &str,
        instance: &str,
        source: &str,
        property: &str,
        state: HealthState,
    ) {
        info!(
            key = %self.key(),
            %application,
            %service,
            %instance,
            %source,
            %property,
            ?state,
            "telemetry health"
        );
    }

    fn set_key(&self, key: &str) {
        *self.key.lock().unwrap_or_else(|e| e.into_inner()) = key.to_string();
    }
}

/// Captures every event in memory. Test backend, exposed the same way the
/// store exposes its in-memory variant.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<TelemetryEvent>>,
}

/// One captured sink call.
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryEvent {
    Metric {
        role: String,
        instance: String,
        name: String,
        value: f64,
    },
    Availability {
        service: String,
        instance: String,
        name: String,
        captured_at: Ticks,
        duration_ms: i64,
        location: String,
        success: bool,
    },
    Health {
        application: String,
        service: String,
        instance: String,
        source: String,
        property: String,
        state: HealthState,
    },
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn metrics(&self) -> Vec<(String, String, f64)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                TelemetryEvent::Metric { instance, name, value, .. } => {
                    Some((instance, name, value))
                }
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: TelemetryEvent) {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).push(event);
    }
}

#[async_trait]
impl TelemetrySink for RecordingSink {
    async fn report_metric(&self, role: &str, instance: &str, name: &str, value: f64) {
        self.push(TelemetryEvent::Metric {
            role: role.to_string(),
            instance: instance.to_string(),
            name: name.to_string(),
            value,
        });
    }

    async fn report_availability(
        &self,
        service: &str,
        instance: &str,
        name: &str,
        captured_at: Ticks,
        duration_ms: i64,
        location: &str,
        success: bool,
    ) {
        self.push(TelemetryEvent::Availability {
            service: service.to_string(),
            instance: instance.to_string(),
            name: name.to_string(),
            captured_at,
            duration_ms,
            location: location.to_string(),
            success,
        });
    }

    async fn report_health(
        &self,
        application: &str,
        service: &str,
        instance: &str,
        source: &str,
        property: &str,
        state: HealthState,
    ) {
        self.push(TelemetryEvent::Health {
            application: application.to_string(),
            service: service.to_string(),
            instance: instance.to_string(),
            source: source.to_string(),
            property: property.to_string(),
            state,
        });
    }

    fn set_key(&self, _key: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recording_sink_captures_events() {
        let sink = RecordingSink::new();
        sink.report_metric("svc", "p1", "rps", 42.0).await;
        sink.report_health("app", "svc", "p1", "watchdog", "probe", HealthState::Warning)
            .await;

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(
            sink.metrics(),
            vec![("p1".to_string(), "rps".to_string(), 42.0)]
        );
    }

    #[tokio::test]
    async fn log_sink_key_is_mutable() {
        let sink = LogSink::new("initial");
        assert_eq!(sink.key(), "initial");
        sink.set_key("rotated");
        assert_eq!(sink.key(), "rotated");
        // Events still emit after rotation.
        sink.report_metric("svc", "p1", "rps", 1.0).await;
    }
}

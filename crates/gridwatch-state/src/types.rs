//! Domain types for the watchdog store.
//!
//! These types are the persisted registrations: HTTP health probes, their
//! pending schedule entries, and metric subscriptions. All types are
//! serializable to/from JSON for storage in redb tables.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use gridwatch_core::Ticks;

use crate::error::{StoreError, StoreResult};

fn default_method() -> String {
    "GET".to_string()
}

fn default_frequency_ms() -> u64 {
    60_000
}

fn default_expected_duration_ms() -> u64 {
    200
}

fn default_maximum_duration_ms() -> u64 {
    5_000
}

/// A registered HTTP health probe, including the result fields written by
/// the engine after each execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthCheck {
    /// Probe name, unique within the target service.
    pub name: String,
    /// Absolute service URI, e.g. `fabric:/App/Svc`.
    pub service_name: String,
    /// Target partition. Absent for services resolved as singletons.
    #[serde(default)]
    pub partition: Option<Uuid>,
    /// Named listener to probe; the first listener when absent.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Path appended to the resolved endpoint address.
    pub suffix_path: String,
    /// HTTP verb.
    #[serde(default = "default_method")]
    pub method: String,
    /// Optional request body. Requires `media_type`.
    #[serde(default)]
    pub content: Option<String>,
    /// Content type for `content`.
    #[serde(default)]
    pub media_type: Option<String>,
    /// Probe frequency in milliseconds.
    #[serde(default = "default_frequency_ms")]
    pub frequency_ms: u64,
    /// Advisory expected response time in milliseconds.
    #[serde(default = "default_expected_duration_ms")]
    pub expected_duration_ms: u64,
    /// Hard request cutoff in milliseconds.
    #[serde(default = "default_maximum_duration_ms")]
    pub maximum_duration_ms: u64,
    /// Extra request headers.
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Status codes classified as Warning.
    #[serde(default)]
    pub warning_status_codes: HashSet<u16>,
    /// Status codes classified as Error.
    #[serde(default)]
    pub error_status_codes: HashSet<u16>,

    // Result fields, written by the engine after each probe.
    /// When the probe last ran. `None` = never.
    #[serde(default)]
    pub last_attempt: Option<Ticks>,
    /// Consecutive non-success count. Reset to 0 by any success.
    #[serde(default)]
    pub failure_count: u32,
    /// HTTP status of the last probe (500 for transport failures).
    #[serde(default)]
    pub result_code: u16,
    /// Last probe duration in milliseconds; -1 for transport failures.
    #[serde(default)]
    pub duration_ms: i64,
}

impl HealthCheck {
    /// The absolute path of the service URI: `fabric:/App/Svc` → `/App/Svc`.
    pub fn service_path(&self) -> &str {
        match self.service_name.split_once(':') {
            Some((_, rest)) => rest,
            None => &self.service_name,
        }
    }

    /// Durable key: `{service absolute path}/{partition}`. An absent
    /// partition contributes an empty segment.
    pub fn key(&self) -> String {
        let partition = self
            .partition
            .map(|p| p.to_string())
            .unwrap_or_default();
        format!("{}/{}", self.service_path(), partition)
    }

    pub fn frequency(&self) -> Duration {
        Duration::from_millis(self.frequency_ms)
    }

    pub fn maximum_duration(&self) -> Duration {
        Duration::from_millis(self.maximum_duration_ms)
    }

    /// Registration-time validation.
    pub fn validate(&self) -> StoreResult<()> {
        if self.name.is_empty() {
            return Err(StoreError::Invalid("health check name is empty".into()));
        }
        let absolute = matches!(
            self.service_name.split_once(':'),
            Some((scheme, path)) if !scheme.is_empty() && path.starts_with('/')
        );
        if !absolute {
            return Err(StoreError::Invalid(format!(
                "service name `{}` is not an absolute URI",
                self.service_name
            )));
        }
        if self.suffix_path.is_empty() {
            return Err(StoreError::Invalid("suffix path is empty".into()));
        }
        if self.content.is_some() && self.media_type.is_none() {
            return Err(StoreError::Invalid(
                "content requires a media type".into(),
            ));
        }
        if self.frequency_ms == 0 {
            return Err(StoreError::Invalid("frequency must be positive".into()));
        }
        Ok(())
    }
}

/// A pending execution token in the durable schedule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScheduledItem {
    /// When to execute, in wall-clock ticks. Doubles as the schedule key.
    pub execution_ticks: Ticks,
    /// Key of the health check to execute.
    pub key: String,
}

/// A load-metric subscription.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricCheck {
    /// Metric names to observe, in registration order.
    pub metric_names: Vec<String>,
    /// Application name (no scheme).
    pub application: String,
    /// Service name. Absent = application-level load.
    #[serde(default)]
    pub service: Option<String>,
    /// Partition. Absent = every partition of the service.
    #[serde(default)]
    pub partition: Option<Uuid>,
}

impl MetricCheck {
    /// Durable key: `{app}`, `{app}/{svc}`, or `{app}/{svc}/{partition}`.
    pub fn key(&self) -> String {
        match (&self.service, self.partition) {
            (Some(svc), Some(p)) => format!("{}/{}/{}", self.application, svc, p),
            (Some(svc), None) => format!("{}/{}", self.application, svc),
            (None, _) => self.application.clone(),
        }
    }

    /// Registration-time validation.
    pub fn validate(&self) -> StoreResult<()> {
        if self.application.is_empty() {
            return Err(StoreError::Invalid("application name is empty".into()));
        }
        if self.metric_names.is_empty() {
            return Err(StoreError::Invalid("no metric names given".into()));
        }
        if self.metric_names.iter().any(String::is_empty) {
            return Err(StoreError::Invalid("metric names must be non-empty".into()));
        }
        if self.partition.is_some() && self.service.is_none() {
            return Err(StoreError::Invalid(
                "a partition subscription requires a service".into(),
            ));
        }
        Ok(())
    }

    /// Whether the subscription observes a metric of this name.
    pub fn observes(&self, name: &str) -> bool {
        self.metric_names.iter().any(|n| n == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_check(partition: Option<Uuid>) -> HealthCheck {
        HealthCheck {
            name: "hc1".to_string(),
            service_name: "fabric:/App1/Svc1".to_string(),
            partition,
            endpoint: None,
            suffix_path: "api/values".to_string(),
            method: default_method(),
            content: None,
            media_type: None,
            frequency_ms: 60_000,
            expected_duration_ms: 200,
            maximum_duration_ms: 5_000,
            headers: HashMap::new(),
            warning_status_codes: HashSet::new(),
            error_status_codes: HashSet::new(),
            last_attempt: None,
            failure_count: 0,
            result_code: 0,
            duration_ms: 0,
        }
    }

    #[test]
    fn check_key_includes_partition() {
        let p = Uuid::new_v4();
        let hc = sample_check(Some(p));
        assert_eq!(hc.key(), format!("/App1/Svc1/{p}"));
    }

    #[test]
    fn check_key_without_partition_has_empty_segment() {
        let hc = sample_check(None);
        assert_eq!(hc.key(), "/App1/Svc1/");
    }

    #[test]
    fn service_path_strips_scheme() {
        let hc = sample_check(None);
        assert_eq!(hc.service_path(), "/App1/Svc1");
    }

    #[test]
    fn validate_accepts_sample() {
        assert!(sample_check(None).validate().is_ok());
    }

    #[test]
    fn validate_rejects_relative_service() {
        let mut hc = sample_check(None);
        hc.service_name = "App1/Svc1".to_string();
        assert!(hc.validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_suffix() {
        let mut hc = sample_check(None);
        hc.suffix_path = String::new();
        assert!(hc.validate().is_err());
    }

    #[test]
    fn validate_rejects_content_without_media_type() {
        let mut hc = sample_check(None);
        hc.content = Some("{}".to_string());
        assert!(hc.validate().is_err());
        hc.media_type = Some("application/json".to_string());
        assert!(hc.validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_frequency() {
        let mut hc = sample_check(None);
        hc.frequency_ms = 0;
        assert!(hc.validate().is_err());
    }

    #[test]
    fn metric_check_key_shapes() {
        let p = Uuid::new_v4();
        let mut mc = MetricCheck {
            metric_names: vec!["rps".to_string()],
            application: "App1".to_string(),
            service: None,
            partition: None,
        };
        assert_eq!(mc.key(), "App1");

        mc.service = Some("Svc1".to_string());
        assert_eq!(mc.key(), "App1/Svc1");

        mc.partition = Some(p);
        assert_eq!(mc.key(), format!("App1/Svc1/{p}"));
    }

    #[test]
    fn metric_check_validation() {
        let mut mc = MetricCheck {
            metric_names: vec![],
            application: "App1".to_string(),
            service: None,
            partition: None,
        };
        assert!(mc.validate().is_err());

        mc.metric_names = vec!["rps".to_string()];
        assert!(mc.validate().is_ok());

        // Partition without a service is rejected.
        mc.partition = Some(Uuid::new_v4());
        assert!(mc.validate().is_err());
    }

    #[test]
    fn json_roundtrip_health_check() {
        // All optional fields populated.
        let mut hc = sample_check(Some(Uuid::new_v4()));
        hc.endpoint = Some("admin".to_string());
        hc.content = Some("{\"ping\":true}".to_string());
        hc.media_type = Some("application/json".to_string());
        hc.headers
            .insert("authorization".to_string(), "Bearer t".to_string());
        hc.warning_status_codes = [400, 401, 403].into_iter().collect();
        hc.error_status_codes = [500].into_iter().collect();
        hc.last_attempt = Some(Ticks(123_456_789));
        hc.failure_count = 3;
        hc.result_code = 403;
        hc.duration_ms = 42;

        let bytes = serde_json::to_vec(&hc).unwrap();
        let back: HealthCheck = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back, hc);

        // Minimal shape too.
        let hc = sample_check(None);
        let bytes = serde_json::to_vec(&hc).unwrap();
        let back: HealthCheck = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back, hc);
    }

    #[test]
    fn json_roundtrip_scheduled_item() {
        let item = ScheduledItem {
            execution_ticks: Ticks(9_876_543_210),
            key: "/App1/Svc1/".to_string(),
        };
        let bytes = serde_json::to_vec(&item).unwrap();
        let back: ScheduledItem = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back, item);
    }

    #[test]
    fn json_roundtrip_metric_check() {
        for (service, partition) in [
            (None, None),
            (Some("Svc1".to_string()), None),
            (Some("Svc1".to_string()), Some(Uuid::new_v4())),
        ] {
            let mc = MetricCheck {
                metric_names: vec!["rps".to_string(), "memory".to_string()],
                application: "App1".to_string(),
                service,
                partition,
            };
            let bytes = serde_json::to_vec(&mc).unwrap();
            let back: MetricCheck = serde_json::from_slice(&bytes).unwrap();
            assert_eq!(back, mc);
        }
    }

    #[test]
    fn decode_tolerates_unknown_fields() {
        let raw = r#"{
            "name": "hc1",
            "service_name": "fabric:/App1/Svc1",
            "suffix_path": "healthz",
            "some_future_field": {"nested": true}
        }"#;
        let hc: HealthCheck = serde_json::from_str(raw).unwrap();
        assert_eq!(hc.method, "GET");
        assert_eq!(hc.frequency_ms, 60_000);
        assert!(hc.last_attempt.is_none());
    }
}

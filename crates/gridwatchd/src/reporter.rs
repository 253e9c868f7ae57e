//! Self-reporting.
//!
//! The watchdog reports on itself: an aggregate self-health verdict, one
//! health event per engine, its own load counters, and a roll-up of
//! cluster health with per-entity events for anything not Ok.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info};
use uuid::Uuid;

use gridwatch_cleanup::CleanupEngine;
use gridwatch_core::{HealthState, TelemetrySink, WatchdogSettings};
use gridwatch_health::HealthCheckEngine;
use gridwatch_metrics::MetricsEngine;
use gridwatch_platform::PlatformHandle;

/// Source name attached to self-published health events.
const SOURCE: &str = "GridWatch";

/// Timeout for the cluster-health roll-up query.
const CLUSTER_HEALTH_TIMEOUT: Duration = Duration::from_secs(4);

/// Publishes the watchdog's own health, load, and the cluster roll-up.
pub struct SelfReporter {
    platform: Arc<PlatformHandle>,
    telemetry: Option<Arc<dyn TelemetrySink>>,
    health_engine: Option<Arc<HealthCheckEngine>>,
    metrics_engine: Option<Arc<MetricsEngine>>,
    cleanup_engine: Option<Arc<CleanupEngine>>,
    /// Listener endpoints currently bound.
    listening_endpoints: usize,
    /// The watchdog's own partition, target of self-health events.
    partition: Uuid,
}

impl SelfReporter {
    pub fn new(
        platform: Arc<PlatformHandle>,
        telemetry: Option<Arc<dyn TelemetrySink>>,
        health_engine: Option<Arc<HealthCheckEngine>>,
        metrics_engine: Option<Arc<MetricsEngine>>,
        cleanup_engine: Option<Arc<CleanupEngine>>,
        listening_endpoints: usize,
        partition: Uuid,
    ) -> Self {
        Self {
            platform,
            telemetry,
            health_engine,
            metrics_engine,
            cleanup_engine,
            listening_endpoints,
            partition,
        }
    }

    /// Aggregate self health: Ok unless a dependency is missing or
    /// unhealthy. The description accumulates one line per failure.
    pub fn self_health(&self) -> (HealthState, String) {
        let mut state = HealthState::Ok;
        let mut description = String::new();
        let mut degrade = |line: &str, description: &mut String| {
            state = HealthState::escalate(state, HealthState::Error);
            description.push_str(line);
            description.push('\n');
        };

        if self.telemetry.is_none() {
            degrade("telemetry sink is not available", &mut description);
        }
        match &self.health_engine {
            None => degrade("health check engine is not available", &mut description),
            Some(engine) if engine.health() == HealthState::Error => {
                degrade("health check engine reports Error", &mut description)
            }
            Some(_) => {}
        }
        match &self.metrics_engine {
            None => degrade("metrics engine is not available", &mut description),
            Some(engine) if engine.health() == HealthState::Error => {
                degrade("metrics engine reports Error", &mut description)
            }
            Some(_) => {}
        }
        if self.listening_endpoints == 0 {
            degrade("no listening endpoints", &mut description);
        }

        (state, description)
    }

    /// Publish one self-report pass.
    pub async fn report(&self, ttl: Duration) {
        let platform = self.platform.get();

        let (state, description) = self.self_health();
        let _ = platform
            .report_partition_health(
                self.partition,
                SOURCE,
                "WatchdogServiceHealth",
                state,
                &description,
                ttl,
            )
            .await;

        // One event per engine, Error when the engine is absent.
        let engine_states = [
            (
                "HealthCheckOperations",
                self.health_engine
                    .as_ref()
                    .map_or(HealthState::Error, |e| e.health()),
            ),
            (
                "MetricOperations",
                self.metrics_engine
                    .as_ref()
                    .map_or(HealthState::Error, |e| e.health()),
            ),
            (
                "CleanupOperations",
                self.cleanup_engine
                    .as_ref()
                    .map_or(HealthState::Error, |e| e.health()),
            ),
        ];
        for (property, engine_state) in engine_states {
            let _ = platform
                .report_partition_health(self.partition, SOURCE, property, engine_state, "", ttl)
                .await;
        }

        // Own load, to the platform and the telemetry sink.
        let observed = self
            .metrics_engine
            .as_ref()
            .map_or(0, |e| e.observed_count());
        let checks = self.health_engine.as_ref().map_or(0, |e| e.check_count());
        let _ = platform
            .report_load(&[
                ("ObservedMetricCount".to_string(), observed as i64),
                ("HealthCheckCount".to_string(), checks as i64),
            ])
            .await;
        if let Some(telemetry) = &self.telemetry {
            telemetry
                .report_metric("watchdog", "watchdog", "ObservedMetricCount", observed as f64)
                .await;
            telemetry
                .report_metric("watchdog", "watchdog", "HealthCheckCount", checks as f64)
                .await;
        }

        self.report_cluster_rollup(platform.as_ref()).await;
    }

    /// Cluster health roll-up: the aggregate state plus one event per
    /// application and node that is not Ok.
    async fn report_cluster_rollup(&self, platform: &dyn gridwatch_platform::PlatformClient) {
        let Some(telemetry) = &self.telemetry else {
            return;
        };
        let cluster = match platform.cluster_health(CLUSTER_HEALTH_TIMEOUT).await {
            Ok(cluster) => cluster,
            Err(e) => {
                debug!(error = %e, "cluster health unavailable");
                return;
            }
        };

        telemetry
            .report_health("Cluster", "", "", SOURCE, "ClusterHealth", cluster.aggregated)
            .await;
        for app in cluster
            .applications
            .iter()
            .filter(|a| a.state != HealthState::Ok)
        {
            telemetry
                .report_health(&app.name, "", "", SOURCE, "ApplicationHealth", app.state)
                .await;
        }
        for node in cluster.nodes.iter().filter(|n| n.state != HealthState::Ok) {
            telemetry
                .report_health("Cluster", "", &node.name, SOURCE, "NodeHealth", node.state)
                .await;
        }
    }

    /// Run the periodic report loop until shutdown.
    pub async fn run(
        self: Arc<Self>,
        settings: watch::Receiver<WatchdogSettings>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!("self reporter started");
        let mut last_pass = Duration::ZERO;
        loop {
            let interval = settings.borrow().report_interval;
            // An overrunning pass makes the next one fire immediately.
            let wait = interval.saturating_sub(last_pass);
            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    let started = std::time::Instant::now();
                    let ttl = interval + Duration::from_secs(30);
                    self.report(ttl).await;
                    last_pass = started.elapsed();
                }
                _ = shutdown.changed() => {
                    info!("self reporter shutting down");
                    break;
                }
            }
        }
    }
}

//! The health-check engine.
//!
//! Registrations and schedule mutations go through the durable store; the
//! tick loop drains due schedule entries in ascending tick order. Probes
//! and platform calls happen outside any store transaction so the write
//! lock is never pinned across a suspension point — each item's
//! remove-then-reinsert is still atomic in its own transaction.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use gridwatch_core::{HealthState, HealthStateCell, TelemetrySink, Ticks, WatchdogSettings};
use gridwatch_platform::{
    EndpointRole, Partition, PartitionKey, PlatformClient, PlatformHandle,
};
use gridwatch_state::{AccessStatus, HealthCheck, ScheduledItem, Tx, WatchdogStore};

use crate::error::{HealthError, HealthResult};
use crate::probe::{self, ProbeOutcome};

/// Source name attached to published health events.
const HEALTH_SOURCE: &str = "GridWatch";

/// Executes registered health checks off the durable schedule.
pub struct HealthCheckEngine {
    store: WatchdogStore,
    platform: Arc<PlatformHandle>,
    telemetry: Arc<dyn TelemetrySink>,
    /// Registrations accepted by this process. Observed by the
    /// self-reporter without coordination.
    check_count: AtomicU64,
    health: HealthStateCell,
}

impl HealthCheckEngine {
    pub fn new(
        store: WatchdogStore,
        platform: Arc<PlatformHandle>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self {
            store,
            platform,
            telemetry,
            check_count: AtomicU64::new(0),
            health: HealthStateCell::default(),
        }
    }

    /// Current engine health, as seen by the self-reporter.
    pub fn health(&self) -> HealthState {
        self.health.get()
    }

    /// Number of registrations accepted by this process.
    pub fn check_count(&self) -> u64 {
        self.check_count.load(Ordering::Relaxed)
    }

    // ── Public contract ────────────────────────────────────────────

    /// Register a health check: validate the target service exists, then
    /// upsert the check and reset its schedule in one transaction.
    pub async fn register(&self, hc: HealthCheck) -> HealthResult<()> {
        hc.validate()
            .map_err(|e| HealthError::InvalidArgument(e.to_string()))?;

        let platform = self.platform.get();
        if !platform
            .service_exists(&hc.service_name, hc.partition)
            .await?
        {
            return Err(HealthError::InvalidArgument(format!(
                "service `{}` does not exist",
                hc.service_name
            )));
        }

        let key = hc.key();
        let tx = self.store.begin()?;
        tx.put_check(&hc)?;
        // The later registration wins: reset any schedule this key had.
        tx.remove_scheduled_for_key(&key)?;
        schedule_at(&tx, Ticks::now(), &key)?;
        tx.commit()?;

        self.check_count.fetch_add(1, Ordering::Relaxed);
        info!(%key, name = %hc.name, "health check registered");
        Ok(())
    }

    /// Ordered snapshot of registered checks, filtered by prefix.
    pub fn list(
        &self,
        app: Option<&str>,
        svc: Option<&str>,
        partition: Option<&str>,
    ) -> HealthResult<Vec<HealthCheck>> {
        let prefix = filter_prefix(app, svc, partition);
        let snapshot = self.store.snapshot()?;
        Ok(snapshot.checks_with_prefix(&prefix)?)
    }

    // ── Tick loop ──────────────────────────────────────────────────

    /// Execute every due schedule entry. `report_ttl` bounds the validity
    /// window of published health events (interval + 30 s).
    pub async fn tick(&self, report_ttl: Duration) -> HealthResult<()> {
        if self.store.read_status() != AccessStatus::Granted
            || self.store.write_status() != AccessStatus::Granted
        {
            debug!("health tick skipped, access not granted");
            return Ok(());
        }

        let now = Ticks::now();
        let due = self.store.snapshot()?.due_scheduled(now)?;
        for item in due {
            match self.execute_item(&item, report_ttl).await {
                Ok(()) => {}
                Err(e) if e.is_not_primary() => {
                    debug!("lost primacy mid-tick, abandoning");
                    return Ok(());
                }
                Err(e) if e.is_transient() => {
                    warn!(key = %item.key, error = %e, "transient fault, check retried next tick");
                }
                Err(e) => {
                    self.health.set(HealthState::Error);
                    return Err(e);
                }
            }
        }
        self.health.set(HealthState::Ok);
        Ok(())
    }

    /// Run the periodic tick loop until shutdown. The interval is
    /// re-sampled every iteration so config reloads apply without
    /// tearing the engine down.
    pub async fn run(
        self: Arc<Self>,
        settings: watch::Receiver<WatchdogSettings>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!("health check engine started");
        let mut last_tick = Duration::ZERO;
        loop {
            let interval = settings.borrow().health_check_interval;
            // An overrunning tick makes the next one fire immediately.
            let wait = interval.saturating_sub(last_tick);
            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    let started = std::time::Instant::now();
                    let ttl = interval + Duration::from_secs(30);
                    if let Err(e) = self.tick(ttl).await {
                        error!(error = %e, "health check tick failed");
                    }
                    last_tick = started.elapsed();
                }
                _ = shutdown.changed() => {
                    info!("health check engine shutting down");
                    break;
                }
            }
        }
    }

    // ── Item execution ─────────────────────────────────────────────

    async fn execute_item(&self, item: &ScheduledItem, report_ttl: Duration) -> HealthResult<()> {
        let Some(cv) = self.store.snapshot()?.get_check(&item.key)? else {
            // Orphaned schedule entry; drop it.
            let tx = self.store.begin()?;
            tx.remove_scheduled(item.execution_ticks)?;
            tx.commit()?;
            return Ok(());
        };

        let platform = self.platform.get();

        // A stored partition that no longer resolves means the target is
        // gone; checks without a stored partition resolve as singletons.
        let partition = match cv.partition {
            Some(pid) => match platform.find_partition(pid).await? {
                Some(partition) => Some(partition),
                None => {
                    let tx = self.store.begin()?;
                    tx.remove_check(&item.key)?;
                    tx.remove_scheduled(item.execution_ticks)?;
                    tx.commit()?;
                    info!(key = %item.key, "health check target gone, entry removed");
                    return Ok(());
                }
            },
            None => None,
        };

        let result = self
            .probe_check(platform.as_ref(), &cv, partition.as_ref(), report_ttl)
            .await;

        let tx = self.store.begin()?;
        if tx.update_check_if(&item.key, &result, &cv)? {
            tx.remove_scheduled(item.execution_ticks)?;
            let next = result.last_attempt.unwrap_or_else(Ticks::now) + cv.frequency();
            schedule_at(&tx, next, &item.key)?;
        }
        // A lost swap means a concurrent registration replaced the check
        // and reset its schedule; leave that schedule alone.
        tx.commit()?;
        Ok(())
    }

    /// Resolve, probe, publish, and produce the updated check record.
    async fn probe_check(
        &self,
        platform: &dyn PlatformClient,
        cv: &HealthCheck,
        partition: Option<&Partition>,
        report_ttl: Duration,
    ) -> HealthCheck {
        let now = Ticks::now();
        let key = partition.map(Partition::key).unwrap_or(PartitionKey::None);
        let partition_id = partition
            .map(|p| p.id)
            .or(cv.partition)
            .unwrap_or_else(Uuid::nil);

        let (outcome, location) = match self.resolve_base_address(platform, cv, &key).await {
            Some(base) => (probe::execute(cv, &base).await, base),
            None => (ProbeOutcome::transport_failure(), String::new()),
        };

        let description = if outcome.duration_ms < 0 {
            format!("probe of {} did not complete", cv.suffix_path)
        } else {
            format!(
                "{} {} returned {}",
                cv.method, cv.suffix_path, outcome.result_code
            )
        };

        if let Err(e) = platform
            .report_partition_health(
                partition_id,
                HEALTH_SOURCE,
                &cv.name,
                outcome.verdict,
                &description,
                report_ttl,
            )
            .await
        {
            warn!(name = %cv.name, error = %e, "failed to publish health verdict");
        }

        self.telemetry
            .report_availability(
                &cv.service_name,
                &partition_id.to_string(),
                &cv.name,
                now,
                outcome.duration_ms,
                &location,
                outcome.success,
            )
            .await;

        let mut result = cv.clone();
        result.last_attempt = Some(now);
        result.failure_count = if outcome.success {
            0
        } else {
            cv.failure_count + 1
        };
        result.result_code = outcome.result_code;
        result.duration_ms = outcome.duration_ms;
        result
    }

    /// Pick the probe base address: the first primary or stateless
    /// endpoint, then the configured listener name (or the first listener).
    async fn resolve_base_address(
        &self,
        platform: &dyn PlatformClient,
        cv: &HealthCheck,
        key: &PartitionKey,
    ) -> Option<String> {
        let endpoints = match platform.resolve_endpoint(&cv.service_name, key).await {
            Ok(endpoints) => endpoints,
            Err(e) => {
                debug!(service = %cv.service_name, error = %e, "endpoint resolution failed");
                return None;
            }
        };
        endpoints
            .iter()
            .find(|e| matches!(e.role, EndpointRole::Primary | EndpointRole::Stateless))
            .and_then(|e| e.listener_address(cv.endpoint.as_deref()))
            .map(str::to_string)
    }
}

/// Build the list-filter prefix from the optional app/service/partition
/// filters. Keys are service absolute paths, so the prefix is too.
pub fn filter_prefix(app: Option<&str>, svc: Option<&str>, partition: Option<&str>) -> String {
    match (app, svc, partition) {
        (Some(app), Some(svc), Some(partition)) => format!("/{app}/{svc}/{partition}"),
        (Some(app), Some(svc), None) => format!("/{app}/{svc}"),
        (Some(app), None, _) => format!("/{app}"),
        _ => String::new(),
    }
}

/// Place a schedule entry at `at`, advancing one tick per collision.
/// Bounded at six attempts.
pub(crate) fn schedule_at(tx: &Tx, at: Ticks, key: &str) -> HealthResult<Ticks> {
    let mut ticks = at;
    for _ in 0..6 {
        let item = ScheduledItem {
            execution_ticks: ticks,
            key: key.to_string(),
        };
        if tx.try_add_scheduled(&item)? {
            return Ok(ticks);
        }
        ticks = Ticks(ticks.0 + 1);
    }
    Err(HealthError::ScheduleConflict(key.to_string()))
}

//! The metrics engine.
//!
//! One tick walks every subscription in key order and dispatches on its
//! shape: a pinned partition pulls partition load, a service subscription
//! enumerates Ready partitions and replicas, an application subscription
//! pulls the aggregate. Observations matching the subscription fan out to
//! the telemetry sink.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use gridwatch_core::{HealthState, HealthStateCell, TelemetrySink, WatchdogSettings};
use gridwatch_platform::{
    Partition, PartitionStatus, PlatformClient, PlatformError, PlatformHandle, Replica,
    ReplicaStatus,
};
use gridwatch_state::{AccessStatus, MetricCheck, StoreError, WatchdogStore};

use crate::error::{MetricsError, MetricsResult};

/// Retry budget for each paged platform enumeration.
const PAGED_RETRY_BUDGET: u32 = 5;

/// Harvests load metrics for registered subscriptions.
pub struct MetricsEngine {
    store: WatchdogStore,
    platform: Arc<PlatformHandle>,
    telemetry: Arc<dyn TelemetrySink>,
    /// Total observations emitted. Observed by the self-reporter.
    observed_count: AtomicU64,
    health: HealthStateCell,
}

impl MetricsEngine {
    pub fn new(
        store: WatchdogStore,
        platform: Arc<PlatformHandle>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self {
            store,
            platform,
            telemetry,
            observed_count: AtomicU64::new(0),
            health: HealthStateCell::default(),
        }
    }

    /// Current engine health, as seen by the self-reporter.
    pub fn health(&self) -> HealthState {
        self.health.get()
    }

    /// Total metric observations emitted by this process.
    pub fn observed_count(&self) -> u64 {
        self.observed_count.load(Ordering::Relaxed)
    }

    // ── Public contract ────────────────────────────────────────────

    /// Register (upsert) a metric subscription. A transient store fault
    /// refreshes the platform handle and reports success; the caller is
    /// retried externally.
    pub async fn register(&self, mc: MetricCheck) -> MetricsResult<()> {
        mc.validate()
            .map_err(|e| MetricsError::InvalidArgument(e.to_string()))?;

        let outcome: Result<(), StoreError> = (|| {
            let tx = self.store.begin()?;
            tx.put_metric_check(&mc)?;
            tx.commit()
        })();

        match outcome {
            Ok(()) => {
                info!(key = %mc.key(), "metric subscription registered");
                Ok(())
            }
            Err(e) if e.is_transient() => {
                warn!(key = %mc.key(), error = %e, "transient fault registering subscription");
                self.platform.refresh();
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Ordered snapshot of subscriptions, filtered by prefix.
    pub fn list(
        &self,
        app: Option<&str>,
        svc: Option<&str>,
        partition: Option<&str>,
    ) -> MetricsResult<Vec<MetricCheck>> {
        let prefix = match (app, svc, partition) {
            (Some(app), Some(svc), Some(partition)) => format!("{app}/{svc}/{partition}"),
            (Some(app), Some(svc), None) => format!("{app}/{svc}"),
            (Some(app), None, _) => app.to_string(),
            _ => String::new(),
        };
        let snapshot = self.store.snapshot()?;
        Ok(snapshot.metric_checks_with_prefix(&prefix)?)
    }

    // ── Tick loop ──────────────────────────────────────────────────

    /// Harvest every subscription once.
    pub async fn tick(&self) -> MetricsResult<()> {
        if self.store.read_status() != AccessStatus::Granted
            || self.store.write_status() != AccessStatus::Granted
        {
            debug!("metrics tick skipped, access not granted");
            return Ok(());
        }

        let subscriptions = self.store.snapshot()?.metric_checks_ordered()?;
        for mc in subscriptions {
            if !self.harvest(&mc).await {
                debug!(key = %mc.key(), "subscription harvest incomplete");
            }
        }
        self.health.set(HealthState::Ok);
        Ok(())
    }

    /// Run the periodic tick loop until shutdown.
    pub async fn run(
        self: Arc<Self>,
        settings: watch::Receiver<WatchdogSettings>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!("metrics engine started");
        let mut last_tick = std::time::Duration::ZERO;
        loop {
            let interval = settings.borrow().metric_interval;
            // An overrunning tick makes the next one fire immediately.
            let wait = interval.saturating_sub(last_tick);
            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    let started = std::time::Instant::now();
                    if let Err(e) = self.tick().await {
                        self.health.set(HealthState::Error);
                        error!(error = %e, "metrics tick failed");
                    }
                    last_tick = started.elapsed();
                }
                _ = shutdown.changed() => {
                    info!("metrics engine shutting down");
                    break;
                }
            }
        }
    }

    // ── Harvest dispatch ───────────────────────────────────────────

    /// Pull and publish load for one subscription. Returns whether the
    /// harvest ran to completion.
    async fn harvest(&self, mc: &MetricCheck) -> bool {
        let platform = self.platform.get();
        match (&mc.service, mc.partition) {
            (Some(svc), Some(partition)) => {
                self.harvest_partition(platform.as_ref(), svc, partition)
                    .await
            }
            (Some(svc), None) => {
                self.harvest_service(platform.as_ref(), mc, svc).await
            }
            (None, _) => self.harvest_application(platform.as_ref(), mc).await,
        }
    }

    /// Pinned partition: emit every primary-load report.
    async fn harvest_partition(
        &self,
        platform: &dyn PlatformClient,
        svc: &str,
        partition: Uuid,
    ) -> bool {
        let load = match platform.partition_load(partition).await {
            Ok(load) => load,
            Err(e) => {
                debug!(%partition, error = %e, "partition load unavailable");
                return false;
            }
        };
        for report in &load.primary {
            self.emit(svc, &partition.to_string(), &report.name, report.value)
                .await;
        }
        true
    }

    /// Service subscription: every Ready replica of every Ready partition,
    /// filtered to the subscribed metric names.
    async fn harvest_service(
        &self,
        platform: &dyn PlatformClient,
        mc: &MetricCheck,
        svc: &str,
    ) -> bool {
        let uri = format!("fabric:/{}/{}", mc.application, svc);
        let Some(partitions) = list_partitions(platform, &uri).await else {
            return false;
        };

        for partition in partitions
            .iter()
            .filter(|p| p.status == PartitionStatus::Ready)
        {
            let Some(replicas) = list_replicas(platform, partition.id).await else {
                return false;
            };
            for replica in replicas.iter().filter(|r| r.status == ReplicaStatus::Ready) {
                let reports = match platform.replica_load(partition.id, replica.id).await {
                    Ok(reports) => reports,
                    Err(e) => {
                        debug!(partition = %partition.id, replica = replica.id, error = %e,
                            "replica load unavailable");
                        continue;
                    }
                };
                for report in reports.iter().filter(|r| mc.observes(&r.name)) {
                    self.emit(svc, &replica.id.to_string(), &report.name, report.value)
                        .await;
                }
            }
        }
        true
    }

    /// Application subscription: aggregate load, filtered to the
    /// subscribed metric names.
    async fn harvest_application(&self, platform: &dyn PlatformClient, mc: &MetricCheck) -> bool {
        let reports = match platform.app_load(&mc.application).await {
            Ok(reports) => reports,
            Err(e) => {
                debug!(application = %mc.application, error = %e, "application load unavailable");
                return false;
            }
        };
        for report in reports.iter().filter(|r| mc.observes(&r.name)) {
            self.emit(&mc.application, &mc.application, &report.name, report.value)
                .await;
        }
        true
    }

    async fn emit(&self, role: &str, instance: &str, name: &str, value: f64) {
        self.telemetry.report_metric(role, instance, name, value).await;
        self.observed_count.fetch_add(1, Ordering::Relaxed);
    }
}

/// Enumerate a service's partitions with continuation-token pagination.
/// Transient faults consume one unit of the retry budget; exhaustion
/// yields what has accumulated. `None` means the service is gone.
async fn list_partitions(platform: &dyn PlatformClient, service: &str) -> Option<Vec<Partition>> {
    let mut items = Vec::new();
    let mut continuation: Option<String> = None;
    let mut budget = PAGED_RETRY_BUDGET;
    loop {
        match platform.partition_list(service, continuation.as_deref()).await {
            Ok(page) => {
                items.extend(page.items);
                match page.continuation {
                    Some(c) => continuation = Some(c),
                    None => return Some(items),
                }
            }
            Err(PlatformError::NotFound(_)) => return None,
            Err(e) if e.is_transient() => {
                if budget == 0 {
                    debug!(%service, "partition enumeration retry budget exhausted");
                    return Some(items);
                }
                budget -= 1;
            }
            Err(e) => {
                debug!(%service, error = %e, "partition enumeration failed");
                return Some(items);
            }
        }
    }
}

/// Enumerate a partition's replicas; same budget rules as partitions.
async fn list_replicas(platform: &dyn PlatformClient, partition: Uuid) -> Option<Vec<Replica>> {
    let mut items = Vec::new();
    let mut continuation: Option<String> = None;
    let mut budget = PAGED_RETRY_BUDGET;
    loop {
        match platform.replica_list(partition, continuation.as_deref()).await {
            Ok(page) => {
                items.extend(page.items);
                match page.continuation {
                    Some(c) => continuation = Some(c),
                    None => return Some(items),
                }
            }
            Err(PlatformError::NotFound(_)) => return None,
            Err(e) if e.is_transient() => {
                if budget == 0 {
                    debug!(%partition, "replica enumeration retry budget exhausted");
                    return Some(items);
                }
                budget -= 1;
            }
            Err(e) => {
                debug!(%partition, error = %e, "replica enumeration failed");
                return Some(items);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use gridwatch_core::RecordingSink;
    use gridwatch_platform::{
        EndpointRole, InMemoryPlatform, LoadReport, PartitionKind, PartitionLoad,
    };
    use gridwatch_state::ReplicaRole;

    struct Fixture {
        engine: MetricsEngine,
        platform: Arc<InMemoryPlatform>,
        telemetry: Arc<RecordingSink>,
        store: WatchdogStore,
    }

    fn fixture() -> Fixture {
        let store = WatchdogStore::open_in_memory().unwrap();
        store.set_role(ReplicaRole::Primary);
        let platform = Arc::new(InMemoryPlatform::new());
        let telemetry = Arc::new(RecordingSink::new());
        let engine = MetricsEngine::new(
            store.clone(),
            Arc::new(PlatformHandle::with_client(platform.clone())),
            telemetry.clone(),
        );
        Fixture {
            engine,
            platform,
            telemetry,
            store,
        }
    }

    fn subscription(
        names: &[&str],
        service: Option<&str>,
        partition: Option<Uuid>,
    ) -> MetricCheck {
        MetricCheck {
            metric_names: names.iter().map(|n| n.to_string()).collect(),
            application: "App1".to_string(),
            service: service.map(str::to_string),
            partition,
        }
    }

    fn ready_partition(id: Uuid) -> Partition {
        Partition {
            id,
            kind: PartitionKind::Singleton,
            status: PartitionStatus::Ready,
        }
    }

    fn ready_replica(id: i64) -> Replica {
        Replica {
            id,
            role: EndpointRole::Primary,
            status: ReplicaStatus::Ready,
        }
    }

    fn report(name: &str, value: f64) -> LoadReport {
        LoadReport {
            name: name.to_string(),
            value,
        }
    }

    // ── Registration ───────────────────────────────────────────────

    #[tokio::test]
    async fn register_and_list() {
        let f = fixture();
        f.engine
            .register(subscription(&["rps"], Some("Svc1"), None))
            .await
            .unwrap();
        f.engine
            .register(subscription(&["memory"], None, None))
            .await
            .unwrap();

        assert_eq!(f.engine.list(None, None, None).unwrap().len(), 2);
        assert_eq!(
            f.engine.list(Some("App1"), Some("Svc1"), None).unwrap().len(),
            1
        );
        assert!(f.engine.list(Some("Other"), None, None).unwrap().is_empty());
    }

    #[tokio::test]
    async fn register_rejects_invalid_subscription() {
        let f = fixture();
        let err = f
            .engine
            .register(subscription(&[], Some("Svc1"), None))
            .await
            .unwrap_err();
        assert!(matches!(err, MetricsError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn register_swallows_transient_store_faults() {
        let f = fixture();
        // A reconfiguring replica fails transiently; registration is
        // reported as success and retried externally.
        f.store.set_reconfiguring(true);
        f.engine
            .register(subscription(&["rps"], Some("Svc1"), None))
            .await
            .unwrap();
        f.store.set_reconfiguring(false);
        assert!(f.engine.list(None, None, None).unwrap().is_empty());
    }

    // ── Partition-shaped subscriptions ─────────────────────────────

    #[tokio::test]
    async fn partition_subscription_emits_primary_load() {
        let f = fixture();
        let p = Uuid::new_v4();
        f.platform.set_partition_load(
            p,
            PartitionLoad {
                primary: vec![report("rps", 120.0), report("memory", 64.0)],
                secondary: vec![report("rps", 15.0)],
            },
        );
        f.engine
            .register(subscription(&["rps"], Some("Svc1"), Some(p)))
            .await
            .unwrap();

        f.engine.tick().await.unwrap();

        // Every primary report is emitted; secondary load is not.
        let metrics = f.telemetry.metrics();
        assert_eq!(metrics.len(), 2);
        assert!(metrics.iter().all(|(instance, _, _)| *instance == p.to_string()));
        assert!(!metrics.iter().any(|(_, _, value)| *value == 15.0));
        assert_eq!(f.engine.observed_count(), 2);
    }

    // ── Service-shaped subscriptions ───────────────────────────────

    #[tokio::test]
    async fn service_subscription_walks_ready_replicas() {
        let f = fixture();
        let p1 = Uuid::new_v4();
        let p2 = Uuid::new_v4();
        let mut not_ready = ready_partition(Uuid::new_v4());
        not_ready.status = PartitionStatus::NotReady;

        f.platform.set_service_partitions(
            "fabric:/App1/Svc1",
            vec![ready_partition(p1), ready_partition(p2), not_ready],
        );
        f.platform.set_replicas(
            p1,
            vec![ready_replica(1), Replica {
                id: 2,
                role: EndpointRole::Secondary,
                status: ReplicaStatus::Down,
            }],
        );
        f.platform.set_replicas(p2, vec![ready_replica(3)]);
        f.platform
            .set_replica_load(p1, 1, vec![report("rps", 10.0), report("other", 5.0)]);
        f.platform.set_replica_load(p2, 3, vec![report("rps", 30.0)]);

        f.engine
            .register(subscription(&["rps"], Some("Svc1"), None))
            .await
            .unwrap();
        f.engine.tick().await.unwrap();

        // Only subscribed names from Ready replicas of Ready partitions.
        let metrics = f.telemetry.metrics();
        assert_eq!(metrics.len(), 2);
        let values: Vec<f64> = metrics.iter().map(|(_, _, v)| *v).collect();
        assert!(values.contains(&10.0) && values.contains(&30.0));
    }

    #[tokio::test]
    async fn service_subscription_paginates() {
        let f = fixture();
        let partitions: Vec<Partition> =
            (0..5).map(|_| ready_partition(Uuid::new_v4())).collect();
        f.platform
            .set_service_partitions("fabric:/App1/Svc1", partitions.clone());
        f.platform.set_page_size(2);
        for p in &partitions {
            f.platform.set_replicas(p.id, vec![ready_replica(1)]);
            f.platform
                .set_replica_load(p.id, 1, vec![report("rps", 1.0)]);
        }

        f.engine
            .register(subscription(&["rps"], Some("Svc1"), None))
            .await
            .unwrap();
        f.engine.tick().await.unwrap();

        assert_eq!(f.engine.observed_count(), 5);
    }

    #[tokio::test]
    async fn retry_budget_survives_transient_faults() {
        let f = fixture();
        let p = Uuid::new_v4();
        f.platform
            .set_service_partitions("fabric:/App1/Svc1", vec![ready_partition(p)]);
        f.platform.set_replicas(p, vec![ready_replica(1)]);
        f.platform
            .set_replica_load(p, 1, vec![report("rps", 7.0)]);
        // Two transient faults are inside the budget of five.
        f.platform
            .queue_fault("partition_list", PlatformError::Timeout);
        f.platform
            .queue_fault("partition_list", PlatformError::Transient("busy".into()));

        f.engine
            .register(subscription(&["rps"], Some("Svc1"), None))
            .await
            .unwrap();
        f.engine.tick().await.unwrap();

        assert_eq!(f.engine.observed_count(), 1);
    }

    #[tokio::test]
    async fn retry_budget_exhaustion_gives_up_silently() {
        let f = fixture();
        let p = Uuid::new_v4();
        f.platform
            .set_service_partitions("fabric:/App1/Svc1", vec![ready_partition(p)]);
        // Six faults exceed the budget of five retries.
        for _ in 0..6 {
            f.platform
                .queue_fault("partition_list", PlatformError::Timeout);
        }

        f.engine
            .register(subscription(&["rps"], Some("Svc1"), None))
            .await
            .unwrap();
        f.engine.tick().await.unwrap();

        // Nothing accumulated, nothing emitted, no error escaped.
        assert_eq!(f.engine.observed_count(), 0);
    }

    #[tokio::test]
    async fn missing_service_ends_subscription_without_metrics() {
        let f = fixture();
        // No partitions seeded: partition_list returns NotFound.
        f.engine
            .register(subscription(&["rps"], Some("Gone"), None))
            .await
            .unwrap();
        f.engine.tick().await.unwrap();
        assert_eq!(f.engine.observed_count(), 0);
    }

    // ── Application-shaped subscriptions ───────────────────────────

    #[tokio::test]
    async fn application_subscription_filters_names() {
        let f = fixture();
        f.platform.set_app_load(
            "App1",
            vec![report("rps", 100.0), report("disk", 40.0)],
        );
        f.engine
            .register(subscription(&["rps"], None, None))
            .await
            .unwrap();
        f.engine.tick().await.unwrap();

        let metrics = f.telemetry.metrics();
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].1, "rps");
        assert_eq!(metrics[0].2, 100.0);
    }

    // ── Gating ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn tick_is_a_noop_without_primacy() {
        let f = fixture();
        f.platform.set_app_load("App1", vec![report("rps", 1.0)]);
        f.engine
            .register(subscription(&["rps"], None, None))
            .await
            .unwrap();

        f.store.set_role(ReplicaRole::ActiveSecondary);
        f.engine.tick().await.unwrap();
        assert_eq!(f.engine.observed_count(), 0);
    }
}

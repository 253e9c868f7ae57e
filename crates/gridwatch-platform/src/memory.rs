//! In-memory platform directory.
//!
//! Serves standalone deployments where the watchdog is its own platform,
//! and doubles as the scriptable test double: faults can be queued per
//! method and every published health/load report is recorded.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use gridwatch_core::HealthState;

use crate::client::{PlatformClient, PlatformError, PlatformResult};
use crate::types::{
    ClusterHealth, LoadReport, Page, Partition, PartitionKey, PartitionLoad, Replica,
    ResolvedEndpoint,
};

/// One recorded partition-health publication.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthReport {
    pub partition: Uuid,
    pub source: String,
    pub property: String,
    pub state: HealthState,
    pub description: String,
}

#[derive(Default)]
struct State {
    services: HashSet<String>,
    partitions: HashMap<Uuid, Partition>,
    endpoints: HashMap<String, Vec<ResolvedEndpoint>>,
    service_partitions: HashMap<String, Vec<Partition>>,
    replicas: HashMap<Uuid, Vec<Replica>>,
    partition_loads: HashMap<Uuid, PartitionLoad>,
    replica_loads: HashMap<(Uuid, i64), Vec<LoadReport>>,
    app_loads: HashMap<String, Vec<LoadReport>>,
    cluster: Option<ClusterHealth>,
    /// Page size for list calls; 0 = everything in one page.
    page_size: usize,
    health_reports: Vec<HealthReport>,
    load_reports: Vec<Vec<(String, i64)>>,
    faults: HashMap<&'static str, VecDeque<PlatformError>>,
    resolve_calls: u64,
}

/// In-memory `PlatformClient`.
#[derive(Default)]
pub struct InMemoryPlatform {
    inner: Mutex<State>,
}

impl InMemoryPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn take_fault(&self, method: &'static str) -> Option<PlatformError> {
        self.lock()
            .faults
            .get_mut(method)
            .and_then(VecDeque::pop_front)
    }

    // ── Seeding ────────────────────────────────────────────────────

    pub fn add_service(&self, service: &str) {
        self.lock().services.insert(service.to_string());
    }

    pub fn add_partition(&self, partition: Partition) {
        self.lock().partitions.insert(partition.id, partition);
    }

    pub fn remove_partition(&self, id: Uuid) {
        self.lock().partitions.remove(&id);
    }

    pub fn set_endpoints(&self, service: &str, endpoints: Vec<ResolvedEndpoint>) {
        self.lock()
            .endpoints
            .insert(service.to_string(), endpoints);
    }

    pub fn set_service_partitions(&self, service: &str, partitions: Vec<Partition>) {
        self.lock()
            .service_partitions
            .insert(service.to_string(), partitions);
    }

    pub fn set_replicas(&self, partition: Uuid, replicas: Vec<Replica>) {
        self.lock().replicas.insert(partition, replicas);
    }

    pub fn set_partition_load(&self, partition: Uuid, load: PartitionLoad) {
        self.lock().partition_loads.insert(partition, load);
    }

    pub fn set_replica_load(&self, partition: Uuid, replica: i64, reports: Vec<LoadReport>) {
        self.lock()
            .replica_loads
            .insert((partition, replica), reports);
    }

    pub fn set_app_load(&self, application: &str, reports: Vec<LoadReport>) {
        self.lock()
            .app_loads
            .insert(application.to_string(), reports);
    }

    pub fn set_cluster_health(&self, cluster: ClusterHealth) {
        self.lock().cluster = Some(cluster);
    }

    pub fn set_page_size(&self, page_size: usize) {
        self.lock().page_size = page_size;
    }

    /// Queue a fault returned by the next call to `method`.
    pub fn queue_fault(&self, method: &'static str, error: PlatformError) {
        self.lock().faults.entry(method).or_default().push_back(error);
    }

    // ── Observations ───────────────────────────────────────────────

    pub fn health_reports(&self) -> Vec<HealthReport> {
        self.lock().health_reports.clone()
    }

    pub fn load_reports(&self) -> Vec<Vec<(String, i64)>> {
        self.lock().load_reports.clone()
    }

    pub fn resolve_calls(&self) -> u64 {
        self.lock().resolve_calls
    }
}

fn page_of<T: Clone>(items: &[T], continuation: Option<&str>, page_size: usize) -> Page<T> {
    let offset: usize = continuation.and_then(|c| c.parse().ok()).unwrap_or(0);
    if page_size == 0 || offset + page_size >= items.len() {
        return Page {
            items: items.get(offset..).unwrap_or_default().to_vec(),
            continuation: None,
        };
    }
    Page {
        items: items[offset..offset + page_size].to_vec(),
        continuation: Some((offset + page_size).to_string()),
    }
}

#[async_trait]
impl PlatformClient for InMemoryPlatform {
    async fn service_exists(
        &self,
        service: &str,
        partition: Option<Uuid>,
    ) -> PlatformResult<bool> {
        if let Some(fault) = self.take_fault("service_exists") {
            return Err(fault);
        }
        let state = self.lock();
        let service_known = state.services.contains(service);
        let partition_known = partition.map_or(true, |p| state.partitions.contains_key(&p));
        Ok(service_known && partition_known)
    }

    async fn find_partition(&self, partition: Uuid) -> PlatformResult<Option<Partition>> {
        if let Some(fault) = self.take_fault("find_partition") {
            return Err(fault);
        }
        Ok(self.lock().partitions.get(&partition).cloned())
    }

    async fn resolve_endpoint(
        &self,
        service: &str,
        _key: &PartitionKey,
    ) -> PlatformResult<Vec<ResolvedEndpoint>> {
        if let Some(fault) = self.take_fault("resolve_endpoint") {
            return Err(fault);
        }
        let mut state = self.lock();
        state.resolve_calls += 1;
        Ok(state.endpoints.get(service).cloned().unwrap_or_default())
    }

    async fn report_partition_health(
        &self,
        partition: Uuid,
        source: &str,
        property: &str,
        state: HealthState,
        description: &str,
        _ttl: Duration,
    ) -> PlatformResult<()> {
        if let Some(fault) = self.take_fault("report_partition_health") {
            return Err(fault);
        }
        self.lock().health_reports.push(HealthReport {
            partition,
            source: source.to_string(),
            property: property.to_string(),
            state,
            description: description.to_string(),
        });
        Ok(())
    }

    async fn report_load(&self, metrics: &[(String, i64)]) -> PlatformResult<()> {
        if let Some(fault) = self.take_fault("report_load") {
            return Err(fault);
        }
        self.lock().load_reports.push(metrics.to_vec());
        Ok(())
    }

    async fn cluster_health(&self, _timeout: Duration) -> PlatformResult<ClusterHealth> {
        if let Some(fault) = self.take_fault("cluster_health") {
            return Err(fault);
        }
        self.lock()
            .cluster
            .clone()
            .ok_or_else(|| PlatformError::NotFound("cluster health not seeded".into()))
    }

    async fn partition_load(&self, partition: Uuid) -> PlatformResult<PartitionLoad> {
        if let Some(fault) = self.take_fault("partition_load") {
            return Err(fault);
        }
        self.lock()
            .partition_loads
            .get(&partition)
            .cloned()
            .ok_or_else(|| PlatformError::NotFound(format!("partition {partition}")))
    }

    async fn replica_load(
        &self,
        partition: Uuid,
        replica: i64,
    ) -> PlatformResult<Vec<LoadReport>> {
        if let Some(fault) = self.take_fault("replica_load") {
            return Err(fault);
        }
        Ok(self
            .lock()
            .replica_loads
            .get(&(partition, replica))
            .cloned()
            .unwrap_or_default())
    }

    async fn app_load(&self, application: &str) -> PlatformResult<Vec<LoadReport>> {
        if let Some(fault) = self.take_fault("app_load") {
            return Err(fault);
        }
        self.lock()
            .app_loads
            .get(application)
            .cloned()
            .ok_or_else(|| PlatformError::NotFound(format!("application {application}")))
    }

    async fn partition_list(
        &self,
        service: &str,
        continuation: Option<&str>,
    ) -> PlatformResult<Page<Partition>> {
        if let Some(fault) = self.take_fault("partition_list") {
            return Err(fault);
        }
        let state = self.lock();
        let Some(partitions) = state.service_partitions.get(service) else {
            return Err(PlatformError::NotFound(format!("service {service}")));
        };
        Ok(page_of(partitions, continuation, state.page_size))
    }

    async fn replica_list(
        &self,
        partition: Uuid,
        continuation: Option<&str>,
    ) -> PlatformResult<Page<Replica>> {
        if let Some(fault) = self.take_fault("replica_list") {
            return Err(fault);
        }
        let state = self.lock();
        let Some(replicas) = state.replicas.get(&partition) else {
            return Err(PlatformError::NotFound(format!("partition {partition}")));
        };
        Ok(page_of(replicas, continuation, state.page_size))
    }
}

//! The abstract platform client.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use gridwatch_core::HealthState;

use crate::types::{
    ClusterHealth, LoadReport, Page, Partition, PartitionKey, PartitionLoad, Replica,
    ResolvedEndpoint,
};

/// Result type alias for platform calls.
pub type PlatformResult<T> = Result<T, PlatformError>;

/// Errors surfaced by the platform.
#[derive(Debug, Clone, Error)]
pub enum PlatformError {
    #[error("platform call timed out")]
    Timeout,

    #[error("transient platform fault: {0}")]
    Transient(String),

    #[error("platform client is closed")]
    Closed,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl PlatformError {
    /// Whether the fault should be retried (next tick, or within a paged
    /// call's retry budget).
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PlatformError::Timeout | PlatformError::Transient(_) | PlatformError::Closed
        )
    }
}

/// The host platform as the watchdog sees it.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Whether a service (optionally narrowed to a partition) exists.
    async fn service_exists(&self, service: &str, partition: Option<Uuid>)
        -> PlatformResult<bool>;

    /// Look up a partition by id. `None` means the target is gone.
    async fn find_partition(&self, partition: Uuid) -> PlatformResult<Option<Partition>>;

    /// Resolve the replica endpoints of a service for a partition key.
    async fn resolve_endpoint(
        &self,
        service: &str,
        key: &PartitionKey,
    ) -> PlatformResult<Vec<ResolvedEndpoint>>;

    /// Publish a health event against a partition.
    async fn report_partition_health(
        &self,
        partition: Uuid,
        source: &str,
        property: &str,
        state: HealthState,
        description: &str,
        ttl: Duration,
    ) -> PlatformResult<()>;

    /// Publish the watchdog's own load metrics.
    async fn report_load(&self, metrics: &[(String, i64)]) -> PlatformResult<()>;

    /// Cluster-wide health roll-up.
    async fn cluster_health(&self, timeout: Duration) -> PlatformResult<ClusterHealth>;

    /// Load reported by one partition.
    async fn partition_load(&self, partition: Uuid) -> PlatformResult<PartitionLoad>;

    /// Load reported by one replica.
    async fn replica_load(&self, partition: Uuid, replica: i64)
        -> PlatformResult<Vec<LoadReport>>;

    /// Load aggregated for an application.
    async fn app_load(&self, application: &str) -> PlatformResult<Vec<LoadReport>>;

    /// One page of a service's partitions.
    async fn partition_list(
        &self,
        service: &str,
        continuation: Option<&str>,
    ) -> PlatformResult<Page<Partition>>;

    /// One page of a partition's replicas.
    async fn replica_list(
        &self,
        partition: Uuid,
        continuation: Option<&str>,
    ) -> PlatformResult<Page<Replica>>;
}

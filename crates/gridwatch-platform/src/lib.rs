//! gridwatch-platform — the host-platform client abstraction.
//!
//! The watchdog talks to its hosting platform (partition enumeration,
//! endpoint resolution, health and load reporting) exclusively through the
//! `PlatformClient` trait. The process-global handle supports atomic
//! refresh: concurrent refreshers race through a compare-and-swap and the
//! losers drop their candidate client.

pub mod client;
pub mod handle;
pub mod memory;
pub mod types;

pub use client::{PlatformClient, PlatformError, PlatformResult};
pub use handle::PlatformHandle;
pub use memory::InMemoryPlatform;
pub use types::{
    ClusterHealth, EndpointRole, EntityHealth, Listener, LoadReport, Page, Partition,
    PartitionKey, PartitionKind, PartitionLoad, PartitionStatus, Replica, ReplicaStatus,
    ResolvedEndpoint,
};

//! Platform-facing domain types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use gridwatch_core::HealthState;

/// A shard of a service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Partition {
    pub id: Uuid,
    pub kind: PartitionKind,
    pub status: PartitionStatus,
}

impl Partition {
    /// The resolution key derived from the partition kind.
    pub fn key(&self) -> PartitionKey {
        match &self.kind {
            PartitionKind::Singleton => PartitionKey::None,
            PartitionKind::Int64Range { low, .. } => PartitionKey::Int64(*low),
            PartitionKind::Named { name } => PartitionKey::Named(name.clone()),
        }
    }
}

/// How a partition's endpoints are resolved.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PartitionKind {
    Singleton,
    Int64Range { low: i64, high: i64 },
    Named { name: String },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PartitionStatus {
    Ready,
    NotReady,
}

/// The key passed to endpoint resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum PartitionKey {
    None,
    Int64(i64),
    Named(String),
}

/// A running copy of a partition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Replica {
    pub id: i64,
    pub role: EndpointRole,
    pub status: ReplicaStatus,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReplicaStatus {
    Ready,
    Down,
}

/// Role of a resolved replica endpoint.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EndpointRole {
    Primary,
    Secondary,
    Stateless,
}

/// One named listener exposed by a replica.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Listener {
    pub name: String,
    pub address: String,
}

/// A replica's resolved endpoint: its role plus its listener multi-map,
/// in listener registration order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResolvedEndpoint {
    pub role: EndpointRole,
    pub listeners: Vec<Listener>,
}

impl ResolvedEndpoint {
    /// Address of the named listener, or the first listener when no name
    /// is requested.
    pub fn listener_address(&self, name: Option<&str>) -> Option<&str> {
        match name {
            Some(name) => self
                .listeners
                .iter()
                .find(|l| l.name == name)
                .map(|l| l.address.as_str()),
            None => self.listeners.first().map(|l| l.address.as_str()),
        }
    }
}

/// One load-metric observation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoadReport {
    pub name: String,
    pub value: f64,
}

/// Load reported by a partition, split by replica role.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PartitionLoad {
    pub primary: Vec<LoadReport>,
    pub secondary: Vec<LoadReport>,
}

/// One page of a continuation-token enumeration.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub continuation: Option<String>,
}

/// Aggregate health of one named entity (application or node).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntityHealth {
    pub name: String,
    pub state: HealthState,
}

/// Cluster-wide health roll-up.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClusterHealth {
    pub aggregated: HealthState,
    pub applications: Vec<EntityHealth>,
    pub nodes: Vec<EntityHealth>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_key_follows_kind() {
        let singleton = Partition {
            id: Uuid::new_v4(),
            kind: PartitionKind::Singleton,
            status: PartitionStatus::Ready,
        };
        assert_eq!(singleton.key(), PartitionKey::None);

        let ranged = Partition {
            id: Uuid::new_v4(),
            kind: PartitionKind::Int64Range { low: -5, high: 100 },
            status: PartitionStatus::Ready,
        };
        assert_eq!(ranged.key(), PartitionKey::Int64(-5));

        let named = Partition {
            id: Uuid::new_v4(),
            kind: PartitionKind::Named {
                name: "shard-a".to_string(),
            },
            status: PartitionStatus::Ready,
        };
        assert_eq!(named.key(), PartitionKey::Named("shard-a".to_string()));
    }

    #[test]
    fn listener_selection() {
        let endpoint = ResolvedEndpoint {
            role: EndpointRole::Primary,
            listeners: vec![
                Listener {
                    name: String::new(),
                    address: "http://10.0.0.1:8080".to_string(),
                },
                Listener {
                    name: "admin".to_string(),
                    address: "http://10.0.0.1:9090".to_string(),
                },
            ],
        };
        assert_eq!(
            endpoint.listener_address(None),
            Some("http://10.0.0.1:8080")
        );
        assert_eq!(
            endpoint.listener_address(Some("admin")),
            Some("http://10.0.0.1:9090")
        );
        assert_eq!(endpoint.listener_address(Some("missing")), None);
    }
}

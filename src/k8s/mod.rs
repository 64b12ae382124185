//! Cluster driver.
//!
//! Node and pod level operations against the cluster API, behind a trait so
//! the drain and migration logic can be exercised against substitutes. Nodes
//! and pods are always re-fetched from a live list call; nothing here is
//! cached across runs, because cluster topology may change between triggers.

mod driver;

pub use driver::KubeDriver;

use async_trait::async_trait;

use crate::error::DriverError;

/// A cluster node as observed in a live list call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeRef {
    pub name: String,
    /// The node pool this node belongs to, when the provider labels it.
    pub pool: Option<String>,
    pub schedulable: bool,
}

/// A workload unit bound to a node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PodRef {
    pub name: String,
    pub namespace: String,
    pub node_name: String,
}

/// Result of one eviction attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EvictOutcome {
    Evicted,
    /// Rejected by a disruption budget or similar admission control.
    /// Non-fatal; the pod is retried on a later migration cycle.
    Denied(String),
    /// The pod disappeared before the eviction was created.
    NotFound,
}

/// Interface to the cluster API server.
#[async_trait]
pub trait ClusterDriver: Send + Sync {
    /// Full node snapshot at call time.
    async fn list_nodes(&self) -> Result<Vec<NodeRef>, DriverError>;

    /// Mark the node unschedulable and taint it `NoSchedule`. Idempotent:
    /// cordoning an already-cordoned node succeeds.
    async fn cordon(&self, node_name: &str) -> Result<(), DriverError>;

    /// Remove the cordon taint and restore schedulability.
    async fn uncordon(&self, node_name: &str) -> Result<(), DriverError>;

    /// Pods currently bound to the node, minus the excluded namespaces.
    /// Which namespaces to exclude is the caller's policy.
    async fn list_pods_on_node(&self, node_name: &str, exclude_namespaces: &[String]) -> Result<Vec<PodRef>, DriverError>;

    /// Evict one pod with the given grace period.
    async fn evict(&self, pod: &PodRef, grace_period_seconds: u32) -> Result<EvictOutcome, DriverError>;
}

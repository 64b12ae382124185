//! Node drain coordination.
//!
//! Draining one node walks a fixed sequence: cordon the node so evicted pods
//! cannot be rescheduled onto it, evict every non-excluded pod, then confirm
//! the node actually emptied. A single stuck workload never blocks eviction
//! of the rest; every discovered pod ends the pass with exactly one recorded
//! outcome.

use std::time::Duration;

use crate::error::DriverError;
use crate::k8s::{ClusterDriver, EvictOutcome, NodeRef, PodRef};
use crate::retry::{retry_with_backoff, RetryConfig};

/// Terminal disposition of one node drain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrainStatus {
    /// Every non-excluded pod was evicted and the node emptied.
    Drained,
    /// The node still carries workload: a cordon failure, denied or failed
    /// evictions, or pods that outlived the verification budget.
    PartiallyDrained,
}

/// Per-node drain report consumed by the orchestrator.
#[derive(Clone, Debug)]
pub struct DrainOutcome {
    pub node: NodeRef,
    pub status: DrainStatus,
    pub evicted: Vec<PodRef>,
    pub failed: Vec<(PodRef, String)>,
    /// Node-level failure (cordon or pod listing), as opposed to the per-pod
    /// failures above.
    pub error: Option<String>,
}

impl DrainOutcome {
    fn node_error(node: &NodeRef, error: String) -> Self {
        Self {
            node: node.clone(),
            status: DrainStatus::PartiallyDrained,
            evicted: Vec::new(),
            failed: Vec::new(),
            error: Some(error),
        }
    }
}

/// Tuning for one drain pass.
#[derive(Clone, Debug)]
pub struct DrainSettings {
    /// Grace period handed through unmodified to every eviction; this is the
    /// caller's declared tolerance for in-pod shutdown.
    pub grace_period_seconds: u32,
    pub excluded_namespaces: Vec<String>,
    /// Interval between pod re-lists while waiting for the node to empty.
    pub verify_interval: Duration,
    /// Budget for the node to empty before it is declared partially drained.
    pub verify_timeout: Duration,
    pub retry: RetryConfig,
}

/// Applies the cordon/evict/verify sequence to one node at a time.
pub struct DrainCoordinator<'a, D> {
    driver: &'a D,
    settings: &'a DrainSettings,
}

impl<'a, D: ClusterDriver> DrainCoordinator<'a, D> {
    pub fn new(driver: &'a D, settings: &'a DrainSettings) -> Self {
        Self { driver, settings }
    }

    /// Drain one node, reporting exactly one outcome per discovered pod.
    #[tracing::instrument(level = "debug", skip(self, node), fields(node = %node.name))]
    pub async fn drain_node(&self, node: &NodeRef) -> DrainOutcome {
        // Evicting pods from a schedulable node risks immediate rescheduling
        // back onto it, so a failed cordon finalizes the node untouched.
        if let Err(err) = self.cordon_with_retry(&node.name).await {
            tracing::error!(node = %node.name, error = %err, "error cordoning node, skipping eviction");
            return DrainOutcome::node_error(node, format!("cordon failed: {}", err));
        }
        tracing::info!(node = %node.name, "node cordoned");

        let pods = match self.list_pods_with_retry(&node.name).await {
            Ok(pods) => pods,
            Err(err) => {
                tracing::error!(node = %node.name, error = %err, "error listing pods on node");
                return DrainOutcome::node_error(node, format!("pod listing failed: {}", err));
            }
        };
        if pods.is_empty() {
            tracing::info!(node = %node.name, "no pods to evict, node drained");
            return DrainOutcome {
                node: node.clone(),
                status: DrainStatus::Drained,
                evicted: Vec::new(),
                failed: Vec::new(),
                error: None,
            };
        }

        let mut evicted = Vec::with_capacity(pods.len());
        let mut failed = Vec::new();
        for pod in pods {
            match self.driver.evict(&pod, self.settings.grace_period_seconds).await {
                Ok(EvictOutcome::Evicted) => {
                    tracing::info!(node = %pod.node_name, namespace = %pod.namespace, pod = %pod.name, "pod evicted");
                    evicted.push(pod);
                }
                Ok(EvictOutcome::NotFound) => {
                    tracing::debug!(node = %pod.node_name, namespace = %pod.namespace, pod = %pod.name, "pod already gone");
                    evicted.push(pod);
                }
                Ok(EvictOutcome::Denied(reason)) => {
                    tracing::warn!(node = %pod.node_name, namespace = %pod.namespace, pod = %pod.name, reason = %reason, "eviction denied");
                    failed.push((pod, reason));
                }
                Err(err) => {
                    tracing::error!(node = %pod.node_name, namespace = %pod.namespace, pod = %pod.name, error = %err, "error evicting pod");
                    failed.push((pod, err.to_string()));
                }
            }
        }

        let status = if failed.is_empty() {
            self.verify_empty(&node.name).await
        } else {
            DrainStatus::PartiallyDrained
        };
        DrainOutcome {
            node: node.clone(),
            status,
            evicted,
            failed,
            error: None,
        }
    }

    /// Wait for the node's accepted evictions to finish terminating, bounded
    /// by the verification budget.
    async fn verify_empty(&self, node_name: &str) -> DrainStatus {
        let deadline = tokio::time::Instant::now() + self.settings.verify_timeout;
        loop {
            match self
                .driver
                .list_pods_on_node(node_name, &self.settings.excluded_namespaces)
                .await
            {
                Ok(remaining) if remaining.is_empty() => {
                    tracing::info!(node = %node_name, "node drained");
                    return DrainStatus::Drained;
                }
                Ok(remaining) => {
                    tracing::debug!(node = %node_name, remaining = remaining.len(), "pods still terminating");
                }
                Err(err) => {
                    tracing::warn!(node = %node_name, error = %err, "error re-listing pods during verification");
                }
            }
            if tokio::time::Instant::now() + self.settings.verify_interval > deadline {
                tracing::warn!(node = %node_name, "node still carries pods after verification budget");
                return DrainStatus::PartiallyDrained;
            }
            tokio::time::sleep(self.settings.verify_interval).await;
        }
    }

    async fn cordon_with_retry(&self, node_name: &str) -> Result<(), DriverError> {
        let driver = self.driver;
        retry_with_backoff(&self.settings.retry, "cordon", DriverError::is_transient, || {
            driver.cordon(node_name)
        })
        .await
    }

    async fn list_pods_with_retry(&self, node_name: &str) -> Result<Vec<PodRef>, DriverError> {
        let driver = self.driver;
        let excluded = &self.settings.excluded_namespaces;
        retry_with_backoff(&self.settings.retry, "list_pods_on_node", DriverError::is_transient, || {
            driver.list_pods_on_node(node_name, excluded)
        })
        .await
    }
}

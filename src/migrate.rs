//! Migration orchestration.
//!
//! The top-level state machine for one migration cycle: scale the destination
//! pool up by one, drain every node of the source pool, finalize, and (when
//! explicitly enabled) scale the source pool down after a fully completed
//! evacuation. Each invocation is stateless and recomputes everything from
//! live cluster and cloud state, so repeated periodic triggers converge
//! gradually instead of jumping.

use std::time::Duration;

use tokio::sync::Mutex;

use crate::drain::{DrainCoordinator, DrainOutcome, DrainSettings, DrainStatus};
use crate::error::{DriverError, MigrationError};
use crate::k8s::{ClusterDriver, NodeRef};
use crate::retry::{retry_with_backoff, RetryConfig};
use crate::scaler::{PoolIdentity, PoolScaler, ScaleOutcome};

/// Identity of the managed cluster a migration runs against.
#[derive(Clone, Debug)]
pub struct ClusterIdentity {
    pub subscription_id: String,
    pub resource_group: String,
    pub cluster_name: String,
}

/// One migration invocation's input.
#[derive(Clone, Debug)]
pub struct MigrationRequest {
    pub cluster: ClusterIdentity,
    pub source_pool: String,
    pub destination_pool: String,
    pub grace_period_seconds: u32,
}

impl MigrationRequest {
    pub fn source_identity(&self) -> PoolIdentity {
        self.pool_identity(&self.source_pool)
    }

    pub fn destination_identity(&self) -> PoolIdentity {
        self.pool_identity(&self.destination_pool)
    }

    fn pool_identity(&self, pool_name: &str) -> PoolIdentity {
        PoolIdentity {
            subscription_id: self.cluster.subscription_id.clone(),
            resource_group: self.cluster.resource_group.clone(),
            cluster_name: self.cluster.cluster_name.clone(),
            pool_name: pool_name.to_string(),
        }
    }
}

/// Overall disposition of one migration cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MigrationStatus {
    /// Every source node drained fully.
    Completed,
    /// At least one node drained and at least one did not.
    PartiallyCompleted,
    /// No node drained, or the run aborted before draining.
    Failed,
}

/// The terminal artifact of one migration cycle. Never persisted.
#[derive(Clone, Debug)]
pub struct MigrationResult {
    pub status: MigrationStatus,
    /// Destination count the run scaled to, once the resize was submitted.
    pub scaled_destination_to: Option<i32>,
    pub drained: Vec<DrainOutcome>,
    pub error: Option<String>,
}

impl MigrationResult {
    fn failed(scaled_destination_to: Option<i32>, error: String) -> Self {
        Self {
            status: MigrationStatus::Failed,
            scaled_destination_to,
            drained: Vec::new(),
            error: Some(error),
        }
    }
}

/// Orchestrator tuning knobs.
#[derive(Clone, Debug)]
pub struct OrchestratorSettings {
    pub scale_poll_interval: Duration,
    pub scale_timeout: Duration,
    pub verify_interval: Duration,
    pub verify_timeout: Duration,
    pub excluded_namespaces: Vec<String>,
    pub retry: RetryConfig,
    /// Scale the source pool down by one after a fully completed run.
    pub scale_down_source: bool,
}

/// The top-level migration state machine.
///
/// Both collaborators are injected at construction, which keeps the in-flight
/// guard in one place and makes test substitution of either side trivial.
pub struct Orchestrator<S, D> {
    scaler: S,
    driver: D,
    settings: OrchestratorSettings,
    /// One active run per orchestrator, and therefore per pool pair: two
    /// concurrent scale submissions or drains of the same node would produce
    /// conflicting remote state.
    in_flight: Mutex<()>,
}

impl<S: PoolScaler, D: ClusterDriver> Orchestrator<S, D> {
    pub fn new(scaler: S, driver: D, settings: OrchestratorSettings) -> Self {
        Self {
            scaler,
            driver,
            settings,
            in_flight: Mutex::new(()),
        }
    }

    pub fn scaler(&self) -> &S {
        &self.scaler
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Run one full migration cycle. Refuses to overlap a run still in
    /// flight rather than queueing behind it.
    pub async fn run(&self, request: &MigrationRequest) -> Result<MigrationResult, MigrationError> {
        let _guard = self.in_flight.try_lock().map_err(|_| MigrationError::AlreadyRunning)?;
        tracing::info!(
            cluster = %request.cluster.cluster_name,
            source = %request.source_pool,
            destination = %request.destination_pool,
            "starting migration cycle",
        );
        let result = self.execute(request).await;
        match result.status {
            MigrationStatus::Completed => tracing::info!(drained = result.drained.len(), "migration cycle completed"),
            MigrationStatus::PartiallyCompleted => {
                tracing::warn!(drained = result.drained.len(), "migration cycle partially completed")
            }
            MigrationStatus::Failed => tracing::error!(error = ?result.error, "migration cycle failed"),
        }
        Ok(result)
    }

    async fn execute(&self, request: &MigrationRequest) -> MigrationResult {
        // ScalingDestination: grow capacity before any pod is disturbed.
        // Failure here is safely retryable by the next trigger, as nothing
        // has touched the source side yet.
        let destination = request.destination_identity();
        tracing::info!(pool = %destination.pool_name, "scaling destination pool");
        let target = match self.scale_destination(&destination).await {
            Ok(target) => target,
            Err(reason) => {
                tracing::error!(pool = %destination.pool_name, error = %reason, "error scaling destination pool");
                return MigrationResult::failed(None, reason);
            }
        };

        // EnumeratingSourceNodes: an empty source pool is not an error, it
        // means the migration has already converged.
        tracing::info!(pool = %request.source_pool, "enumerating source pool nodes");
        let nodes = match self.source_nodes(request).await {
            Ok(nodes) => nodes,
            Err(reason) => {
                tracing::error!(pool = %request.source_pool, error = %reason, "error enumerating source pool nodes");
                return MigrationResult::failed(Some(target), reason);
            }
        };
        if nodes.is_empty() {
            tracing::info!(pool = %request.source_pool, "source pool has no nodes, nothing to drain");
            return MigrationResult {
                status: MigrationStatus::Completed,
                scaled_destination_to: Some(target),
                drained: Vec::new(),
                error: None,
            };
        }

        // DrainingNodes: strictly sequential so the destination pool absorbs
        // one node's workload before the next node is disturbed.
        let drain_settings = DrainSettings {
            grace_period_seconds: request.grace_period_seconds,
            excluded_namespaces: self.settings.excluded_namespaces.clone(),
            verify_interval: self.settings.verify_interval,
            verify_timeout: self.settings.verify_timeout,
            retry: self.settings.retry.clone(),
        };
        let coordinator = DrainCoordinator::new(&self.driver, &drain_settings);
        let mut drained = Vec::with_capacity(nodes.len());
        for node in &nodes {
            tracing::info!(node = %node.name, pool = %request.source_pool, "draining node");
            let outcome = coordinator.drain_node(node).await;
            tracing::info!(
                node = %node.name,
                status = ?outcome.status,
                evicted = outcome.evicted.len(),
                failed = outcome.failed.len(),
                "node drain finished",
            );
            drained.push(outcome);
        }

        // Finalizing.
        let fully_drained = drained.iter().filter(|outcome| outcome.status == DrainStatus::Drained).count();
        let status = if fully_drained == drained.len() {
            MigrationStatus::Completed
        } else if fully_drained > 0 {
            MigrationStatus::PartiallyCompleted
        } else {
            MigrationStatus::Failed
        };
        let mut result = MigrationResult {
            status,
            scaled_destination_to: Some(target),
            drained,
            error: None,
        };

        // Source scale-down is gated twice: on a fully completed evacuation
        // and on the operator's explicit opt-in. A failure here is recorded
        // but does not demote the migration, which already succeeded.
        if result.status == MigrationStatus::Completed && self.settings.scale_down_source {
            if let Err(reason) = self.scale_down_source(&request.source_identity()).await {
                tracing::error!(pool = %request.source_pool, error = %reason, "error scaling source pool down");
                result.error = Some(format!("source scale-down failed: {}", reason));
            }
        }
        result
    }

    /// Scale the destination pool up by one and wait for the resize to
    /// settle, returning the target count.
    async fn scale_destination(&self, pool: &PoolIdentity) -> Result<i32, String> {
        let (target, mut operation) = self
            .scaler
            .scale_up(pool)
            .await
            .map_err(|err| format!("scale submission failed: {}", err))?;
        match self
            .scaler
            .await_completion(&mut operation, self.settings.scale_poll_interval, self.settings.scale_timeout)
            .await
        {
            Ok(ScaleOutcome::Succeeded) => {
                tracing::info!(pool = %pool.pool_name, count = target, "destination pool scaled");
                Ok(target)
            }
            Ok(ScaleOutcome::Failed(reason)) => Err(format!("scale operation failed: {}", reason)),
            Ok(ScaleOutcome::TimedOut) => Err("scale operation timed out".to_string()),
            Err(err) => Err(format!("error polling scale operation: {}", err)),
        }
    }

    /// List the cluster's nodes and keep those belonging to the source pool,
    /// in provider order.
    async fn source_nodes(&self, request: &MigrationRequest) -> Result<Vec<NodeRef>, String> {
        let driver = &self.driver;
        let nodes = retry_with_backoff(&self.settings.retry, "list_nodes", DriverError::is_transient, || {
            driver.list_nodes()
        })
        .await
        .map_err(|err| format!("node enumeration failed: {}", err))?;
        let matched: Vec<NodeRef> = nodes
            .into_iter()
            .filter(|node| node.pool.as_deref() == Some(request.source_pool.as_str()))
            .collect();
        for node in &matched {
            tracing::debug!(node = %node.name, schedulable = node.schedulable, "source pool node matched");
        }
        Ok(matched)
    }

    /// Submit a single-decrement of the source pool and wait for it.
    async fn scale_down_source(&self, pool: &PoolIdentity) -> Result<(), String> {
        let operation = self
            .scaler
            .scale_down(pool)
            .await
            .map_err(|err| format!("scale submission failed: {}", err))?;
        let mut operation = match operation {
            Some(operation) => operation,
            // Already empty; nothing to reclaim.
            None => return Ok(()),
        };
        tracing::info!(pool = %pool.pool_name, "scaling source pool down");
        match self
            .scaler
            .await_completion(&mut operation, self.settings.scale_poll_interval, self.settings.scale_timeout)
            .await
        {
            Ok(ScaleOutcome::Succeeded) => {
                tracing::info!(pool = %pool.pool_name, "source pool scaled down");
                Ok(())
            }
            Ok(ScaleOutcome::Failed(reason)) => Err(format!("scale operation failed: {}", reason)),
            Ok(ScaleOutcome::TimedOut) => Err("scale operation timed out".to_string()),
            Err(err) => Err(format!("error polling scale operation: {}", err)),
        }
    }
}

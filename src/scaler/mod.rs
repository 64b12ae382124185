//! Pool scaling.
//!
//! Resizes of managed node pools are inherently asynchronous and may take
//! minutes to settle. Submission returns an operation handle which is polled
//! at a fixed interval under an explicit wait budget, so a stuck remote
//! operation can never block the workflow indefinitely.

pub mod aks;

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::error::ScaleError;

/// Identity of a scalable node pool. Never mutated after construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolIdentity {
    pub subscription_id: String,
    pub resource_group: String,
    pub cluster_name: String,
    pub pool_name: String,
}

/// The requested scaling mode.
///
/// A manual count and autoscale bounds are mutually exclusive by
/// construction; submitting one can never silently carry the other.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScaleMode {
    /// Pin the pool to a fixed node count.
    Manual { count: i32 },
    /// Hand the pool to the cluster autoscaler within the given bounds.
    AutoScale { min: i32, max: i32 },
}

/// One scale attempt against a pool. Created per attempt, consumed once.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScaleRequest {
    pub pool: PoolIdentity,
    pub mode: ScaleMode,
}

impl ScaleRequest {
    /// Validate scale parameters before anything is submitted remotely.
    pub fn validate(&self) -> Result<(), ScaleError> {
        match self.mode {
            ScaleMode::Manual { count } if count < 0 => Err(ScaleError::InvalidArgument(format!(
                "desired count must be non-negative, got {}",
                count
            ))),
            ScaleMode::AutoScale { min, max } if min < 0 || min > max => Err(ScaleError::InvalidArgument(format!(
                "autoscale bounds must satisfy 0 <= min <= max, got min={} max={}",
                min, max
            ))),
            _ => Ok(()),
        }
    }
}

/// Status of an in-flight resize as last observed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScaleStatus {
    Running,
    Succeeded,
    Failed(String),
}

/// Terminal result of waiting on a resize.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScaleOutcome {
    Succeeded,
    Failed(String),
    TimedOut,
}

/// An in-flight asynchronous resize. Created on submission, polled until
/// terminal, then discarded.
#[derive(Clone, Debug)]
pub struct ScaleOperation {
    pub pool: PoolIdentity,
    /// Opaque operation handle owned by the scaler implementation.
    pub handle: String,
    pub status: ScaleStatus,
    pub last_polled_at: Option<Instant>,
}

/// Interface to the cloud node-pool control plane.
#[async_trait]
pub trait PoolScaler: Send + Sync {
    /// Submit a resize request, returning the in-flight operation.
    async fn submit_scale(&self, request: &ScaleRequest) -> Result<ScaleOperation, ScaleError>;

    /// Re-query operation status. Idempotent and free of side effects.
    async fn poll(&self, operation: &mut ScaleOperation) -> Result<ScaleStatus, ScaleError>;

    /// Current node count of the pool.
    async fn current_count(&self, pool: &PoolIdentity) -> Result<i32, ScaleError>;

    /// Wait for the operation to settle, re-querying at `poll_interval`,
    /// bounded by `timeout`. Never polls faster than the interval and never
    /// blocks past the budget.
    async fn await_completion(
        &self, operation: &mut ScaleOperation, poll_interval: Duration, timeout: Duration,
    ) -> Result<ScaleOutcome, ScaleError> {
        let wait = async {
            loop {
                let status = self.poll(operation).await?;
                tracing::debug!(
                    pool = %operation.pool.pool_name,
                    status = ?status,
                    polled_at = ?operation.last_polled_at,
                    "scale operation polled",
                );
                match status {
                    ScaleStatus::Succeeded => return Ok(ScaleOutcome::Succeeded),
                    ScaleStatus::Failed(reason) => return Ok(ScaleOutcome::Failed(reason)),
                    ScaleStatus::Running => tokio::time::sleep(poll_interval).await,
                }
            }
        };
        let result = tokio::time::timeout(timeout, wait).await;
        match result {
            Ok(outcome) => outcome,
            Err(_elapsed) => {
                tracing::warn!(pool = %operation.pool.pool_name, timeout = ?timeout, "scale operation exceeded wait budget");
                Ok(ScaleOutcome::TimedOut)
            }
        }
    }

    /// Submit a single-increment resize of the pool, returning the target
    /// count alongside the in-flight operation.
    async fn scale_up(&self, pool: &PoolIdentity) -> Result<(i32, ScaleOperation), ScaleError> {
        let target = self.current_count(pool).await? + 1;
        let request = ScaleRequest {
            pool: pool.clone(),
            mode: ScaleMode::Manual { count: target },
        };
        let operation = self.submit_scale(&request).await?;
        Ok((target, operation))
    }

    /// Submit a single-decrement resize, refusing to go below zero.
    /// Returns `None` when the pool is already empty.
    async fn scale_down(&self, pool: &PoolIdentity) -> Result<Option<ScaleOperation>, ScaleError> {
        let count = self.current_count(pool).await?;
        if count <= 0 {
            tracing::warn!(pool = %pool.pool_name, "node pool has no nodes to remove");
            return Ok(None);
        }
        let request = ScaleRequest {
            pool: pool.clone(),
            mode: ScaleMode::Manual { count: count - 1 },
        };
        self.submit_scale(&request).await.map(Some)
    }
}

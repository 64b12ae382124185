//! Error abstractions for the migration workflow.
//!
//! Each collaborator reports typed errors so callers can distinguish retryable
//! from fatal conditions instead of a uniform failure signal.

use thiserror::Error;

/// Pool scaling error variants.
#[derive(Debug, Error)]
pub enum ScaleError {
    /// The named node pool does not exist. Fatal for the current run; the
    /// next scheduled trigger may retry if the pool reappears.
    #[error("node pool {0} not found")]
    NotFound(String),
    /// The scale parameters are invalid. Configuration bug, never retried.
    #[error("invalid scale parameters: {0}")]
    InvalidArgument(String),
    /// The cloud control plane rejected or failed the call.
    #[error("pool scaling API error: {0}")]
    Api(anyhow::Error),
}

/// Cluster API error variants.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The cluster API server could not be reached.
    #[error("cluster API unreachable: {0}")]
    Unreachable(#[source] kube::Error),
    /// The cluster API server rejected the call.
    #[error("cluster API error: {0}")]
    Api(#[source] kube::Error),
}

impl DriverError {
    /// Whether the operation is worth retrying with backoff. Connectivity
    /// failures and server-side 5xx responses are transient; everything else
    /// is surfaced to the caller as-is.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Unreachable(_) => true,
            Self::Api(kube::Error::Api(response)) => response.code >= 500,
            Self::Api(_) => false,
        }
    }
}

impl From<kube::Error> for DriverError {
    fn from(err: kube::Error) -> Self {
        // API rejections carry a status object; anything else means the
        // request never produced a server verdict.
        match err {
            kube::Error::Api(_) => Self::Api(err),
            _ => Self::Unreachable(err),
        }
    }
}

/// Migration run error variants.
///
/// Step-level failures are reported through `MigrationResult`, never as an
/// error; this type only covers conditions under which no run took place.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// A run against the same pool pair is still in flight.
    #[error("a migration for this pool pair is already in flight")]
    AlreadyRunning,
}

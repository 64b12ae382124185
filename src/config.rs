//! Runtime configuration.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::migrate::{ClusterIdentity, MigrationRequest, OrchestratorSettings};
use crate::retry::RetryConfig;

/// Interval between pod re-lists while waiting for a drained node to empty.
const VERIFY_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Runtime configuration data.
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    /// The server's logging config, which uses Rust's `env_logger` directives.
    pub rust_log: String,

    /// The subscription owning the target cluster.
    pub subscription_id: String,
    /// The resource group of the target cluster.
    pub resource_group: String,
    /// The name of the managed cluster.
    pub cluster_name: String,
    /// The node pool being evacuated.
    pub source_pool: String,
    /// The node pool receiving the workload.
    pub destination_pool: String,

    /// Grace period in seconds passed through to every pod eviction.
    #[serde(default = "Config::default_grace_period_seconds")]
    pub grace_period_seconds: u32,
    /// Seconds between scheduled migration runs.
    #[serde(default = "Config::default_trigger_interval_seconds")]
    pub trigger_interval_seconds: u64,
    /// Seconds between status polls of an in-flight pool resize.
    #[serde(default = "Config::default_scale_poll_interval_seconds")]
    pub scale_poll_interval_seconds: u64,
    /// Upper bound in seconds on waiting for one pool resize to settle.
    #[serde(default = "Config::default_scale_timeout_seconds")]
    pub scale_timeout_seconds: u64,
    /// Upper bound in seconds on waiting for a drained node to empty.
    #[serde(default = "Config::default_drain_verify_timeout_seconds")]
    pub drain_verify_timeout_seconds: u64,
    /// Namespaces whose pods are never evicted.
    #[serde(default = "Config::default_excluded_namespaces")]
    pub excluded_namespaces: Vec<String>,
    /// Scale the source pool down by one node after a fully completed
    /// migration. Off by default: destroying capacity is an explicit opt-in.
    #[serde(default)]
    pub scale_down_source: bool,

    /// Base URL of the cloud management endpoint.
    #[serde(default = "Config::default_management_endpoint")]
    pub management_endpoint: String,
    /// Bearer token presented to the management endpoint.
    pub management_token: String,
}

impl Config {
    /// Create a new config instance.
    ///
    /// Currently this routine just parses the runtime environment and builds
    /// the application config from that.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Result<Self> {
        envy::from_env().context("error building config from env")
    }

    /// The migration request this process is configured to drive.
    pub fn migration_request(&self) -> MigrationRequest {
        MigrationRequest {
            cluster: ClusterIdentity {
                subscription_id: self.subscription_id.clone(),
                resource_group: self.resource_group.clone(),
                cluster_name: self.cluster_name.clone(),
            },
            source_pool: self.source_pool.clone(),
            destination_pool: self.destination_pool.clone(),
            grace_period_seconds: self.grace_period_seconds,
        }
    }

    /// Orchestrator tuning derived from this config.
    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            scale_poll_interval: Duration::from_secs(self.scale_poll_interval_seconds),
            scale_timeout: Duration::from_secs(self.scale_timeout_seconds),
            verify_interval: VERIFY_POLL_INTERVAL,
            verify_timeout: Duration::from_secs(self.drain_verify_timeout_seconds),
            excluded_namespaces: self.excluded_namespaces.clone(),
            retry: RetryConfig::default(),
            scale_down_source: self.scale_down_source,
        }
    }

    fn default_grace_period_seconds() -> u32 {
        30
    }

    fn default_trigger_interval_seconds() -> u64 {
        60
    }

    fn default_scale_poll_interval_seconds() -> u64 {
        5
    }

    fn default_scale_timeout_seconds() -> u64 {
        900
    }

    fn default_drain_verify_timeout_seconds() -> u64 {
        60
    }

    fn default_excluded_namespaces() -> Vec<String> {
        vec!["kube-system".into()]
    }

    fn default_management_endpoint() -> String {
        "https://management.azure.com".into()
    }
}

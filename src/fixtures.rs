//! Test fixtures: in-memory substitutes for the two external collaborators.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::drain::DrainSettings;
use crate::error::{DriverError, ScaleError};
use crate::k8s::{ClusterDriver, EvictOutcome, NodeRef, PodRef};
use crate::migrate::{ClusterIdentity, MigrationRequest, OrchestratorSettings};
use crate::retry::RetryConfig;
use crate::scaler::{PoolIdentity, PoolScaler, ScaleMode, ScaleOperation, ScaleRequest, ScaleStatus};

/// A scripted Pool Scaler: per-pool counts plus a queue of poll statuses.
/// An exhausted queue polls `Succeeded`.
#[derive(Default)]
pub struct StubScaler {
    counts: Mutex<HashMap<String, i32>>,
    poll_statuses: Mutex<VecDeque<ScaleStatus>>,
    always_running: bool,
    submitted: Mutex<Vec<ScaleRequest>>,
}

impl StubScaler {
    pub fn new(counts: &[(&str, i32)]) -> Self {
        Self {
            counts: Mutex::new(counts.iter().map(|(name, count)| (name.to_string(), *count)).collect()),
            ..Default::default()
        }
    }

    pub fn with_poll_statuses(self, statuses: Vec<ScaleStatus>) -> Self {
        *self.poll_statuses.lock().unwrap() = statuses.into();
        self
    }

    /// Simulate a resize that never settles.
    pub fn stuck_running(mut self) -> Self {
        self.always_running = true;
        self
    }

    /// Every scale request submitted so far, in order.
    pub fn submitted(&self) -> Vec<ScaleRequest> {
        self.submitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl PoolScaler for StubScaler {
    async fn submit_scale(&self, request: &ScaleRequest) -> Result<ScaleOperation, ScaleError> {
        request.validate()?;
        let mut counts = self.counts.lock().unwrap();
        let count = counts
            .get_mut(&request.pool.pool_name)
            .ok_or_else(|| ScaleError::NotFound(request.pool.pool_name.clone()))?;
        if let ScaleMode::Manual { count: desired } = &request.mode {
            *count = *desired;
        }
        self.submitted.lock().unwrap().push(request.clone());
        Ok(ScaleOperation {
            pool: request.pool.clone(),
            handle: format!("op-{}", request.pool.pool_name),
            status: ScaleStatus::Running,
            last_polled_at: None,
        })
    }

    async fn poll(&self, operation: &mut ScaleOperation) -> Result<ScaleStatus, ScaleError> {
        let status = if self.always_running {
            ScaleStatus::Running
        } else {
            self.poll_statuses.lock().unwrap().pop_front().unwrap_or(ScaleStatus::Succeeded)
        };
        operation.status = status.clone();
        operation.last_polled_at = Some(tokio::time::Instant::now());
        Ok(status)
    }

    async fn current_count(&self, pool: &PoolIdentity) -> Result<i32, ScaleError> {
        self.counts
            .lock()
            .unwrap()
            .get(&pool.pool_name)
            .copied()
            .ok_or_else(|| ScaleError::NotFound(pool.pool_name.clone()))
    }
}

/// An in-memory Cluster Driver with injectable failures and a call log.
/// Successful evictions remove the pod, so verification observes the node
/// emptying, unless the pod is marked as lingering.
#[derive(Default)]
pub struct StubDriver {
    nodes: Mutex<Vec<NodeRef>>,
    pods: Mutex<HashMap<String, Vec<PodRef>>>,
    deny: HashSet<String>,
    linger: HashSet<String>,
    fail_cordon: HashSet<String>,
    fail_list_nodes: bool,
    calls: Mutex<Vec<String>>,
}

impl StubDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_node(mut self, name: &str, pool: &str) -> Self {
        self.nodes.get_mut().unwrap().push(node(name, pool));
        self
    }

    pub fn with_pod(mut self, node_name: &str, namespace: &str, name: &str) -> Self {
        self.pods.get_mut().unwrap().entry(node_name.to_string()).or_default().push(PodRef {
            name: name.to_string(),
            namespace: namespace.to_string(),
            node_name: node_name.to_string(),
        });
        self
    }

    /// Evictions of the named pod are rejected as budget violations.
    pub fn deny_eviction(mut self, pod_name: &str) -> Self {
        self.deny.insert(pod_name.to_string());
        self
    }

    /// The named pod accepts its eviction but never terminates.
    pub fn linger_after_evict(mut self, pod_name: &str) -> Self {
        self.linger.insert(pod_name.to_string());
        self
    }

    pub fn fail_cordon(mut self, node_name: &str) -> Self {
        self.fail_cordon.insert(node_name.to_string());
        self
    }

    pub fn fail_list_nodes(mut self) -> Self {
        self.fail_list_nodes = true;
        self
    }

    /// Every driver call so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|call| call.starts_with(prefix)).count()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ClusterDriver for StubDriver {
    async fn list_nodes(&self) -> Result<Vec<NodeRef>, DriverError> {
        self.record("list_nodes".to_string());
        if self.fail_list_nodes {
            return Err(injected_api_error());
        }
        Ok(self.nodes.lock().unwrap().clone())
    }

    async fn cordon(&self, node_name: &str) -> Result<(), DriverError> {
        self.record(format!("cordon:{}", node_name));
        if self.fail_cordon.contains(node_name) {
            return Err(injected_api_error());
        }
        Ok(())
    }

    async fn uncordon(&self, node_name: &str) -> Result<(), DriverError> {
        self.record(format!("uncordon:{}", node_name));
        Ok(())
    }

    async fn list_pods_on_node(&self, node_name: &str, exclude_namespaces: &[String]) -> Result<Vec<PodRef>, DriverError> {
        self.record(format!("list_pods:{}", node_name));
        Ok(self
            .pods
            .lock()
            .unwrap()
            .get(node_name)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|pod| !exclude_namespaces.contains(&pod.namespace))
            .collect())
    }

    async fn evict(&self, pod: &PodRef, grace_period_seconds: u32) -> Result<EvictOutcome, DriverError> {
        self.record(format!("evict:{}/{}:grace={}", pod.namespace, pod.name, grace_period_seconds));
        if self.deny.contains(&pod.name) {
            return Ok(EvictOutcome::Denied("would violate the pod's disruption budget".to_string()));
        }
        if !self.linger.contains(&pod.name) {
            if let Some(pods) = self.pods.lock().unwrap().get_mut(&pod.node_name) {
                pods.retain(|candidate| candidate.name != pod.name);
            }
        }
        Ok(EvictOutcome::Evicted)
    }
}

fn injected_api_error() -> DriverError {
    DriverError::Api(kube::Error::Api(kube::core::ErrorResponse {
        status: "Failure".to_string(),
        message: "injected failure".to_string(),
        reason: "Forbidden".to_string(),
        code: 403,
    }))
}

pub fn node(name: &str, pool: &str) -> NodeRef {
    NodeRef {
        name: name.to_string(),
        pool: Some(pool.to_string()),
        schedulable: true,
    }
}

pub fn pool(name: &str) -> PoolIdentity {
    PoolIdentity {
        subscription_id: "d4e53310-d7ea-4386-8e45-a6f2f328f977".to_string(),
        resource_group: "rg-demo-eus-001".to_string(),
        cluster_name: "aks-demo-eus-001".to_string(),
        pool_name: name.to_string(),
    }
}

pub fn request() -> MigrationRequest {
    MigrationRequest {
        cluster: ClusterIdentity {
            subscription_id: "d4e53310-d7ea-4386-8e45-a6f2f328f977".to_string(),
            resource_group: "rg-demo-eus-001".to_string(),
            cluster_name: "aks-demo-eus-001".to_string(),
        },
        source_pool: "userpool02".to_string(),
        destination_pool: "userpool01".to_string(),
        grace_period_seconds: 30,
    }
}

pub fn test_retry_config() -> RetryConfig {
    RetryConfig {
        max_attempts: 2,
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
        backoff_multiplier: 2.0,
    }
}

pub fn test_drain_settings(grace_period_seconds: u32) -> DrainSettings {
    DrainSettings {
        grace_period_seconds,
        excluded_namespaces: vec!["kube-system".to_string()],
        verify_interval: Duration::from_secs(1),
        verify_timeout: Duration::from_secs(5),
        retry: test_retry_config(),
    }
}

pub fn test_settings() -> OrchestratorSettings {
    OrchestratorSettings {
        scale_poll_interval: Duration::from_secs(1),
        scale_timeout: Duration::from_secs(30),
        verify_interval: Duration::from_secs(1),
        verify_timeout: Duration::from_secs(5),
        excluded_namespaces: vec!["kube-system".to_string()],
        retry: test_retry_config(),
        scale_down_source: false,
    }
}

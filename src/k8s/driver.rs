//! Kubernetes cluster driver backed by kube-rs.

use k8s_openapi::api::core::v1::{Node, Pod, Taint};
use kube::api::{Api, DeleteParams, EvictParams, ListParams, Patch, PatchParams};
use kube::Client;

use super::{ClusterDriver, EvictOutcome, NodeRef, PodRef};
use crate::error::DriverError;

/// Node labels carrying agent-pool membership, newest first.
const POOL_LABELS: [&str; 2] = ["kubernetes.azure.com/agentpool", "agentpool"];

/// Taint applied alongside the unschedulable mark when cordoning.
const CORDON_TAINT_KEY: &str = "node.kubernetes.io/unschedulable";

/// Cluster driver over a shared client handle.
///
/// The client is constructed once at startup and injected, so tests and
/// embedders control exactly which cluster is being driven.
pub struct KubeDriver {
    client: Client,
}

impl KubeDriver {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn nodes(&self) -> Api<Node> {
        Api::all(self.client.clone())
    }

    fn cordon_taint() -> Taint {
        Taint {
            effect: "NoSchedule".into(),
            key: CORDON_TAINT_KEY.into(),
            value: Some("true".into()),
            time_added: None,
        }
    }
}

fn node_pool(node: &Node) -> Option<String> {
    let labels = node.metadata.labels.as_ref()?;
    POOL_LABELS.iter().find_map(|key| labels.get(*key).cloned())
}

fn node_ref(node: &Node) -> NodeRef {
    let unschedulable = node.spec.as_ref().and_then(|spec| spec.unschedulable).unwrap_or(false);
    NodeRef {
        name: node.metadata.name.clone().unwrap_or_default(),
        pool: node_pool(node),
        schedulable: !unschedulable,
    }
}

/// Pods the drain must leave alone: daemonset-owned pods ignore cordons,
/// static mirror pods cannot be controlled, and completed pods have nothing
/// left to evict.
fn is_evictable(pod: &Pod) -> bool {
    if let Some(phase) = pod.status.as_ref().and_then(|status| status.phase.as_deref()) {
        if phase == "Succeeded" || phase == "Failed" {
            return false;
        }
    }
    if let Some(owners) = pod.metadata.owner_references.as_ref() {
        if owners.iter().any(|owner| owner.controller == Some(true) && owner.kind == "DaemonSet") {
            return false;
        }
    }
    if let Some(annotations) = pod.metadata.annotations.as_ref() {
        if annotations.contains_key("kubernetes.io/config.mirror") {
            return false;
        }
    }
    true
}

#[async_trait::async_trait]
impl ClusterDriver for KubeDriver {
    async fn list_nodes(&self) -> Result<Vec<NodeRef>, DriverError> {
        let nodes = self.nodes().list(&ListParams::default()).await?;
        Ok(nodes.items.iter().map(node_ref).collect())
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn cordon(&self, node_name: &str) -> Result<(), DriverError> {
        let api = self.nodes();
        let node = api.get(node_name).await?;
        let mut taints = node.spec.as_ref().and_then(|spec| spec.taints.clone()).unwrap_or_default();
        if !taints.iter().any(|taint| taint.key == CORDON_TAINT_KEY) {
            taints.push(Self::cordon_taint());
        }
        let patch = serde_json::json!({ "spec": { "unschedulable": true, "taints": taints } });
        api.patch(node_name, &PatchParams::default(), &Patch::Merge(&patch)).await?;
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn uncordon(&self, node_name: &str) -> Result<(), DriverError> {
        let api = self.nodes();
        let node = api.get(node_name).await?;
        let taints: Vec<Taint> = node
            .spec
            .as_ref()
            .and_then(|spec| spec.taints.clone())
            .unwrap_or_default()
            .into_iter()
            .filter(|taint| taint.key != CORDON_TAINT_KEY)
            .collect();
        let patch = serde_json::json!({ "spec": { "unschedulable": false, "taints": taints } });
        api.patch(node_name, &PatchParams::default(), &Patch::Merge(&patch)).await?;
        Ok(())
    }

    async fn list_pods_on_node(&self, node_name: &str, exclude_namespaces: &[String]) -> Result<Vec<PodRef>, DriverError> {
        let api: Api<Pod> = Api::all(self.client.clone());
        let params = ListParams::default().fields(&format!("spec.nodeName={}", node_name));
        let pods = api.list(&params).await?;
        Ok(pods
            .into_iter()
            .filter(is_evictable)
            .filter_map(|pod| {
                let namespace = pod.metadata.namespace.clone().unwrap_or_default();
                if exclude_namespaces.contains(&namespace) {
                    return None;
                }
                Some(PodRef {
                    name: pod.metadata.name.clone().unwrap_or_default(),
                    namespace,
                    node_name: node_name.to_string(),
                })
            })
            .collect())
    }

    #[tracing::instrument(level = "debug", skip(self, pod), fields(pod = %pod.name, namespace = %pod.namespace))]
    async fn evict(&self, pod: &PodRef, grace_period_seconds: u32) -> Result<EvictOutcome, DriverError> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), &pod.namespace);
        let params = EvictParams {
            delete_options: Some(DeleteParams {
                grace_period_seconds: Some(grace_period_seconds),
                ..Default::default()
            }),
            ..Default::default()
        };
        match api.evict(&pod.name, &params).await {
            Ok(_) => Ok(EvictOutcome::Evicted),
            // 429 signals an unsatisfied disruption budget; a 500 here is the
            // documented response to misconfigured budgets. Both mean "not
            // now", not "never".
            Err(kube::Error::Api(response)) if response.code == 429 || response.code == 500 => {
                Ok(EvictOutcome::Denied(response.message))
            }
            Err(kube::Error::Api(response)) if response.code == 404 => Ok(EvictOutcome::NotFound),
            Err(err) => Err(err.into()),
        }
    }
}

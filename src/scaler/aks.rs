//! Pool scaler backed by the managed-cluster agent pools REST surface.
//!
//! Resize submissions are PUTs against the agent pool resource; operation
//! status is the pool's `provisioningState`, which stays in a transitional
//! state (`Updating`, `Scaling`, ...) until the resize settles. Credential
//! acquisition is out of scope: the bearer token arrives via configuration.

use reqwest::StatusCode;
use serde::Deserialize;
use tokio::time::Instant;

use super::{PoolIdentity, PoolScaler, ScaleMode, ScaleOperation, ScaleRequest, ScaleStatus};
use crate::error::ScaleError;

const API_VERSION: &str = "2023-08-01";

/// REST client for the `Microsoft.ContainerService` agent pools API.
pub struct AksPoolScaler {
    http: reqwest::Client,
    endpoint: String,
    token: String,
}

#[derive(Debug, Default, Deserialize)]
struct AgentPool {
    #[serde(default)]
    properties: AgentPoolProperties,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AgentPoolProperties {
    count: Option<i32>,
    provisioning_state: Option<String>,
}

impl AksPoolScaler {
    pub fn new(endpoint: impl Into<String>, token: impl Into<String>) -> Self {
        let endpoint = endpoint.into().trim_end_matches('/').to_string();
        Self {
            http: reqwest::Client::new(),
            endpoint,
            token: token.into(),
        }
    }

    fn pool_url(&self, pool: &PoolIdentity) -> String {
        format!(
            "{}/subscriptions/{}/resourceGroups/{}/providers/Microsoft.ContainerService/managedClusters/{}/agentPools/{}?api-version={}",
            self.endpoint, pool.subscription_id, pool.resource_group, pool.cluster_name, pool.pool_name, API_VERSION,
        )
    }

    async fn get_pool(&self, url: &str, pool_name: &str) -> Result<AgentPool, ScaleError> {
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|err| ScaleError::Api(err.into()))?;
        match response.status() {
            StatusCode::NOT_FOUND => Err(ScaleError::NotFound(pool_name.to_string())),
            status if status.is_success() => response
                .json::<AgentPool>()
                .await
                .map_err(|err| ScaleError::Api(err.into())),
            status => Err(ScaleError::Api(anyhow::anyhow!(
                "unexpected status {} fetching agent pool {}",
                status,
                pool_name
            ))),
        }
    }

    fn scale_properties(mode: &ScaleMode) -> serde_json::Value {
        match mode {
            ScaleMode::Manual { count } => serde_json::json!({
                "count": count,
                "enableAutoScaling": false,
            }),
            ScaleMode::AutoScale { min, max } => serde_json::json!({
                "enableAutoScaling": true,
                "minCount": min,
                "maxCount": max,
            }),
        }
    }

    fn status_from_provisioning_state(state: Option<&str>) -> ScaleStatus {
        match state {
            Some("Succeeded") => ScaleStatus::Succeeded,
            Some(terminal) if terminal == "Failed" || terminal == "Canceled" => {
                ScaleStatus::Failed(format!("provisioning state {}", terminal))
            }
            _ => ScaleStatus::Running,
        }
    }
}

#[async_trait::async_trait]
impl PoolScaler for AksPoolScaler {
    #[tracing::instrument(level = "debug", skip(self, request), fields(pool = %request.pool.pool_name))]
    async fn submit_scale(&self, request: &ScaleRequest) -> Result<ScaleOperation, ScaleError> {
        request.validate()?;
        let url = self.pool_url(&request.pool);
        // A PUT against a missing pool would create it; confirm existence first.
        self.get_pool(&url, &request.pool.pool_name).await?;
        let body = serde_json::json!({ "properties": Self::scale_properties(&request.mode) });
        let response = self
            .http
            .put(&url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(|err| ScaleError::Api(err.into()))?;
        match response.status() {
            StatusCode::NOT_FOUND => return Err(ScaleError::NotFound(request.pool.pool_name.clone())),
            status if !status.is_success() => {
                return Err(ScaleError::Api(anyhow::anyhow!(
                    "unexpected status {} submitting scale of agent pool {}",
                    status,
                    request.pool.pool_name
                )))
            }
            _ => (),
        }
        tracing::info!(pool = %request.pool.pool_name, mode = ?request.mode, "submitted scale request");
        Ok(ScaleOperation {
            pool: request.pool.clone(),
            handle: url,
            status: ScaleStatus::Running,
            last_polled_at: None,
        })
    }

    async fn poll(&self, operation: &mut ScaleOperation) -> Result<ScaleStatus, ScaleError> {
        let agent_pool = self.get_pool(&operation.handle, &operation.pool.pool_name).await?;
        let status = Self::status_from_provisioning_state(agent_pool.properties.provisioning_state.as_deref());
        operation.status = status.clone();
        operation.last_polled_at = Some(Instant::now());
        Ok(status)
    }

    async fn current_count(&self, pool: &PoolIdentity) -> Result<i32, ScaleError> {
        let agent_pool = self.get_pool(&self.pool_url(pool), &pool.pool_name).await?;
        agent_pool
            .properties
            .count
            .ok_or_else(|| ScaleError::Api(anyhow::anyhow!("agent pool {} reported no count", pool.pool_name)))
    }
}

//! Live node-pool migration controller for managed Kubernetes clusters.

mod app;
mod config;
mod drain;
mod error;
#[cfg(test)]
mod fixtures;
mod k8s;
mod migrate;
mod retry;
#[cfg(test)]
mod retry_test;
mod scaler;

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::prelude::*;

use crate::app::App;
use crate::config::Config;
use crate::k8s::KubeDriver;
use crate::migrate::Orchestrator;
use crate::scaler::aks::AksPoolScaler;

#[tokio::main]
async fn main() -> Result<()> {
    // Setup tracing/logging system.
    tracing_subscriber::registry()
        // Filter spans based on the RUST_LOG env var.
        .with(tracing_subscriber::EnvFilter::from_default_env())
        // Send a copy of all spans to stdout in compact form.
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_ansi(true)
        )
        // Install this registry as the global tracing registry.
        .try_init()
        .context("error initializing logging/tracing system")?;

    let config = Arc::new(Config::new()?);
    tracing::info!(
        cluster = %config.cluster_name,
        source_pool = %config.source_pool,
        destination_pool = %config.destination_pool,
        "starting pool migrator",
    );

    let client = kube::Client::try_default().await.context("error initializing K8s client")?;
    let driver = KubeDriver::new(client);
    let scaler = AksPoolScaler::new(config.management_endpoint.as_str(), config.management_token.as_str());
    let orchestrator = Orchestrator::new(scaler, driver, config.orchestrator_settings());

    if let Err(err) = App::new(config, orchestrator)
        .spawn()
        .await
        .context("error joining app task")
        .and_then(|res| res)
    {
        tracing::error!(error = ?err);
    }

    // Ensure any pending output is flushed.
    let _ = std::io::stdout().flush();
    let _ = std::io::stderr().flush();

    Ok(())
}

//! Application runtime: periodic trigger, signal handling, graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::stream::StreamExt;
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::SignalStream;
use tokio_stream::StreamMap;

use crate::config::Config;
use crate::error::MigrationError;
use crate::k8s::KubeDriver;
use crate::migrate::{MigrationRequest, MigrationResult, MigrationStatus, Orchestrator};
use crate::scaler::aks::AksPoolScaler;

/// The application object driving scheduled migration cycles.
pub struct App {
    config: Arc<Config>,
    request: MigrationRequest,
    orchestrator: Orchestrator<AksPoolScaler, KubeDriver>,
}

impl App {
    pub fn new(config: Arc<Config>, orchestrator: Orchestrator<AksPoolScaler, KubeDriver>) -> Self {
        let request = config.migration_request();
        Self {
            config,
            request,
            orchestrator,
        }
    }

    pub fn spawn(self) -> JoinHandle<Result<()>> {
        tokio::spawn(self.run())
    }

    async fn run(self) -> Result<()> {
        let mut signals = StreamMap::new();
        signals.insert("sigterm", SignalStream::new(signal(SignalKind::terminate()).context("error building signal stream")?));
        signals.insert("sigint", SignalStream::new(signal(SignalKind::interrupt()).context("error building signal stream")?));

        let mut trigger = tokio::time::interval(Duration::from_secs(self.config.trigger_interval_seconds.max(1)));
        // A tick that fires while a run is still in progress is skipped
        // outright; runs against the same pool pair must never overlap.
        trigger.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(interval = self.config.trigger_interval_seconds, "pool migrator started");
        loop {
            tokio::select! {
                _ = trigger.tick() => {
                    // The run executes inline in this loop, so the next tick
                    // cannot observe a cycle still in flight. Dropping the run
                    // on shutdown stops issuing new operations; anything
                    // already submitted remotely is not locally revocable and
                    // is left to settle.
                    tokio::select! {
                        result = self.orchestrator.run(&self.request) => self.report(result),
                        Some((_, sig)) = signals.next() => {
                            tracing::info!(signal = ?sig, "signal received mid-run, beginning graceful shutdown");
                            break;
                        }
                    }
                }
                Some((_, sig)) = signals.next() => {
                    tracing::info!(signal = ?sig, "signal received, beginning graceful shutdown");
                    break;
                }
            }
        }

        tracing::info!("pool migrator shutdown complete");
        Ok(())
    }

    /// Per-cycle audit line for the operator.
    fn report(&self, result: Result<MigrationResult, MigrationError>) {
        match result {
            Ok(result) => {
                let drained = result.drained.len();
                match result.status {
                    MigrationStatus::Completed => {
                        tracing::info!(scaled_destination_to = ?result.scaled_destination_to, drained, "migration cycle ok")
                    }
                    MigrationStatus::PartiallyCompleted => {
                        tracing::warn!(scaled_destination_to = ?result.scaled_destination_to, drained, "migration cycle left workload behind")
                    }
                    MigrationStatus::Failed => {
                        tracing::error!(error = ?result.error, "migration cycle failed")
                    }
                }
            }
            Err(MigrationError::AlreadyRunning) => {
                tracing::warn!("previous migration still in flight, skipping trigger");
            }
        }
    }
}

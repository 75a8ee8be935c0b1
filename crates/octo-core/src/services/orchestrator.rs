use std::future::Future;

use tokio::task::JoinSet;

use crate::error::{OrchestratorError, Result};
use crate::models::{BackendInstance, OrchestratorConfig};

use super::backend::BackendSupervisor;
use super::barrier::discovery_barrier;
use super::health::HealthMonitor;
use super::process_group::ProcessGroups;
use super::proxy::ProxyLauncher;

/// What a component task returns when it ends without error.
enum Finished {
    Backend(BackendInstance),
    Proxy,
}

/// Runs N backends, the proxy in front of them, and the health monitor.
pub struct Orchestrator {
    config: OrchestratorConfig,
    instances: usize,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig, instances: usize) -> Result<Self> {
        if instances == 0 {
            return Err(OrchestratorError::InvalidConfig(
                "at least one backend instance is required".into(),
            ));
        }
        Ok(Self { config, instances })
    }

    /// Run every component concurrently until one fails or `interrupt`
    /// resolves.
    ///
    /// The first error from any component aborts the rest and is returned.
    /// Resolving `interrupt` aborts everything and returns `Ok(())`. Either
    /// way every child process group is sent SIGTERM, and SIGKILL once the
    /// shutdown grace runs out, before the tasks are aborted. Aborting drops
    /// the proxy config file, which deletes it.
    pub async fn run_until<F>(self, interrupt: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let (publisher, collector) = discovery_barrier(self.instances)?;
        let groups = ProcessGroups::new();
        let mut tasks = JoinSet::new();

        for index in 0..self.instances {
            let supervisor = BackendSupervisor::new(
                index,
                self.config.backend.clone(),
                publisher.clone(),
                groups.clone(),
            )?;
            tasks.spawn(async move { supervisor.run().await.map(Finished::Backend) });
        }
        // Held until the end of the run: the barrier releases on N
        // announcements and never because supervisors went away.
        let _publisher = publisher;

        let launcher = ProxyLauncher::new(self.config.proxy.clone(), groups.clone());
        tasks.spawn(async move { launcher.run(collector).await.map(|()| Finished::Proxy) });

        let monitor = HealthMonitor::new(self.config.metrics_url(), self.config.health.clone())?;
        tasks.spawn(async move {
            match monitor.run().await {
                Ok(never) => match never {},
                Err(e) => Err(e),
            }
        });

        tracing::info!(instances = self.instances, "orchestrator started");

        tokio::pin!(interrupt);
        let outcome = loop {
            tokio::select! {
                () = &mut interrupt => {
                    tracing::info!("interrupted, shutting down");
                    break Ok(());
                }
                joined = tasks.join_next() => match joined {
                    Some(Ok(Ok(Finished::Backend(instance)))) => {
                        tracing::warn!(
                            instance = instance.index,
                            address = ?instance.address,
                            "backend instance stopped; continuing with the remaining components"
                        );
                    }
                    Some(Ok(Ok(Finished::Proxy))) => {
                        tracing::warn!("proxy stopped; continuing with the remaining components");
                    }
                    Some(Ok(Err(e))) => {
                        tracing::error!(error = %e, "component failed");
                        break Err(e);
                    }
                    Some(Err(e)) => {
                        break Err(OrchestratorError::TaskFailed(e.to_string()));
                    }
                    None => {
                        break Err(OrchestratorError::TaskFailed(
                            "every component exited".into(),
                        ));
                    }
                },
            }
        };

        // Tasks keep running while the groups wind down so each child is
        // reaped by its own supervisor.
        groups.terminate(self.config.shutdown_grace()).await;
        tasks.shutdown().await;
        tracing::debug!("all components stopped");
        outcome
    }
}

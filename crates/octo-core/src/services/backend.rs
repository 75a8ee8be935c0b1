use std::process::Stdio;

use tokio::process::Command;
use tokio::sync::oneshot;

use crate::error::{OrchestratorError, Result};
use crate::models::{BackendInstance, BackendSettings};

use super::barrier::AddressPublisher;
use super::extractor::AddressExtractor;
use super::output::{drain_lines, StreamKind};
use super::process_group::{lead_own_group, ProcessGroups};

/// Runs one backend process and reports the address it announces.
pub struct BackendSupervisor {
    index: usize,
    settings: BackendSettings,
    extractor: AddressExtractor,
    publisher: AddressPublisher,
    groups: ProcessGroups,
}

impl BackendSupervisor {
    pub fn new(
        index: usize,
        settings: BackendSettings,
        publisher: AddressPublisher,
        groups: ProcessGroups,
    ) -> Result<Self> {
        let extractor = AddressExtractor::new(&settings.listening_pattern)?;
        Ok(Self {
            index,
            settings,
            extractor,
            publisher,
            groups,
        })
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.settings.program);
        cmd.args(&self.settings.args);
        cmd.envs(self.settings.env_overrides());
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);
        // Keep terminal interrupts away from the child; we tear it down.
        lead_own_group(&mut cmd);
        cmd
    }

    /// Spawn the backend and supervise it until it exits.
    ///
    /// Stdout and stderr are drained concurrently with waiting on the
    /// process. The first address matched on stderr is published to the
    /// discovery barrier; later matches are ignored. A non-zero exit at any
    /// point is an error, a clean exit returns the instance record.
    pub async fn run(self) -> Result<BackendInstance> {
        let mut child = self
            .command()
            .spawn()
            .map_err(|source| OrchestratorError::Spawn {
                program: self.settings.program.clone(),
                source,
            })?;
        self.groups.register(child.id());

        let Self {
            index,
            settings,
            extractor,
            publisher,
            ..
        } = self;

        let mut instance = BackendInstance::new(index, settings.program, child.id());
        tracing::info!(instance = index, pid = ?instance.pid, "backend spawned");

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (found_tx, found_rx) = oneshot::channel::<String>();

        let wait = async {
            let status = child.wait().await?;
            if status.success() {
                Ok(status)
            } else {
                Err(OrchestratorError::BackendExit {
                    instance: index,
                    code: status.code(),
                })
            }
        };

        let drain_stdout = async {
            match stdout {
                Some(out) => drain_lines(out, index, StreamKind::Stdout, |_| Ok(()))
                    .await
                    .map(|_| ()),
                None => Ok(()),
            }
        };

        let drain_stderr = async {
            // Owned here so the sender drops at end of stream, which tells
            // the announcer that nothing is coming.
            let mut found_tx = Some(found_tx);
            let Some(err) = stderr else {
                return Ok(());
            };
            drain_lines(err, index, StreamKind::Stderr, |line| {
                extractor.scan(line, |address| {
                    if !instance.record_address(address) {
                        tracing::debug!(instance = index, %address, "ignoring repeated announcement");
                        return Ok(());
                    }
                    tracing::info!(
                        instance = index,
                        %address,
                        latency_ms = instance.discovery_latency_ms(),
                        "backend listening"
                    );
                    if let Some(tx) = found_tx.take() {
                        let _ = tx.send(address.to_string());
                    }
                    Ok(())
                })
            })
            .await
            .map(|_| ())
        };

        let announce = async move {
            match found_rx.await {
                Ok(address) => publisher.publish(address).await,
                // Stderr closed without an announcement.
                Err(_) => Ok(()),
            }
        };

        let (status, (), (), ()) = tokio::try_join!(wait, drain_stdout, drain_stderr, announce)?;
        instance.exit_code = status.code();

        if instance.address.is_none() {
            tracing::warn!(instance = index, "backend exited cleanly before announcing an address");
        } else {
            tracing::warn!(instance = index, "backend exited cleanly");
        }
        Ok(instance)
    }
}

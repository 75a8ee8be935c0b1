use std::io::Write;
use std::process::{ExitStatus, Stdio};

use tempfile::NamedTempFile;
use tokio::process::Command;

use crate::error::{OrchestratorError, Result};
use crate::models::{AddressSet, ProxyConfigDocument, ProxySettings};

use super::barrier::AddressCollector;
use super::process_group::{lead_own_group, ProcessGroups};

/// Starts the reverse proxy once every backend address is known.
pub struct ProxyLauncher {
    settings: ProxySettings,
    groups: ProcessGroups,
}

impl ProxyLauncher {
    pub fn new(settings: ProxySettings, groups: ProcessGroups) -> Self {
        Self { settings, groups }
    }

    /// Wait for the full address set, then launch the proxy.
    pub async fn run(&self, collector: AddressCollector) -> Result<()> {
        let addresses = collector.await_full().await?;
        self.launch(addresses).await
    }

    /// Write the proxy config for `addresses` and run the proxy until it exits.
    ///
    /// The config file lives exactly as long as this call, including when the
    /// future is dropped mid-run.
    pub async fn launch(&self, addresses: AddressSet) -> Result<()> {
        if addresses.is_empty() {
            return Err(OrchestratorError::InvalidConfig(
                "proxy needs at least one upstream address".into(),
            ));
        }
        let document = ProxyConfigDocument::render(&addresses, &self.settings);
        let config_file = self.write_config(&document)?;
        tracing::info!(
            path = %config_file.path().display(),
            upstreams = addresses.len(),
            "proxy config written"
        );

        let status = self.spawn_and_wait(&config_file).await?;
        drop(config_file);

        if !status.success() {
            return Err(OrchestratorError::ProxyExit {
                code: status.code(),
            });
        }
        tracing::warn!("proxy exited cleanly");
        Ok(())
    }

    fn write_config(&self, document: &ProxyConfigDocument) -> Result<NamedTempFile> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("octollama-proxy-").suffix(".json");
        let mut file = match &self.settings.config_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        serde_json::to_writer_pretty(&mut file, document)?;
        file.flush()?;
        Ok(file)
    }

    async fn spawn_and_wait(&self, config_file: &NamedTempFile) -> Result<ExitStatus> {
        let mut cmd = Command::new(&self.settings.program);
        cmd.args(&self.settings.args);
        cmd.arg(config_file.path());
        cmd.stdin(Stdio::null());
        cmd.kill_on_drop(true);
        lead_own_group(&mut cmd);

        let mut child = cmd.spawn().map_err(|source| OrchestratorError::Spawn {
            program: self.settings.program.clone(),
            source,
        })?;
        self.groups.register(child.id());
        tracing::info!(pid = ?child.id(), program = %self.settings.program, "proxy spawned");

        Ok(child.wait().await?)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::services::barrier::discovery_barrier;

    fn shell(script: &str, dir: &std::path::Path) -> ProxySettings {
        ProxySettings {
            program: "sh".into(),
            // The config path arrives as $1.
            args: vec!["-c".into(), script.into(), "sh".into()],
            config_dir: Some(dir.to_path_buf()),
            ..ProxySettings::default()
        }
    }

    fn addresses() -> AddressSet {
        AddressSet::from(vec!["127.0.0.1:4001".to_string(), "127.0.0.1:4002".to_string()])
    }

    fn dir_is_empty(dir: &std::path::Path) -> bool {
        std::fs::read_dir(dir).unwrap().next().is_none()
    }

    #[tokio::test]
    async fn proxy_reads_generated_config() {
        let dir = tempfile::tempdir().unwrap();
        let copy = dir.path().join("copy");
        let script = format!(r#"cp "$1" "{}""#, copy.display());
        let launcher = ProxyLauncher::new(shell(&script, dir.path()), ProcessGroups::new());
        launcher.launch(addresses()).await.unwrap();

        let written: ProxyConfigDocument =
            serde_json::from_str(&std::fs::read_to_string(&copy).unwrap()).unwrap();
        assert_eq!(
            written.upstream_addresses(),
            vec!["127.0.0.1:4001", "127.0.0.1:4002"]
        );
    }

    #[tokio::test]
    async fn nonzero_exit_is_proxy_failure_and_config_removed() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = ProxyLauncher::new(
            shell(r#"test -f "$1" && exit 2"#, dir.path()),
            ProcessGroups::new(),
        );
        assert!(matches!(
            launcher.launch(addresses()).await,
            Err(OrchestratorError::ProxyExit { code: Some(2) })
        ));
        assert!(dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn config_removed_after_clean_exit() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = ProxyLauncher::new(
            shell(r#"test -f "$1""#, dir.path()),
            ProcessGroups::new(),
        );
        launcher.launch(addresses()).await.unwrap();
        assert!(dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn config_removed_when_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = ProxyLauncher::new(shell("sleep 30", dir.path()), ProcessGroups::new());
        let result = tokio::time::timeout(
            std::time::Duration::from_millis(200),
            launcher.launch(addresses()),
        )
        .await;
        assert!(result.is_err());
        assert!(dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn nothing_written_before_barrier_releases() {
        let dir = tempfile::tempdir().unwrap();
        let (publisher, collector) = discovery_barrier(2).unwrap();
        let launcher = ProxyLauncher::new(shell("exit 0", dir.path()), ProcessGroups::new());
        let run = tokio::spawn(async move { launcher.run(collector).await });

        publisher.clone().publish("127.0.0.1:4001".into()).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(dir_is_empty(dir.path()));
        assert!(!run.is_finished());

        publisher.publish("127.0.0.1:4002".into()).await.unwrap();
        run.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn empty_address_set_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = ProxyLauncher::new(shell("exit 0", dir.path()), ProcessGroups::new());
        assert!(matches!(
            launcher.launch(AddressSet::from(Vec::new())).await,
            Err(OrchestratorError::InvalidConfig(_))
        ));
        assert!(dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let settings = ProxySettings {
            program: "/nonexistent/octo-proxy".into(),
            config_dir: Some(dir.path().to_path_buf()),
            ..ProxySettings::default()
        };
        let launcher = ProxyLauncher::new(settings, ProcessGroups::new());
        assert!(matches!(
            launcher.launch(addresses()).await,
            Err(OrchestratorError::Spawn { .. })
        ));
        assert!(dir_is_empty(dir.path()));
    }
}

use std::path::Path;

use crate::error::{OrchestratorError, Result};
use crate::models::OrchestratorConfig;

use super::extractor::AddressExtractor;

pub const CONFIG_FILENAME: &str = "octollama.yaml";

/// Load the configuration at `path`, which must exist.
pub fn load(path: &Path) -> Result<OrchestratorConfig> {
    if !path.exists() {
        return Err(OrchestratorError::ConfigNotFound(path.to_path_buf()));
    }
    let contents = std::fs::read_to_string(path)?;
    let config: OrchestratorConfig = serde_yaml::from_str(&contents)
        .map_err(|e| OrchestratorError::InvalidConfig(e.to_string()))?;
    validate(&config)?;
    Ok(config)
}

/// Load `octollama.yaml` from `dir` if present, otherwise the defaults.
pub fn load_or_default(dir: &Path) -> Result<OrchestratorConfig> {
    match load(&dir.join(CONFIG_FILENAME)) {
        Ok(config) => Ok(config),
        Err(OrchestratorError::ConfigNotFound(_)) => Ok(OrchestratorConfig::default()),
        Err(e) => Err(e),
    }
}

fn validate(config: &OrchestratorConfig) -> Result<()> {
    if config.backend.program.is_empty() {
        return Err(OrchestratorError::InvalidConfig(
            "backend.program is required".into(),
        ));
    }
    if config.proxy.program.is_empty() {
        return Err(OrchestratorError::InvalidConfig(
            "proxy.program is required".into(),
        ));
    }
    if config.health.poll_interval_ms == 0 || config.health.retry_interval_ms == 0 {
        return Err(OrchestratorError::InvalidConfig(
            "health intervals must be positive".into(),
        ));
    }
    if config.health.request_timeout_ms == 0 {
        return Err(OrchestratorError::InvalidConfig(
            "health.request_timeout_ms must be positive".into(),
        ));
    }
    AddressExtractor::new(&config.backend.listening_pattern)?;
    Ok(())
}

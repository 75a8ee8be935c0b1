use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_LISTENING_PATTERN: &str = r#"msg="Listening on (.+) \(version .+\)""#;
pub const DEFAULT_HEALTH_METRIC: &str = "caddy_reverse_proxy_upstreams_healthy";

pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 5000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub backend: BackendSettings,
    pub proxy: ProxySettings,
    pub health: HealthSettings,
    /// Time children get between SIGTERM and SIGKILL during teardown.
    pub shutdown_grace_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            backend: BackendSettings::default(),
            proxy: ProxySettings::default(),
            health: HealthSettings::default(),
            shutdown_grace_ms: DEFAULT_SHUTDOWN_GRACE_MS,
        }
    }
}

impl OrchestratorConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// URL scraped by the health monitor, derived from the proxy's metrics
    /// listener unless set explicitly.
    pub fn metrics_url(&self) -> String {
        match &self.health.metrics_url {
            Some(url) => url.clone(),
            None => format!("http://{}/metrics", self.proxy.metrics_listen),
        }
    }
}

/// How to start one backend server instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSettings {
    pub program: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub host_var: String,
    pub host_value: String,
    pub noprune_var: String,
    pub listening_pattern: String,
}

impl BackendSettings {
    /// Environment overrides applied on top of the inherited environment.
    /// The bind and no-prune overrides come first so `env` can replace them.
    pub fn env_overrides(&self) -> Vec<(String, String)> {
        let mut vars = vec![
            (self.noprune_var.clone(), "1".to_string()),
            (self.host_var.clone(), self.host_value.clone()),
        ];
        vars.extend(self.env.iter().map(|(k, v)| (k.clone(), v.clone())));
        vars
    }
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            program: "ollama".into(),
            args: vec!["serve".into()],
            env: BTreeMap::new(),
            host_var: "OLLAMA_HOST".into(),
            host_value: "0.0.0.0:0".into(),
            noprune_var: "OLLAMA_NOPRUNE".into(),
            listening_pattern: DEFAULT_LISTENING_PATTERN.into(),
        }
    }
}

/// How to start the reverse proxy and what to put in its config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxySettings {
    pub program: String,
    /// Arguments placed before the generated config path.
    pub args: Vec<String>,
    pub listen: String,
    pub metrics_listen: String,
    pub selection_policy: String,
    pub health_uri: String,
    /// Directory for the transient config file; the system temp dir if unset.
    pub config_dir: Option<PathBuf>,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            program: "caddy".into(),
            args: vec!["run".into(), "--config".into()],
            listen: ":54321".into(),
            metrics_listen: "127.0.0.1:9090".into(),
            selection_policy: "ip_hash".into(),
            health_uri: "/".into(),
            config_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthSettings {
    pub metrics_url: Option<String>,
    pub metric: String,
    pub poll_interval_ms: u64,
    pub retry_interval_ms: u64,
    pub request_timeout_ms: u64,
}

impl HealthSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            metrics_url: None,
            metric: DEFAULT_HEALTH_METRIC.into(),
            poll_interval_ms: 5000,
            retry_interval_ms: 1000,
            request_timeout_ms: 2000,
        }
    }
}

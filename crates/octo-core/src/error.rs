use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("backend instance {instance} exited with code {}", code_label(.code))]
    BackendExit { instance: usize, code: Option<i32> },

    #[error("proxy exited with code {}", code_label(.code))]
    ProxyExit { code: Option<i32> },

    #[error("health check failed: unhealthy upstreams [{}]", .upstreams.join(", "))]
    UnhealthyUpstream { upstreams: Vec<String> },

    #[error("metrics endpoint returned status {status}")]
    MetricsStatus { status: u16 },

    #[error("malformed metrics line {line}: {reason}")]
    MetricsParse { line: usize, reason: String },

    #[error("discovery incomplete: expected {expected} addresses, received {received}")]
    DiscoveryIncomplete { expected: usize, received: usize },

    #[error("discovery barrier closed before the address could be published")]
    BarrierClosed,

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("task failed: {0}")]
    TaskFailed(String),

    #[error("config file not found at {0}")]
    ConfigNotFound(PathBuf),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

fn code_label(code: &Option<i32>) -> String {
    code.map_or_else(|| "unknown (terminated by signal)".into(), |c| c.to_string())
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_exit_message_includes_code() {
        let err = OrchestratorError::BackendExit {
            instance: 3,
            code: Some(1),
        };
        assert_eq!(err.to_string(), "backend instance 3 exited with code 1");
    }

    #[test]
    fn signal_exit_has_no_numeric_code() {
        let err = OrchestratorError::ProxyExit { code: None };
        assert_eq!(
            err.to_string(),
            "proxy exited with code unknown (terminated by signal)"
        );
    }

    #[test]
    fn unhealthy_lists_upstreams() {
        let err = OrchestratorError::UnhealthyUpstream {
            upstreams: vec!["10.0.0.1:1234".into(), "10.0.0.2:1234".into()],
        };
        assert_eq!(
            err.to_string(),
            "health check failed: unhealthy upstreams [10.0.0.1:1234, 10.0.0.2:1234]"
        );
    }
}

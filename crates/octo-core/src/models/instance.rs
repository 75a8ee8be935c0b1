use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One supervised backend process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendInstance {
    pub index: usize,
    pub program: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discovered_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

impl BackendInstance {
    pub fn new(index: usize, program: String, pid: Option<u32>) -> Self {
        Self {
            index,
            program,
            pid,
            started_at: Utc::now(),
            address: None,
            discovered_at: None,
            exit_code: None,
        }
    }

    /// Record the announced address. Only the first call has any effect;
    /// returns whether this call set it.
    pub fn record_address(&mut self, address: &str) -> bool {
        if self.address.is_some() {
            return false;
        }
        self.address = Some(address.to_string());
        self.discovered_at = Some(Utc::now());
        true
    }

    /// Milliseconds between spawn and discovery, once discovered.
    pub fn discovery_latency_ms(&self) -> Option<i64> {
        self.discovered_at
            .map(|at| (at - self.started_at).num_milliseconds())
    }
}

//! Watches the proxy's view of upstream health.
//!
//! The proxy runs its own active health checks against every upstream and
//! publishes the result as a gauge on its metrics listener. This monitor
//! scrapes that gauge and turns the first unhealthy report into a fatal
//! error. Failing to reach the metrics listener at all is expected while the
//! proxy is still starting and only delays the next poll.

use std::convert::Infallible;
use std::time::Duration;

use crate::error::{OrchestratorError, Result};
use crate::models::{HealthSample, HealthSettings};

use super::exposition;

/// Result of one successful or unreachable scrape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Healthy(HealthSample),
    Unreachable,
}

impl PollOutcome {
    /// How long to wait before the next poll.
    pub fn delay(&self, settings: &HealthSettings) -> Duration {
        match self {
            PollOutcome::Healthy(_) => settings.poll_interval(),
            PollOutcome::Unreachable => settings.retry_interval(),
        }
    }
}

pub struct HealthMonitor {
    client: reqwest::Client,
    url: String,
    settings: HealthSettings,
}

impl HealthMonitor {
    pub fn new(url: String, settings: HealthSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .no_proxy()
            .timeout(settings.request_timeout())
            .build()
            .map_err(|e| OrchestratorError::InvalidConfig(format!("http client: {e}")))?;
        Ok(Self {
            client,
            url,
            settings,
        })
    }

    /// Scrape the metrics endpoint once.
    pub async fn poll_once(&self) -> Result<PollOutcome> {
        let response = match self.client.get(&self.url).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(url = %self.url, error = %e, "metrics endpoint unreachable");
                return Ok(PollOutcome::Unreachable);
            }
        };

        let status = response.status();
        if !status.is_success() {
            return Err(OrchestratorError::MetricsStatus {
                status: status.as_u16(),
            });
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                tracing::debug!(url = %self.url, error = %e, "metrics body read failed");
                return Ok(PollOutcome::Unreachable);
            }
        };

        let families = exposition::parse(&body)?;
        let sample = HealthSample::from_families(&families, &self.settings.metric);
        if !sample.all_healthy() {
            let unhealthy = sample.unhealthy();
            for upstream in &unhealthy {
                tracing::error!(%upstream, "upstream reported unhealthy");
            }
            return Err(OrchestratorError::UnhealthyUpstream {
                upstreams: unhealthy,
            });
        }

        if sample.is_empty() {
            tracing::debug!(metric = %self.settings.metric, "health metric not reported yet");
        } else {
            tracing::debug!(upstreams = sample.len(), "all upstreams healthy");
        }
        Ok(PollOutcome::Healthy(sample))
    }

    /// Poll forever. Only returns when an upstream turns unhealthy or the
    /// metrics endpoint misbehaves.
    pub async fn run(&self) -> Result<Infallible> {
        tracing::info!(url = %self.url, metric = %self.settings.metric, "health monitor starting");
        loop {
            let outcome = self.poll_once().await?;
            tokio::time::sleep(outcome.delay(&self.settings)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_depends_on_outcome() {
        let settings = HealthSettings::default();
        assert_eq!(
            PollOutcome::Healthy(HealthSample::default()).delay(&settings),
            Duration::from_secs(5)
        );
        assert_eq!(PollOutcome::Unreachable.delay(&settings), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn refused_connection_is_unreachable() {
        // Reserve a port, then free it so nothing is listening there.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let monitor =
            HealthMonitor::new(format!("http://{addr}/metrics"), HealthSettings::default()).unwrap();
        for _ in 0..3 {
            assert_eq!(monitor.poll_once().await.unwrap(), PollOutcome::Unreachable);
        }
    }
}

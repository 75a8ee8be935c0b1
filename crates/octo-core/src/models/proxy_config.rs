//! Typed model of the reverse proxy's JSON configuration.
//!
//! Only the subset of the schema the orchestrator emits is modelled: admin
//! API off, debug logs to stdout, a loopback metrics server, and one public
//! server whose single route load balances over the discovered upstreams.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::address::AddressSet;
use super::config::ProxySettings;

pub const METRICS_SERVER: &str = "metrics";
pub const MAIN_SERVER: &str = "srv0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyConfigDocument {
    pub admin: Admin,
    pub logging: Logging,
    pub apps: Apps,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Admin {
    pub disabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Logging {
    pub logs: BTreeMap<String, Log>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Log {
    pub level: String,
    pub writer: Writer,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Writer {
    pub output: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Apps {
    pub http: HttpApp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpApp {
    pub metrics: MetricsApp,
    pub servers: BTreeMap<String, Server>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsApp {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Server {
    pub listen: Vec<String>,
    pub routes: Vec<Route>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub handle: Vec<Handler>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "handler", rename_all = "snake_case")]
pub enum Handler {
    Metrics,
    ReverseProxy(ReverseProxy),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReverseProxy {
    pub transport: Transport,
    pub load_balancing: LoadBalancing,
    pub upstreams: Vec<Upstream>,
    pub health_checks: HealthChecks,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transport {
    pub protocol: String,
    pub read_buffer_size: u64,
    pub write_buffer_size: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadBalancing {
    pub selection_policy: SelectionPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionPolicy {
    pub policy: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Upstream {
    pub dial: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthChecks {
    pub active: ActiveHealthCheck,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveHealthCheck {
    pub uri: String,
}

impl ProxyConfigDocument {
    pub fn render(addresses: &AddressSet, settings: &ProxySettings) -> Self {
        let reverse_proxy = ReverseProxy {
            // Unbuffered so streamed responses reach clients as produced.
            transport: Transport {
                protocol: "http".into(),
                read_buffer_size: 0,
                write_buffer_size: 0,
            },
            load_balancing: LoadBalancing {
                selection_policy: SelectionPolicy {
                    policy: settings.selection_policy.clone(),
                },
            },
            upstreams: addresses
                .iter()
                .map(|address| Upstream {
                    dial: address.clone(),
                })
                .collect(),
            health_checks: HealthChecks {
                active: ActiveHealthCheck {
                    uri: settings.health_uri.clone(),
                },
            },
        };

        let mut servers = BTreeMap::new();
        servers.insert(
            METRICS_SERVER.to_string(),
            Server {
                listen: vec![settings.metrics_listen.clone()],
                routes: vec![Route {
                    handle: vec![Handler::Metrics],
                }],
            },
        );
        servers.insert(
            MAIN_SERVER.to_string(),
            Server {
                listen: vec![settings.listen.clone()],
                routes: vec![Route {
                    handle: vec![Handler::ReverseProxy(reverse_proxy)],
                }],
            },
        );

        let mut logs = BTreeMap::new();
        logs.insert(
            "default".to_string(),
            Log {
                level: "DEBUG".into(),
                writer: Writer {
                    output: "stdout".into(),
                },
            },
        );

        Self {
            admin: Admin { disabled: true },
            logging: Logging { logs },
            apps: Apps {
                http: HttpApp {
                    metrics: MetricsApp::default(),
                    servers,
                },
            },
        }
    }

    /// Upstream dial addresses of the main server, in configured order.
    pub fn upstream_addresses(&self) -> Vec<&str> {
        self.apps
            .http
            .servers
            .get(MAIN_SERVER)
            .into_iter()
            .flat_map(|server| &server.routes)
            .flat_map(|route| &route.handle)
            .filter_map(|handler| match handler {
                Handler::ReverseProxy(proxy) => Some(proxy),
                Handler::Metrics => None,
            })
            .flat_map(|proxy| &proxy.upstreams)
            .map(|upstream| upstream.dial.as_str())
            .collect()
    }
}

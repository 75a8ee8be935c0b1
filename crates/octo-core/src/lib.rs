//! Service discovery and supervision for a pool of backend servers behind a
//! reverse proxy.
//!
//! Backends bind to ephemeral ports and announce their address on stderr;
//! once all of them have announced, the proxy is started with exactly those
//! upstreams and its health metrics are watched until something fails.

pub mod error;
pub mod models;
pub mod services;

pub use error::{OrchestratorError, Result};
pub use services::orchestrator::Orchestrator;

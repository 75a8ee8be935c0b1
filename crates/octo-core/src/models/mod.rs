pub mod address;
pub mod config;
pub mod health;
pub mod instance;
pub mod proxy_config;

pub use address::AddressSet;
pub use config::{BackendSettings, HealthSettings, OrchestratorConfig, ProxySettings};
pub use health::HealthSample;
pub use instance::BackendInstance;
pub use proxy_config::ProxyConfigDocument;

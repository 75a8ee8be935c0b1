pub mod backend;
pub mod barrier;
pub mod config_loader;
pub mod exposition;
pub mod extractor;
pub mod health;
pub mod orchestrator;
pub mod output;
pub mod process_group;
pub mod proxy;

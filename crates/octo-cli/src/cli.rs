use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "octollama")]
#[command(
    about = "Run a pool of backend servers behind a health-checked reverse proxy",
    long_about = None
)]
pub struct Cli {
    /// Number of backend instances to launch
    #[arg(short = 'n', default_value_t = 8, value_parser = clap::value_parser!(u16).range(1..))]
    pub instances: u16,

    /// YAML configuration file (defaults to ./octollama.yaml when present)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Write logs to this file instead of stderr
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

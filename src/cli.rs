use std::path::PathBuf;

use clap::Parser;

use crate::config::{AppConfig, ProbeBackend};

#[derive(Debug, Parser)]
#[command(name = "host-monitor", version, about = "Watch host reachability and log it per day")]
pub struct Cli {
    /// Host list (plain text, XML or JSON)
    #[arg(long)]
    pub hosts: Option<PathBuf>,

    /// Config file, defaults to the per-user config directory
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Directory for the daily log files
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Milliseconds between sweeps
    #[arg(long)]
    pub interval_ms: Option<u64>,

    /// How targets are probed
    #[arg(long, value_enum)]
    pub backend: Option<ProbeBackend>,

    /// Maximum probes in flight per sweep
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Save the effective configuration and exit
    #[arg(long)]
    pub write_config: bool,
}

impl Cli {
    /// Command-line values take precedence over the config file.
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(hosts) = &self.hosts {
            config.hosts_file = hosts.clone();
        }
        if let Some(log_dir) = &self.log_dir {
            config.log_dir = log_dir.clone();
        }
        if let Some(interval_ms) = self.interval_ms {
            config.interval_ms = interval_ms;
        }
        if let Some(backend) = self.backend {
            config.backend = backend;
        }
        if let Some(concurrency) = self.concurrency {
            config.max_concurrent_probes = Some(concurrency);
        }
    }
}

//! Configuration loading for the provisiond node agent.
//!
//! Mirrors `crates/cli/src/config.rs`'s two-layer approach: a TOML
//! file provides the base configuration, then CLI flags
//! (`clap::Parser`) are layered on top, each present flag overriding
//! the corresponding file value. Defaults match spec §5/§6: 8
//! workers, 30s drain timeout, 5 minute report interval.

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },

    #[error("failed to parse config file {path}: {source}")]
    Parse { path: PathBuf, source: toml::de::Error },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Command-line flags. Every flag is optional so that a bare
/// `provisiond` run is driven entirely by the config file (or
/// defaults); any flag that is present overrides the file.
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "provisiond", about = "Node-local workload provisioning engine")]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "provisiond.toml", value_name = "PATH")]
    pub config: PathBuf,

    /// Parent directory for the database and queue files.
    #[arg(long, value_name = "PATH")]
    pub root_dir: Option<PathBuf>,

    /// Cap on concurrent deployment dispatchers.
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,

    /// Cancellation grace on shutdown, in seconds.
    #[arg(long, value_name = "SECONDS")]
    pub drain_timeout: Option<u64>,

    /// Reporter emission period, in seconds.
    #[arg(long, value_name = "SECONDS")]
    pub report_interval: Option<u64>,

    /// Numeric identifier used to resolve the admin twin.
    #[arg(long, value_name = "FARM_ID")]
    pub admin_farm: Option<u32>,

    /// Bind address for the inbound bus-facing RPC surface.
    #[arg(long, value_name = "HOST:PORT")]
    pub listen: Option<String>,

    /// Overrides the configured log level (trace, debug, info, warn, error).
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Overrides the configured log output format (text, json).
    #[arg(long, value_name = "FORMAT")]
    pub log_format: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub level: String,
    /// `"text"` or `"json"`.
    pub format: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        LoggingSection { level: "info".to_string(), format: "text".to_string() }
    }
}

/// The node's declared total capacity (spec §3 four-tuple). `cpu`
/// defaults to the host's detected thread count when absent from the
/// file; the storage axes have no safe auto-detection and default to
/// zero, which in practice refuses every disk-bearing workload until
/// configured.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CapacitySection {
    pub cpu: Option<u64>,
    pub memory_gib: u64,
    pub ssd_gib: u64,
    pub hdd_gib: u64,
}

impl Default for CapacitySection {
    fn default() -> Self {
        CapacitySection { cpu: None, memory_gib: 0, ssd_gib: 0, hdd_gib: 0 }
    }
}

impl CapacitySection {
    pub fn resolve(&self) -> provisiond_types::Capacity {
        provisiond_types::Capacity {
            cpu: self.cpu.unwrap_or_else(|| num_cpus::get() as u64),
            memory: self.memory_gib.saturating_mul(1024 * 1024 * 1024),
            ssd: self.ssd_gib.saturating_mul(1024 * 1024 * 1024),
            hdd: self.hdd_gib.saturating_mul(1024 * 1024 * 1024),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub root_dir: PathBuf,
    pub workers: usize,
    pub drain_timeout_secs: u64,
    pub report_interval_secs: u64,
    pub admin_farm: u32,
    pub listen: String,
    pub queue_soft_bound: usize,
    pub capacity: CapacitySection,
    pub logging: LoggingSection,
    /// Path to the twin-key directory file the bundled [`KeyDirectory`]
    /// implementation reads from (see `provisiond`'s `directory`
    /// module); a real deployment replaces this with a call into the
    /// chain-backed directory (spec §6).
    pub twin_keys_path: PathBuf,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            root_dir: PathBuf::from("./data"),
            workers: 8,
            drain_timeout_secs: 30,
            report_interval_secs: 300,
            admin_farm: 0,
            listen: "127.0.0.1:2021".to_string(),
            queue_soft_bound: 1024,
            capacity: CapacitySection::default(),
            logging: LoggingSection::default(),
            twin_keys_path: PathBuf::from("./twin-keys.toml"),
        }
    }
}

impl NodeConfig {
    /// Loads the TOML file at `path` if present, falling back to
    /// defaults otherwise, then layers `cli`'s overrides on top.
    pub fn load(path: &Path, cli: &Cli) -> ConfigResult<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
            toml::from_str(&content)
                .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?
        } else {
            NodeConfig::default()
        };
        config.apply_cli(cli);
        Ok(config)
    }

    fn apply_cli(&mut self, cli: &Cli) {
        if let Some(root_dir) = &cli.root_dir {
            self.root_dir = root_dir.clone();
        }
        if let Some(workers) = cli.workers {
            self.workers = workers;
        }
        if let Some(secs) = cli.drain_timeout {
            self.drain_timeout_secs = secs;
        }
        if let Some(secs) = cli.report_interval {
            self.report_interval_secs = secs;
        }
        if let Some(farm) = cli.admin_farm {
            self.admin_farm = farm;
        }
        if let Some(listen) = &cli.listen {
            self.listen = listen.clone();
        }
        if let Some(level) = &cli.log_level {
            self.logging.level = level.clone();
        }
        if let Some(format) = &cli.log_format {
            self.logging.format = format.clone();
        }
    }

    pub fn drain_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.drain_timeout_secs)
    }

    pub fn report_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.report_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn cli_with_config(path: PathBuf) -> Cli {
        Cli { config: path, ..Cli::default() }
    }

    #[test]
    fn defaults_when_file_absent() {
        let config = NodeConfig::load(Path::new("/nonexistent/provisiond.toml"), &Cli::default()).unwrap();
        assert_eq!(config.workers, 8);
        assert_eq!(config.drain_timeout_secs, 30);
        assert_eq!(config.report_interval_secs, 300);
    }

    #[test]
    fn file_values_loaded_and_cli_overrides_win() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("provisiond.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "workers = 4\nadmin_farm = 7\n[capacity]\nmemory_gib = 16").unwrap();

        let mut cli = cli_with_config(path.clone());
        cli.workers = Some(16);
        let config = NodeConfig::load(&path, &cli).unwrap();
        assert_eq!(config.workers, 16, "cli override wins over file");
        assert_eq!(config.admin_farm, 7, "file value used when cli absent");
        assert_eq!(config.capacity.memory_gib, 16);
    }

    #[test]
    fn capacity_resolves_memory_to_bytes() {
        let section = CapacitySection { cpu: Some(4), memory_gib: 8, ssd_gib: 100, hdd_gib: 0 };
        let cap = section.resolve();
        assert_eq!(cap.cpu, 4);
        assert_eq!(cap.memory, 8 * 1024 * 1024 * 1024);
        assert_eq!(cap.ssd, 100 * 1024 * 1024 * 1024);
    }
}

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::log_buffer::DEFAULT_BUFFER_CAPACITY;
use crate::persist::LogSettings;
use crate::reply_parser::{DEFAULT_LATENCY_LABELS, DEFAULT_TTL_LABELS, ReplyParser};
use crate::status::DEFAULT_DEGRADED_THRESHOLD_MS;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not find config directory")]
    NoConfigDir,

    #[error("config file {} not found", .0.display())]
    NotFound(PathBuf),

    #[error("failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProbeBackend {
    /// Run the system `ping` command and parse its output.
    Command,
    /// Send ICMP echo requests directly (may need elevated privileges).
    Icmp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub hosts_file: PathBuf,
    pub log_dir: PathBuf,
    pub log_prefix: String,
    pub error_log_prefix: String,
    pub interval_ms: u64,
    pub probe_timeout_ms: u64,
    pub ping_wait_ms: u64,
    pub sweep_slack_ms: u64,
    pub degraded_threshold_ms: u64,
    pub buffer_capacity: usize,
    /// `None` probes every target of a sweep at once.
    pub max_concurrent_probes: Option<usize>,
    pub backend: ProbeBackend,
    pub latency_labels: Vec<String>,
    pub ttl_labels: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            hosts_file: PathBuf::from("hosts.xml"),
            log_dir: PathBuf::from("logs"),
            log_prefix: "ping_log".to_string(),
            error_log_prefix: "error_log".to_string(),
            interval_ms: 1000,
            probe_timeout_ms: 1500,
            ping_wait_ms: 1000,
            sweep_slack_ms: 500,
            degraded_threshold_ms: DEFAULT_DEGRADED_THRESHOLD_MS,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            max_concurrent_probes: None,
            backend: ProbeBackend::Command,
            latency_labels: DEFAULT_LATENCY_LABELS.iter().map(|s| s.to_string()).collect(),
            ttl_labels: DEFAULT_TTL_LABELS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl AppConfig {
    pub fn get_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir()
            .ok_or(ConfigError::NoConfigDir)?
            .join("HostMonitor");
        Ok(config_dir.join("config.json"))
    }

    /// Loads `path` if given (it must exist), otherwise the per-user config
    /// file, falling back to defaults when that one does not exist.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => match Self::get_config_path() {
                Ok(path) => (path, false),
                Err(_) => return Ok(Self::default()),
            },
        };

        let config = match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str::<AppConfig>(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if required {
                    return Err(ConfigError::NotFound(path));
                }
                Self::default()
            }
            Err(source) => return Err(ConfigError::Io { path, source }),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).map_err(io_err)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));
        if self.interval_ms == 0 {
            return invalid("interval_ms must be greater than zero");
        }
        if self.probe_timeout_ms == 0 {
            return invalid("probe_timeout_ms must be greater than zero");
        }
        if self.buffer_capacity == 0 {
            return invalid("buffer_capacity must be greater than zero");
        }
        if self.max_concurrent_probes == Some(0) {
            return invalid("max_concurrent_probes must be greater than zero");
        }
        if self.latency_labels.iter().all(|label| label.trim().is_empty()) {
            return invalid("latency_labels must not be empty");
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn ping_wait(&self) -> Duration {
        Duration::from_millis(self.ping_wait_ms)
    }

    pub fn sweep_slack(&self) -> Duration {
        Duration::from_millis(self.sweep_slack_ms)
    }

    pub fn reply_parser(&self) -> ReplyParser {
        ReplyParser::new(self.latency_labels.as_slice(), self.ttl_labels.as_slice())
    }

    pub fn log_settings(&self) -> LogSettings {
        LogSettings {
            dir: self.log_dir.clone(),
            log_prefix: self.log_prefix.clone(),
            error_log_prefix: self.error_log_prefix.clone(),
            capacity: self.buffer_capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.interval(), Duration::from_secs(1));
        assert_eq!(config.probe_timeout(), Duration::from_millis(1500));
        assert_eq!(config.degraded_threshold_ms, 50);
        assert_eq!(config.buffer_capacity, 100);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"interval_ms": 2000, "backend": "icmp"}"#).unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.interval_ms, 2000);
        assert_eq!(config.backend, ProbeBackend::Icmp);
        assert_eq!(config.log_prefix, "ping_log");
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.json");
        assert!(matches!(AppConfig::load(Some(&path)), Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_malformed_file_is_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(AppConfig::load(Some(&path)), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"buffer_capacity": 0}"#).unwrap();
        assert!(matches!(AppConfig::load(Some(&path)), Err(ConfigError::Invalid(_))));

        let config = AppConfig {
            max_concurrent_probes: Some(0),
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());

        let config = AppConfig {
            latency_labels: vec![" ".to_string()],
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = AppConfig {
            hosts_file: PathBuf::from("targets.txt"),
            max_concurrent_probes: Some(4),
            ..AppConfig::default()
        };
        config.save(&path).unwrap();
        assert_eq!(AppConfig::load(Some(&path)).unwrap(), config);
    }

    #[test]
    fn test_log_settings_follow_config() {
        let config = AppConfig {
            log_dir: PathBuf::from("/var/log/hosts"),
            buffer_capacity: 7,
            ..AppConfig::default()
        };
        let settings = config.log_settings();
        assert_eq!(settings.dir, PathBuf::from("/var/log/hosts"));
        assert_eq!(settings.capacity, 7);
        assert_eq!(settings.error_log_prefix, "error_log");
    }
}

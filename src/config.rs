use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub watcher: WatcherConfig,
    pub walker: WalkerConfig,
    pub drop: DropConfig,
    pub vm_logs: VmLogConfig,
    pub root_logs: RootLogConfig,
    pub paths: PathsConfig,
}

/// Process watcher settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Name of the per-VM runtime process
    pub vm_process: String,
    /// Name of the shared services daemon process
    pub daemon_process: String,
    /// Poll interval in milliseconds
    pub poll_interval_ms: u64,
    /// Poll interval once shutdown was requested
    pub drain_interval_ms: u64,
}

/// Drive walker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkerConfig {
    /// Delay before the first scan, in seconds
    pub start_delay_secs: u64,
    /// Delay between scan cycles, in seconds
    pub scan_interval_secs: u64,
    /// Yield after visiting this many directories
    pub yield_every: u64,
    /// Yield duration in milliseconds
    pub yield_ms: u64,
    /// Clear the exclusion cache after this many hours
    pub exclusion_reset_hours: u64,
}

/// Drop-files cleaner settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DropConfig {
    /// Drop folder location, relative to each user home
    pub drop_dir: String,
    /// Grace period after all files become free, in seconds
    pub grace_period_secs: u64,
    /// Upper bound on delete-loop iterations
    pub max_attempts: u32,
    /// Delay between lock polls and delete iterations, in milliseconds
    pub poll_interval_ms: u64,
    /// Delay once shutdown was requested, in milliseconds
    pub drain_interval_ms: u64,
}

/// Per-VM log cleaner settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VmLogConfig {
    /// Bounded deletion attempts per path
    pub max_attempts: u32,
    /// Delay between attempts, in milliseconds
    pub retry_delay_ms: u64,
    /// Delay once shutdown was requested, in milliseconds
    pub drain_interval_ms: u64,
}

/// Root log cleaner settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RootLogConfig {
    /// Bounded deletion attempts per pass
    pub max_attempts: u32,
    /// Delay between attempts, in milliseconds
    pub retry_delay_ms: u64,
    /// Delay once shutdown was requested, in milliseconds
    pub drain_interval_ms: u64,
    /// Cap on the final shutdown retry loop, in seconds.
    /// Absent means retry until the logs are gone, however long that takes.
    pub shutdown_timeout_secs: Option<u64>,
}

/// Well-known product path conventions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directories holding user home directories
    pub home_roots: Vec<PathBuf>,
    /// Root log directories, relative to each user home
    pub root_log_dirs: Vec<String>,
    /// Helper processes killed as a last resort at shutdown
    pub helper_processes: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            watcher: WatcherConfig::default(),
            walker: WalkerConfig::default(),
            drop: DropConfig::default(),
            vm_logs: VmLogConfig::default(),
            root_logs: RootLogConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            vm_process: "VirtualBoxVM".to_string(),
            daemon_process: "VBoxSDS".to_string(),
            poll_interval_ms: 500,
            drain_interval_ms: 10,
        }
    }
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            start_delay_secs: 10,
            scan_interval_secs: 180,
            yield_every: 100,
            yield_ms: 10,
            exclusion_reset_hours: 3,
        }
    }
}

impl Default for DropConfig {
    fn default() -> Self {
        Self {
            drop_dir: ".cache/VirtualBox Dropped Files".to_string(),
            grace_period_secs: 60,
            max_attempts: 100,
            poll_interval_ms: 1000,
            drain_interval_ms: 10,
        }
    }
}

impl Default for VmLogConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            retry_delay_ms: 50,
            drain_interval_ms: 10,
        }
    }
}

impl Default for RootLogConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            retry_delay_ms: 200,
            drain_interval_ms: 10,
            shutdown_timeout_secs: None,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            home_roots: vec![PathBuf::from("/home")],
            root_log_dirs: vec![
                ".config/VirtualBox".to_string(),
                ".VirtualBox".to_string(),
            ],
            helper_processes: vec!["VBoxSVC".to_string(), "VBoxSDS".to_string()],
        }
    }
}

impl Config {
    /// Load configuration from an explicit path, or from the default
    /// location. A missing default file yields the built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let default = Self::default_path();
                if !default.exists() {
                    return Ok(Self::default());
                }
                default
            }
        };

        let contents = fs::read_to_string(&path).map_err(|e| ConfigError::ReadError {
            path: path.clone(),
            source: e,
        })?;

        let config: Config =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError { path, source: e })?;

        config.validate()?;
        Ok(config)
    }

    /// Default config file location
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/etc"))
            .join("vbox-sweeper")
            .join("config.toml")
    }

    fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.watcher.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "watcher poll interval must be positive".into(),
            ));
        }
        if self.watcher.poll_interval_ms < self.watcher.drain_interval_ms {
            return Err(ConfigError::Invalid(
                "watcher poll interval must not be shorter than the drain interval".into(),
            ));
        }
        if self.drop.max_attempts == 0
            || self.vm_logs.max_attempts == 0
            || self.root_logs.max_attempts == 0
        {
            return Err(ConfigError::Invalid(
                "cleaner attempt limits must be positive".into(),
            ));
        }
        if self.walker.yield_every == 0 {
            return Err(ConfigError::Invalid(
                "walker yield_every must be positive".into(),
            ));
        }
        Ok(())
    }
}

impl RootLogConfig {
    pub fn shutdown_timeout(&self) -> Option<Duration> {
        self.shutdown_timeout_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.watcher.vm_process, "VirtualBoxVM");
        assert_eq!(config.vm_logs.max_attempts, 10);
    }

    #[test]
    fn config_serializes_to_toml() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[watcher]"));
        assert!(toml_str.contains("[root_logs]"));
    }

    #[test]
    fn shutdown_timeout_defaults_to_unbounded() {
        let config = RootLogConfig::default();
        assert!(config.shutdown_timeout().is_none());
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[watcher]\npoll_interval_ms = 250\n\n[root_logs]\nshutdown_timeout_secs = 30"
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.watcher.poll_interval_ms, 250);
        assert_eq!(
            config.root_logs.shutdown_timeout(),
            Some(Duration::from_secs(30))
        );
        // Untouched sections keep defaults
        assert_eq!(config.drop.max_attempts, 100);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[watcher]\npoll_interval_ms = 0").unwrap();

        assert!(Config::load(Some(file.path())).is_err());
    }

    #[test]
    fn zero_root_log_attempts_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[root_logs]\nmax_attempts = 0").unwrap();

        assert!(Config::load(Some(file.path())).is_err());
    }

    #[test]
    fn malformed_toml_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "not toml at all [").unwrap();

        assert!(Config::load(Some(file.path())).is_err());
    }
}

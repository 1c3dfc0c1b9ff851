use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Top-level configuration loaded from procwatch.toml.
#[derive(Debug, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct WatcherConfig {
    pub watch: WatchConfig,
    pub kill: KillConfig,
    pub limits: LimitsConfig,
    pub terminate: TerminateConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Timeout in milliseconds before the child is killed. Negative means
    /// no timeout; zero is rejected before anything spawns.
    pub timeout_ms: i64,
    /// How often the monitoring loop polls the child.
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KillConfig {
    /// How many poll/kill rounds to run before giving up on the child.
    pub max_attempts: u32,
    /// Sleep between kill rounds, in milliseconds.
    pub retry_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_args: usize,
    pub max_env: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct TerminateConfig {
    /// Kill the child before exiting when termination is requested.
    /// Off by default: the watcher stops supervising and leaves cleanup
    /// to the operating system.
    pub kill_child: bool,
}

/// Errors that can occur while loading the config file.
#[derive(Debug)]
pub enum ConfigError {
    /// The file exists but could not be read.
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The file is not valid TOML for this config.
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "failed to read config {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "failed to parse config {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
        }
    }
}

impl WatcherConfig {
    /// Load configuration from the given path.
    ///
    /// A missing file is not an error: defaults apply. A file that exists
    /// but cannot be read or parsed is a configuration error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        toml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

// --- Default implementations ---

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 300_000,
            poll_interval_ms: 50,
        }
    }
}

impl Default for KillConfig {
    fn default() -> Self {
        Self {
            max_attempts: 100,
            retry_delay_ms: 10,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_args: 256,
            max_env: 256,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = WatcherConfig::default();
        assert_eq!(config.watch.timeout_ms, 300_000);
        assert_eq!(config.watch.poll_interval_ms, 50);
        assert_eq!(config.kill.max_attempts, 100);
        assert_eq!(config.kill.retry_delay_ms, 10);
        assert_eq!(config.limits.max_args, 256);
        assert_eq!(config.limits.max_env, 256);
        assert!(!config.terminate.kill_child);
    }

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
            [watch]
            timeout_ms = 1000
            poll_interval_ms = 5

            [kill]
            max_attempts = 3
            retry_delay_ms = 1

            [limits]
            max_args = 8
            max_env = 4

            [terminate]
            kill_child = true
        "#;
        let config: WatcherConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.watch.timeout_ms, 1000);
        assert_eq!(config.watch.poll_interval_ms, 5);
        assert_eq!(config.kill.max_attempts, 3);
        assert_eq!(config.kill.retry_delay_ms, 1);
        assert_eq!(config.limits.max_args, 8);
        assert_eq!(config.limits.max_env, 4);
        assert!(config.terminate.kill_child);
    }

    #[test]
    fn test_parse_partial_config_keeps_defaults() {
        let toml_str = r#"
            [watch]
            timeout_ms = -1
        "#;
        let config: WatcherConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.watch.timeout_ms, -1);
        assert_eq!(config.watch.poll_interval_ms, 50);
        assert_eq!(config.kill.max_attempts, 100);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = WatcherConfig::load(Path::new("/nonexistent/procwatch.toml")).unwrap();
        assert_eq!(config.watch.timeout_ms, 300_000);
    }

    #[test]
    fn test_load_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("procwatch.toml");
        std::fs::write(&path, "[watch]\ntimeout_ms = 42\n").unwrap();
        let config = WatcherConfig::load(&path).unwrap();
        assert_eq!(config.watch.timeout_ms, 42);
    }

    #[test]
    fn test_load_invalid_toml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("procwatch.toml");
        std::fs::write(&path, "[watch\ntimeout_ms = 42\n").unwrap();
        let err = WatcherConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("procwatch.toml"));
    }
}

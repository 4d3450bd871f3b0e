//! Autosync configuration types and loading

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::debounce::{DEFAULT_DEBOUNCE_SECS, DEFAULT_IGNORE_PATTERNS, IgnoreRuleSet};

/// Project-local config file name, looked up in the repository root
pub const LOCAL_CONFIG_NAME: &str = ".autosync.yml";

/// Main autosync configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    /// Filesystem watching and debouncing
    pub watch: WatchConfig,

    /// Commit and push behavior
    pub sync: SyncConfig,
}

impl Config {
    /// Load configuration with fallback chain
    ///
    /// Explicit path, then `<repo>/.autosync.yml`, then
    /// `~/.config/autosync/autosync.yml`, then defaults.
    pub fn load(config_path: Option<&PathBuf>, repo_root: &Path) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        for candidate in Self::implicit_paths(repo_root) {
            if !candidate.exists() {
                continue;
            }
            match Self::load_from_file(&candidate) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", candidate.display(), e);
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read just the log level, before logging is set up
    ///
    /// Errors are swallowed; `load` reports them once logging exists.
    pub fn load_log_level(config_path: Option<&PathBuf>, repo_root: &Path) -> Option<String> {
        let candidates = match config_path {
            Some(path) => vec![path.clone()],
            None => Self::implicit_paths(repo_root),
        };
        candidates
            .iter()
            .filter(|p| p.exists())
            .find_map(|p| Self::load_from_file(p).ok())
            .and_then(|config| config.log_level)
    }

    fn implicit_paths(repo_root: &Path) -> Vec<PathBuf> {
        let mut paths = vec![repo_root.join(LOCAL_CONFIG_NAME)];
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("autosync").join("autosync.yml"));
        }
        paths
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Filesystem watching configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Quiet interval before a burst of changes triggers a sync
    #[serde(rename = "debounce-secs")]
    pub debounce_secs: u64,

    /// Case-insensitive path substrings that never trigger a sync
    pub ignore: Vec<String>,

    /// File name excluded as the tool's own artifact (default: the running executable)
    #[serde(rename = "self-name")]
    pub self_name: Option<String>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_secs: DEFAULT_DEBOUNCE_SECS,
            ignore: DEFAULT_IGNORE_PATTERNS.iter().map(|p| p.to_string()).collect(),
            self_name: None,
        }
    }
}

impl WatchConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_secs(self.debounce_secs)
    }

    /// Build the ignore rules, including self-exclusion
    pub fn ignore_rules(&self) -> IgnoreRuleSet {
        let rules = IgnoreRuleSet::new(&self.ignore);
        let own_name = self.self_name.clone().map(OsString::from).or_else(|| {
            std::env::current_exe()
                .ok()
                .and_then(|exe| exe.file_name().map(|n| n.to_os_string()))
        });
        match own_name {
            Some(name) => rules.with_self_name(name),
            None => rules,
        }
    }
}

/// Commit and push configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Remote to fetch from and push to
    pub remote: String,

    /// Default branch HEAD is repaired towards
    pub branch: String,

    /// Commit message text placed before the timestamp
    #[serde(rename = "message-prefix")]
    pub message_prefix: String,

    /// Pause before retrying a commit after HEAD repair (milliseconds)
    #[serde(rename = "retry-delay-ms")]
    pub retry_delay_ms: u64,

    /// Upper bound on any single git command (seconds)
    #[serde(rename = "command-timeout-secs")]
    pub command_timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            remote: "origin".to_string(),
            branch: "main".to_string(),
            message_prefix: "Auto-sync: update from".to_string(),
            retry_delay_ms: 500,
            command_timeout_secs: 120,
        }
    }
}

impl SyncConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

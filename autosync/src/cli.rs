//! CLI argument parsing for autosync

use clap::Parser;
use std::path::PathBuf;

use crate::config::Config;

/// Autosync - mirror a working tree to its remote on every change
#[derive(Parser, Debug)]
#[command(
    name = "autosync",
    author,
    version,
    about = "Watch a git working tree and commit + push every change",
    after_help = "Logs are written to: ~/.local/share/autosync/logs/autosync.log"
)]
pub struct Cli {
    /// Repository to watch
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Seconds of quiet before a burst of changes is synchronized
    #[arg(short, long)]
    pub debounce_secs: Option<u64>,

    /// Remote to push to
    #[arg(short, long)]
    pub remote: Option<String>,

    /// Default branch used for HEAD repair
    #[arg(short, long)]
    pub branch: Option<String>,

    /// Synchronize once and exit instead of watching
    #[arg(long)]
    pub once: bool,
}

impl Cli {
    /// Apply command-line overrides on top of loaded configuration
    pub fn apply(&self, config: &mut Config) {
        if let Some(secs) = self.debounce_secs {
            config.watch.debounce_secs = secs;
        }
        if let Some(remote) = &self.remote {
            config.sync.remote = remote.clone();
        }
        if let Some(branch) = &self.branch {
            config.sync.branch = branch.clone();
        }
        if let Some(level) = &self.log_level {
            config.log_level = Some(level.clone());
        }
    }
}

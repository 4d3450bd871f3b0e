//! Autosync - watch a working tree and mirror it to its remote
//!
//! CLI entry point.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use tracing::{debug, error, info, warn};

use autosync::cli::Cli;
use autosync::config::Config;
use autosync::debounce::ChangeDebouncer;
use autosync::engine::SyncEngine;
use autosync::report::{self, Tag};
use autosync::repo::{RepoError, RepositoryHandle};
use autosync::service::SyncService;
use autosync::watcher::FsWatcher;

fn setup_logging(level_str: Option<&str>) -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("autosync")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Priority: CLI --log-level > config file > default (INFO)
    let level = match level_str.map(|s| s.to_uppercase()) {
        None => tracing::Level::INFO,
        Some(s) => match s.as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
    };

    let log_file = fs::File::create(log_dir.join("autosync.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_log_level = Config::load_log_level(cli.config.as_ref(), &cli.path);
    setup_logging(cli.log_level.as_deref().or(config_log_level.as_deref())).context("Failed to setup logging")?;

    let repo = match RepositoryHandle::open(&cli.path) {
        Ok(repo) => repo,
        Err(e) => {
            error!(error = %e, "Startup check failed");
            report::emit(Tag::Error, "this is not a git repository");
            if let RepoError::Io { .. } = e {
                report::emit(Tag::Error, e.to_string());
            }
            report::emit(Tag::Hint, "run: git init");
            std::process::exit(1);
        }
    };

    let mut config = Config::load(cli.config.as_ref(), repo.root()).context("Failed to load configuration")?;
    cli.apply(&mut config);
    debug!(?config, "main: configuration loaded");

    let engine = Arc::new(SyncEngine::for_repo(&repo, config.sync.clone()));

    if cli.once {
        debug!("main: single run requested");
        return cmd_once(&engine).await;
    }

    cmd_watch(&repo, &config, engine).await
}

/// Run one synchronization and exit with its status
async fn cmd_once(engine: &SyncEngine) -> Result<()> {
    let outcome = engine.synchronize().await;
    if !outcome.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

/// Watch the repository until SIGINT/SIGTERM
async fn cmd_watch(repo: &RepositoryHandle, config: &Config, engine: Arc<SyncEngine>) -> Result<()> {
    let rule = "=".repeat(60);
    println!("{}", rule);
    println!("{}", "Autosync".bold());
    println!("{}", rule);
    println!("Directory: {}", repo.root().display());
    println!("Remote:    {}/{}", config.sync.remote, config.sync.branch);
    println!("Press Ctrl+C to stop");
    println!("{}", rule);
    println!();

    let debouncer = Arc::new(
        ChangeDebouncer::new(config.watch.ignore_rules(), config.watch.debounce()).with_root(repo.root()),
    );
    let watcher = FsWatcher::start(repo.root(), debouncer.clone()).context("Failed to start file watcher")?;
    report::emit(Tag::Start, "watching for changes...");

    let service = SyncService::new(debouncer, engine);
    let runs = service.run(shutdown_signal()).await;
    info!(runs, "Watch loop finished");

    report::emit(Tag::Stop, "stopping synchronization...");
    if let Err(e) = watcher.stop() {
        warn!(error = %e, "Failed to stop watcher cleanly");
    }
    report::emit(Tag::Stop, "synchronization stopped");
    Ok(())
}

/// Resolve on SIGINT or SIGTERM (Ctrl+C only on non-Unix)
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
            (Ok(mut sigint), Ok(mut sigterm)) => {
                tokio::select! {
                    _ = sigint.recv() => warn!("SIGINT received"),
                    _ = sigterm.recv() => warn!("SIGTERM received"),
                }
                return;
            }
            _ => warn!("Failed to install signal handlers, falling back to ctrl_c"),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for ctrl_c");
        std::future::pending::<()>().await;
    }
}

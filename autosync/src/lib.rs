//! Autosync - mirror a working tree to a single remote branch
//!
//! Autosync watches a git working tree, waits for each burst of edits to
//! settle, then stages, commits, and pushes everything to one remote branch.
//! Along the way it repairs a broken HEAD reference and reconciles with remote
//! history that has moved on.
//!
//! # Flow
//!
//! ```text
//! notify events ─▶ FsWatcher ─▶ ChangeDebouncer ─▶ SyncService ─▶ SyncEngine ─▶ git
//!                               (filter + coalesce)  (one run at a time)
//! ```
//!
//! # Modules
//!
//! - [`debounce`] - ignore rules and burst coalescing
//! - [`watcher`] - `notify` adapter feeding the debouncer
//! - [`engine`] - the repair/stage/commit/reconcile/push state machine
//! - [`repair`] - direct HEAD and ref surgery under `.git`
//! - [`classify`] - substring table classifying git error text
//! - [`git`] - git process execution behind the [`GitRunner`] trait
//! - [`service`] - worker loop serializing engine runs
//! - [`config`] - configuration types and loading
//! - [`cli`] - command-line interface

pub mod classify;
pub mod cli;
pub mod config;
pub mod debounce;
pub mod engine;
pub mod git;
pub mod repair;
pub mod repo;
pub mod report;
pub mod service;
pub mod watcher;

pub use classify::{ErrorKind, classify};
pub use config::{Config, SyncConfig, WatchConfig};
pub use debounce::{ChangeDebouncer, ChangeKind, IgnoreRuleSet, Trigger};
pub use engine::{SyncEngine, SyncOutcome};
pub use git::{GitCommand, GitOutput, GitRunner};
pub use repair::{HeadRepair, RefState, RepairReport, is_valid_ref_content};
pub use repo::{RepoError, RepositoryHandle};
pub use service::SyncService;
pub use watcher::{FsWatcher, WatchError};

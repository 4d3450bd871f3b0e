//! Filesystem watcher feeding the debouncer
//!
//! Wraps a recursive `notify` watcher over the repository root. Raw events are
//! reduced to created / modified / deleted plus a directory flag and handed to
//! [`ChangeDebouncer::on_event`] on the notifier's own thread.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, info, warn};

use crate::debounce::{ChangeDebouncer, ChangeKind};

/// Errors that can occur while setting up or tearing down the watcher
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("Failed to create watcher: {0}")]
    Create(#[source] notify::Error),

    #[error("Failed to watch path {path}: {source}")]
    WatchPath {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
}

/// Map a notify event kind onto the three change kinds we act on
///
/// Access events are dropped: git reads the whole tree while staging, and
/// those reads must not schedule another sync.
pub fn change_kind(kind: &EventKind) -> Option<ChangeKind> {
    match kind {
        EventKind::Create(_) => Some(ChangeKind::Created),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => Some(ChangeKind::Deleted),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => Some(ChangeKind::Created),
        EventKind::Modify(_) => Some(ChangeKind::Modified),
        EventKind::Remove(_) => Some(ChangeKind::Deleted),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => None,
    }
}

fn is_directory(kind: &EventKind, path: &Path) -> bool {
    match kind {
        EventKind::Create(CreateKind::Folder) | EventKind::Remove(RemoveKind::Folder) => true,
        EventKind::Remove(_) => false,
        _ => path.is_dir(),
    }
}

/// Forward one notify event to the debouncer; returns how many paths it accepted
pub fn dispatch(debouncer: &ChangeDebouncer, event: &Event) -> usize {
    let Some(kind) = change_kind(&event.kind) else {
        return 0;
    };
    event
        .paths
        .iter()
        .filter(|path| debouncer.on_event(kind, path, is_directory(&event.kind, path)))
        .count()
}

/// Recursive watcher over a repository root
pub struct FsWatcher {
    watcher: RecommendedWatcher,
    root: PathBuf,
}

impl FsWatcher {
    /// Start watching `root`, delivering events to `debouncer`
    pub fn start(root: &Path, debouncer: Arc<ChangeDebouncer>) -> Result<Self, WatchError> {
        debug!(?root, "FsWatcher::start: called");
        let handler = move |res: notify::Result<Event>| match res {
            Ok(event) => {
                dispatch(&debouncer, &event);
            }
            Err(e) => warn!(error = %e, "File watcher error"),
        };

        let mut watcher = RecommendedWatcher::new(handler, Config::default()).map_err(WatchError::Create)?;
        watcher
            .watch(root, RecursiveMode::Recursive)
            .map_err(|source| WatchError::WatchPath {
                path: root.to_path_buf(),
                source,
            })?;

        info!(root = %root.display(), "Watching for changes");
        Ok(Self {
            watcher,
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Stop watching and release the notifier
    pub fn stop(mut self) -> Result<(), WatchError> {
        debug!(root = ?self.root, "FsWatcher::stop: called");
        self.watcher.unwatch(&self.root).map_err(|source| WatchError::WatchPath {
            path: self.root.clone(),
            source,
        })
    }
}

//! Change debouncing
//!
//! Filesystem notifications arrive in bursts: an editor save or a `git
//! checkout` can produce dozens of events. [`ChangeDebouncer`] filters out
//! ignorable paths and collapses each burst into one [`Trigger`], fired once
//! the tree has been quiet for a full interval after the last accepted event.

use std::collections::HashMap;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

use crate::report::{self, Tag};

/// Default quiet interval before a burst fires (seconds)
pub const DEFAULT_DEBOUNCE_SECS: u64 = 5;

/// Path substrings that never trigger a sync
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    ".git",
    "__pycache__",
    ".pyc",
    ".pyo",
    ".pyd",
    ".env",
    "venv",
    "env",
    "node_modules",
    ".DS_Store",
    "Thumbs.db",
];

/// Kind of filesystem change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
}

impl ChangeKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Case-insensitive substring rules plus self-exclusion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoreRuleSet {
    patterns: Vec<String>,
    self_name: Option<OsString>,
}

impl Default for IgnoreRuleSet {
    fn default() -> Self {
        Self::new(DEFAULT_IGNORE_PATTERNS.iter().copied())
    }
}

impl IgnoreRuleSet {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| p.as_ref().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
        Self {
            patterns,
            self_name: None,
        }
    }

    /// Also ignore any path whose file name is `name`
    pub fn with_self_name(mut self, name: impl Into<OsString>) -> Self {
        self.self_name = Some(name.into());
        self
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn should_ignore(&self, path: &Path) -> bool {
        let lowered = path.to_string_lossy().to_lowercase();
        if self.patterns.iter().any(|p| lowered.contains(p.as_str())) {
            return true;
        }
        match (&self.self_name, path.file_name()) {
            (Some(own), Some(name)) => name == own.as_os_str(),
            _ => false,
        }
    }
}

/// One coalesced burst of accepted changes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    /// Distinct paths touched during the burst, sorted
    pub paths: Vec<PathBuf>,
    /// When the last accepted event of the burst arrived
    pub last_event: Instant,
}

#[derive(Debug, Default)]
struct DebounceState {
    watched: HashMap<PathBuf, Instant>,
    last_accepted: Option<Instant>,
}

/// Collapses bursts of filesystem events into single triggers
///
/// `on_event` is safe to call from the notifier's own thread while a worker
/// awaits [`next_trigger`](Self::next_trigger). Events accepted while the
/// worker is busy accumulate and fire together on its next wait.
pub struct ChangeDebouncer {
    root: Option<PathBuf>,
    rules: IgnoreRuleSet,
    quiet: Duration,
    state: Mutex<DebounceState>,
    activity: Notify,
}

impl ChangeDebouncer {
    pub fn new(rules: IgnoreRuleSet, quiet: Duration) -> Self {
        debug!(?quiet, patterns = rules.patterns().len(), "ChangeDebouncer::new: called");
        Self {
            root: None,
            rules,
            quiet,
            state: Mutex::new(DebounceState::default()),
            activity: Notify::new(),
        }
    }

    /// Match ignore rules against paths relative to `root`
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    pub fn quiet_interval(&self) -> Duration {
        self.quiet
    }

    pub fn should_ignore(&self, path: &Path) -> bool {
        let relative = self
            .root
            .as_deref()
            .and_then(|root| path.strip_prefix(root).ok())
            .unwrap_or(path);
        self.rules.should_ignore(relative)
    }

    /// Record a filesystem event; returns whether it was accepted
    pub fn on_event(&self, kind: ChangeKind, path: &Path, is_dir: bool) -> bool {
        if is_dir || self.should_ignore(path) {
            debug!(?path, %kind, is_dir, "ChangeDebouncer::on_event: ignored");
            return false;
        }

        let now = Instant::now();
        {
            let mut state = self.lock_state();
            state.watched.insert(path.to_path_buf(), now);
            state.last_accepted = Some(now);
        }

        let name = path.file_name().unwrap_or(path.as_os_str()).to_string_lossy();
        report::emit(Tag::Change, format!("{} {}", kind, name));
        self.activity.notify_one();
        true
    }

    /// Number of distinct paths waiting for the next trigger
    pub fn pending(&self) -> usize {
        self.lock_state().watched.len()
    }

    /// When `path` was last seen in the current burst
    pub fn last_seen(&self, path: &Path) -> Option<Instant> {
        self.lock_state().watched.get(path).copied()
    }

    /// Wait until a burst has been quiet for the full interval, then take it
    ///
    /// Cancel-safe: dropping the future leaves pending changes in place.
    pub async fn next_trigger(&self) -> Trigger {
        loop {
            let deadline = self.lock_state().last_accepted.map(|t| t + self.quiet);
            let Some(deadline) = deadline else {
                self.activity.notified().await;
                continue;
            };

            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {
                    if let Some(trigger) = self.take_if_quiet() {
                        debug!(paths = trigger.paths.len(), "ChangeDebouncer::next_trigger: firing");
                        return trigger;
                    }
                }
                _ = self.activity.notified() => {}
            }
        }
    }

    fn take_if_quiet(&self) -> Option<Trigger> {
        let mut state = self.lock_state();
        let last_event = state.last_accepted?;
        if Instant::now() < last_event + self.quiet {
            return None;
        }

        state.last_accepted = None;
        let mut paths: Vec<PathBuf> = state.watched.drain().map(|(path, _)| path).collect();
        paths.sort();
        Some(Trigger { paths, last_event })
    }

    fn lock_state(&self) -> MutexGuard<'_, DebounceState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn debouncer() -> ChangeDebouncer {
        ChangeDebouncer::new(IgnoreRuleSet::default(), Duration::from_secs(5))
    }

    #[test]
    fn test_ignore_patterns_case_insensitive() {
        let rules = IgnoreRuleSet::default();
        assert!(rules.should_ignore(Path::new(".git/index")));
        assert!(rules.should_ignore(Path::new("src/__PYCACHE__/mod.cpython-311.pyc")));
        assert!(rules.should_ignore(Path::new("assets/.ds_store")));
        assert!(rules.should_ignore(Path::new("Pictures/THUMBS.DB")));
        assert!(rules.should_ignore(Path::new("web/node_modules/left-pad/index.js")));
        assert!(!rules.should_ignore(Path::new("src/main.rs")));
        assert!(!rules.should_ignore(Path::new("notes/todo.md")));
    }

    #[test]
    fn test_self_exclusion() {
        let rules = IgnoreRuleSet::new(["node_modules"]).with_self_name("autosync");
        assert!(rules.should_ignore(Path::new("bin/autosync")));
        assert!(!rules.should_ignore(Path::new("bin/autosync.md")));
        assert!(!rules.should_ignore(Path::new("autosync/readme.md")));
    }

    #[test]
    fn test_empty_patterns_are_dropped() {
        let rules = IgnoreRuleSet::new(["", "TMP"]);
        assert_eq!(rules.patterns(), &["tmp".to_string()]);
        assert!(!rules.should_ignore(Path::new("src/lib.rs")));
    }

    #[test]
    fn test_root_prefix_not_matched() {
        let debouncer = debouncer().with_root("/home/user/envs/project");
        assert!(!debouncer.should_ignore(Path::new("/home/user/envs/project/src/lib.rs")));
        assert!(debouncer.should_ignore(Path::new("/home/user/envs/project/.git/HEAD")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_directories_and_ignored_paths_rejected() {
        let debouncer = debouncer();
        assert!(!debouncer.on_event(ChangeKind::Created, Path::new("src"), true));
        assert!(!debouncer.on_event(ChangeKind::Modified, Path::new(".git/index"), false));
        assert!(!debouncer.on_event(ChangeKind::Modified, Path::new("app/Venv/lib/site.py"), false));
        assert_eq!(debouncer.pending(), 0);
        assert!(debouncer.last_seen(Path::new(".git/index")).is_none());

        let waited = tokio::time::timeout(Duration::from_secs(60), debouncer.next_trigger()).await;
        assert!(waited.is_err(), "ignored events must not schedule a trigger");
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_fires_once_from_last_event() {
        let debouncer = debouncer();
        let start = Instant::now();

        assert!(debouncer.on_event(ChangeKind::Created, Path::new("a.txt"), false));
        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(debouncer.on_event(ChangeKind::Modified, Path::new("b.txt"), false));
        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(debouncer.on_event(ChangeKind::Modified, Path::new("a.txt"), false));
        assert_eq!(debouncer.pending(), 2);
        assert_eq!(debouncer.last_seen(Path::new("a.txt")), Some(start + Duration::from_secs(6)));

        let trigger = debouncer.next_trigger().await;
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(11), "fired too early: {:?}", elapsed);
        assert!(elapsed < Duration::from_millis(11_100), "fired too late: {:?}", elapsed);
        assert_eq!(trigger.paths, vec![PathBuf::from("a.txt"), PathBuf::from("b.txt")]);
        assert_eq!(trigger.last_event, start + Duration::from_secs(6));
        assert_eq!(debouncer.pending(), 0);

        let again = tokio::time::timeout(Duration::from_secs(60), debouncer.next_trigger()).await;
        assert!(again.is_err(), "a burst must fire exactly once");
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_during_wait_reset_the_timer() {
        let debouncer = Arc::new(debouncer());
        let start = Instant::now();
        debouncer.on_event(ChangeKind::Modified, Path::new("a.txt"), false);

        let producer = {
            let debouncer = debouncer.clone();
            tokio::spawn(async move {
                for _ in 0..4 {
                    tokio::time::sleep(Duration::from_secs(4)).await;
                    debouncer.on_event(ChangeKind::Modified, Path::new("a.txt"), false);
                }
            })
        };

        let trigger = debouncer.next_trigger().await;
        producer.await.unwrap();
        assert_eq!(trigger.paths, vec![PathBuf::from("a.txt")]);
        assert!(start.elapsed() >= Duration::from_secs(21));
        let last = trigger.last_event - start;
        assert!(last >= Duration::from_secs(16) && last < Duration::from_millis(16_100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_after_fire_start_new_burst() {
        let debouncer = debouncer();
        debouncer.on_event(ChangeKind::Created, Path::new("one.txt"), false);
        let first = debouncer.next_trigger().await;
        assert_eq!(first.paths, vec![PathBuf::from("one.txt")]);

        debouncer.on_event(ChangeKind::Deleted, Path::new("two.txt"), false);
        debouncer.on_event(ChangeKind::Created, Path::new("three.txt"), false);
        let second = debouncer.next_trigger().await;
        assert_eq!(second.paths, vec![PathBuf::from("three.txt"), PathBuf::from("two.txt")]);
    }

    #[test]
    fn test_change_kind_labels() {
        assert_eq!(ChangeKind::Created.to_string(), "created");
        assert_eq!(ChangeKind::Modified.to_string(), "modified");
        assert_eq!(ChangeKind::Deleted.to_string(), "deleted");
    }
}

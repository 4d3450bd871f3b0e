//! Sync engine: repair → stage → commit → reconcile → push
//!
//! [`SyncEngine::synchronize`] drives one complete attempt to mirror the
//! working tree to the remote branch. Each stage either falls through to a
//! documented fallback or ends the run with a [`SyncOutcome`]; nothing in a
//! run is fatal to the process.
//!
//! ```text
//! HEAD inspection ──broken──▶ HEAD repair
//!        │
//! commit-history check ──none──▶ create/rename default branch
//!        │
//! status report ─▶ stage ──fail──▶ CommitFailed
//!        │
//! pending? ──no──▶ NoChanges
//!        │
//! commit ──head lock──▶ repair, wait, retry once ──fail──▶ CommitFailed
//!        │
//! fetch ─▶ behind/diverged? ──▶ merge-pull ─▶ rebase-pull ─▶ warn
//!        │
//! push -u ─▶ push ─▶ diagnose ──▶ PushFailedDivergent | PushFailedOther
//!        │
//! CommittedAndPushed
//! ```

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Local};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::classify::{ErrorKind, classify};
use crate::config::SyncConfig;
use crate::git::{GitCommand, GitRunner};
use crate::repair::{HeadRepair, RefState};
use crate::repo::RepositoryHandle;
use crate::report::{self, Tag};

/// Timestamp layout used in commit messages
pub const COMMIT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Terminal status of one synchronization run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Nothing to commit
    NoChanges,
    /// A commit was created and the branch pushed
    CommittedAndPushed,
    /// Staging or committing failed
    CommitFailed { message: String },
    /// Push rejected because the remote has commits we lack
    PushFailedDivergent { message: String },
    /// Push failed for any other reason
    PushFailedOther { message: String },
}

impl SyncOutcome {
    /// Check if the run ended without needing manual attention
    pub fn is_success(&self) -> bool {
        matches!(self, Self::NoChanges | Self::CommittedAndPushed)
    }

    /// Get error message if any
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::NoChanges | Self::CommittedAndPushed => None,
            Self::CommitFailed { message }
            | Self::PushFailedDivergent { message }
            | Self::PushFailedOther { message } => Some(message),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::NoChanges => "no-changes",
            Self::CommittedAndPushed => "committed-and-pushed",
            Self::CommitFailed { .. } => "commit-failed",
            Self::PushFailedDivergent { .. } => "push-failed-divergent",
            Self::PushFailedOther { .. } => "push-failed-other",
        }
    }

    /// Manual remediation steps for outcomes that need them
    pub fn hints(&self, remote: &str, branch: &str) -> Vec<String> {
        match self {
            Self::NoChanges | Self::CommittedAndPushed => Vec::new(),
            Self::CommitFailed { .. } => vec![
                "inspect `git status` and commit manually".to_string(),
                "synchronization resumes on the next change".to_string(),
            ],
            Self::PushFailedDivergent { .. } => vec![
                format!("run: git pull --rebase {} {}", remote, branch),
                "synchronization then continues automatically".to_string(),
            ],
            Self::PushFailedOther { .. } => vec![
                "check your git settings and network connection".to_string(),
                format!("make sure the remote is configured: git remote add {} <url>", remote),
            ],
        }
    }
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// How stage 7 left the local branch relative to the remote
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reconciliation {
    UpToDate,
    Merged,
    Rebased,
    UnrelatedHistories,
    Failed,
}

/// Drives synchronization runs for one repository
///
/// Runs are serialized: concurrent callers of [`synchronize`](Self::synchronize)
/// wait for the active run to finish.
pub struct SyncEngine {
    git: Arc<dyn GitRunner>,
    repair: HeadRepair,
    config: SyncConfig,
    run_lock: Mutex<()>,
}

impl SyncEngine {
    pub fn new(git: Arc<dyn GitRunner>, repair: HeadRepair, config: SyncConfig) -> Self {
        debug!(?config, "SyncEngine::new: called");
        Self {
            git,
            repair,
            config,
            run_lock: Mutex::new(()),
        }
    }

    /// Engine running the real git binary inside `repo`
    pub fn for_repo(repo: &RepositoryHandle, config: SyncConfig) -> Self {
        let git = Arc::new(GitCommand::new(repo.root(), config.command_timeout()));
        let repair = HeadRepair::for_repo(repo, config.branch.clone());
        Self::new(git, repair, config)
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// True while a run holds the engine
    pub fn is_running(&self) -> bool {
        self.run_lock.try_lock().is_err()
    }

    pub fn commit_message(&self, now: DateTime<Local>) -> String {
        format!("{} {}", self.config.message_prefix, now.format(COMMIT_TIMESTAMP_FORMAT))
    }

    /// Run one full synchronization attempt
    pub async fn synchronize(&self) -> SyncOutcome {
        let _guard = self.run_lock.lock().await;
        debug!("SyncEngine::synchronize: called");
        report::emit(Tag::Sync, "starting synchronization");

        let outcome = self.run_stages().await;
        self.report_outcome(&outcome);
        info!(outcome = %outcome, "Synchronization finished");
        outcome
    }

    async fn run_stages(&self) -> SyncOutcome {
        self.inspect_head().await;
        let has_commits = self.ensure_default_branch().await;
        self.log_status().await;

        report::emit(Tag::Git, "staging changes");
        let add = self.git.run(&["add", "-A"]).await;
        if !add.success() {
            report::emit(Tag::Error, format!("failed to stage changes: {}", add.diagnostic()));
            return SyncOutcome::CommitFailed {
                message: add.diagnostic().to_string(),
            };
        }

        if !self.has_pending_changes().await {
            debug!("SyncEngine::run_stages: nothing staged");
            return SyncOutcome::NoChanges;
        }

        let message = self.commit_message(Local::now());
        if let Err(outcome) = self.commit(&message, has_commits).await {
            return outcome;
        }

        let branch = self.current_branch().await;
        let reconciliation = self.reconcile(&branch).await;
        debug!(?reconciliation, "SyncEngine::run_stages: reconciled");
        self.push(&branch).await
    }

    /// Stage 1: repair HEAD if git cannot resolve it
    async fn inspect_head(&self) {
        debug!("SyncEngine::inspect_head: called");
        report::emit(Tag::Git, "checking repository state");
        let head = self.git.run(&["symbolic-ref", "HEAD"]).await;
        if head.success() && !ErrorKind::UnresolvedHead.matches(&head.stderr) {
            debug!(head = %head.stdout.trim(), "SyncEngine::inspect_head: HEAD resolves");
            return;
        }

        report::emit(Tag::Repair, "HEAD is broken, repairing");
        self.repair_head().await;

        let recheck = self.git.run(&["symbolic-ref", "HEAD"]).await;
        if !recheck.success() {
            report::emit(Tag::Warn, "HEAD may still be damaged, continuing anyway");
        }
    }

    /// Metadata surgery shared by HEAD inspection and the commit retry
    async fn repair_head(&self) -> bool {
        debug!("SyncEngine::repair_head: called");
        match self.repair.repair().await {
            Ok(result) => {
                if result.ref_state == RefState::Removed {
                    report::emit(
                        Tag::Repair,
                        format!("removed corrupt ref refs/heads/{}", self.repair.branch()),
                    );
                }
                if result.head_rewritten {
                    report::emit(
                        Tag::Repair,
                        format!("HEAD rewritten to refs/heads/{}", self.repair.branch()),
                    );
                }
                true
            }
            Err(e) => {
                report::emit(Tag::Error, format!("failed to repair HEAD: {}", e));
                false
            }
        }
    }

    /// Stage 2: make sure an unborn repository sits on the default branch
    async fn ensure_default_branch(&self) -> bool {
        let log = self.git.run(&["log", "--oneline", "-1"]).await;
        if log.success() {
            debug!("SyncEngine::ensure_default_branch: repository has commits");
            return true;
        }

        let branch = self.config.branch.as_str();
        report::emit(
            Tag::Git,
            format!("repository has no commits yet, initializing branch {}", branch),
        );
        let attempts: [&[&str]; 2] = [&["checkout", "-b", branch], &["branch", "-M", branch]];
        for args in attempts {
            if self.git.run(args).await.success() {
                debug!(?args, "SyncEngine::ensure_default_branch: branch ready");
                break;
            }
        }
        false
    }

    /// Stage 3: status goes to the log only
    async fn log_status(&self) {
        let status = self.git.run(&["status"]).await;
        info!(status = %status.diagnostic(), "Repository status");
    }

    /// Stage 5: anything left to commit after staging?
    async fn has_pending_changes(&self) -> bool {
        let status = self.git.run(&["status", "--porcelain"]).await;
        if !status.success() {
            warn!(error = %status.diagnostic(), "git status --porcelain failed");
            report::emit(
                Tag::Warn,
                format!("could not read pending changes: {}", status.diagnostic()),
            );
        }
        !status.stdout.trim().is_empty()
    }

    /// Stage 6: commit, with one retry after HEAD repair on lock errors
    async fn commit(&self, message: &str, has_commits: bool) -> Result<(), SyncOutcome> {
        debug!(%message, has_commits, "SyncEngine::commit: called");
        report::emit(Tag::Git, format!("creating commit: {}", message));

        if !has_commits {
            report::emit(Tag::Git, "creating first commit");
            let head_ref = format!("refs/heads/{}", self.config.branch);
            let pointed = self.git.run(&["symbolic-ref", "HEAD", &head_ref]).await;
            if !pointed.success() {
                let _ = self.git.run(&["branch", "-M", &self.config.branch]).await;
            }
        }

        let first = self.git.run(&["commit", "-m", message]).await;
        if first.success() {
            return Ok(());
        }

        report::emit(Tag::Error, format!("commit failed: {}", first.diagnostic()));
        debug!(kind = ?classify(&first.stderr), "SyncEngine::commit: classified failure");
        if !ErrorKind::HeadLock.matches(&first.stderr) {
            return Err(SyncOutcome::CommitFailed {
                message: first.diagnostic().to_string(),
            });
        }

        report::emit(Tag::Retry, "repairing HEAD and retrying commit");
        if !self.repair_head().await {
            return Err(SyncOutcome::CommitFailed {
                message: first.diagnostic().to_string(),
            });
        }
        tokio::time::sleep(self.config.retry_delay()).await;

        let second = self.git.run(&["commit", "-m", message]).await;
        if second.success() {
            report::emit(Tag::Ok, "commit created after HEAD repair");
            return Ok(());
        }

        report::emit(Tag::Error, format!("commit still failing: {}", second.diagnostic()));
        report::emit(
            Tag::Hint,
            format!("repair manually: echo 'ref: refs/heads/{}' > .git/HEAD", self.config.branch),
        );
        Err(SyncOutcome::CommitFailed {
            message: second.diagnostic().to_string(),
        })
    }

    /// Short name of the checked-out branch, falling back to the default
    async fn current_branch(&self) -> String {
        let lookups: [&[&str]; 2] = [&["symbolic-ref", "--short", "HEAD"], &["rev-parse", "--abbrev-ref", "HEAD"]];
        for args in lookups {
            let output = self.git.run(args).await;
            let name = output.stdout.trim();
            if output.success() && !name.is_empty() && name != "HEAD" {
                return name.to_string();
            }
        }
        self.config.branch.clone()
    }

    /// Stage 7: pull remote commits in when the branch is behind or diverged
    async fn reconcile(&self, branch: &str) -> Reconciliation {
        let remote = self.config.remote.as_str();
        debug!(%remote, %branch, "SyncEngine::reconcile: called");

        let fetch = self.git.run(&["fetch", remote]).await;
        if !fetch.success() {
            warn!(error = %fetch.diagnostic(), "git fetch failed");
            report::emit(Tag::Warn, format!("fetch from {} failed: {}", remote, fetch.diagnostic()));
        }

        let status = self.git.run(&["status", "--porcelain", "-b"]).await;
        if !ErrorKind::Diverged.matches(&status.stdout) {
            debug!("SyncEngine::reconcile: branch not behind remote");
            return Reconciliation::UpToDate;
        }

        report::emit(Tag::Git, "local and remote branches diverged, merging");
        let merge = self
            .git
            .run(&["pull", "--no-rebase", "--no-edit", "--allow-unrelated-histories", remote, branch])
            .await;
        if merge.success() {
            report::emit(Tag::Ok, "merged remote changes");
            return Reconciliation::Merged;
        }
        debug!(error = %merge.diagnostic(), "SyncEngine::reconcile: merge pull failed");
        let _ = self.git.run(&["merge", "--abort"]).await;

        report::emit(Tag::Retry, "merge failed, trying rebase");
        let rebase = self
            .git
            .run(&["pull", "--rebase", "--allow-unrelated-histories", remote, branch])
            .await;
        if rebase.success() {
            report::emit(Tag::Ok, "rebased onto remote changes");
            return Reconciliation::Rebased;
        }
        let _ = self.git.run(&["rebase", "--abort"]).await;

        if ErrorKind::UnrelatedHistories.matches(&rebase.stderr) {
            report::emit(Tag::Warn, "local and remote histories are unrelated");
            report::emit(
                Tag::Hint,
                format!("run manually: git pull --allow-unrelated-histories {} {}", remote, branch),
            );
            Reconciliation::UnrelatedHistories
        } else {
            report::emit(Tag::Warn, "could not merge remote changes automatically");
            report::emit(Tag::Error, rebase.diagnostic());
            Reconciliation::Failed
        }
    }

    /// Stage 8: push, falling back to a plain push, then diagnose
    async fn push(&self, branch: &str) -> SyncOutcome {
        let remote = self.config.remote.as_str();
        report::emit(Tag::Git, format!("pushing to {}/{}", remote, branch));

        if self.git.run(&["push", "-u", remote, branch]).await.success() {
            return SyncOutcome::CommittedAndPushed;
        }
        if self.git.run(&["push", remote, branch]).await.success() {
            return SyncOutcome::CommittedAndPushed;
        }

        let diagnostic = self.git.run(&["push", remote, branch]).await;
        if diagnostic.success() {
            return SyncOutcome::CommittedAndPushed;
        }

        let message = diagnostic.diagnostic().to_string();
        if ErrorKind::NonFastForward.matches(&diagnostic.stderr) {
            SyncOutcome::PushFailedDivergent { message }
        } else {
            SyncOutcome::PushFailedOther { message }
        }
    }

    fn report_outcome(&self, outcome: &SyncOutcome) {
        match outcome {
            SyncOutcome::NoChanges => report::emit(Tag::Info, "no changes to commit"),
            SyncOutcome::CommittedAndPushed => report::emit(Tag::Ok, "changes pushed"),
            SyncOutcome::CommitFailed { .. } => report::emit(Tag::Error, "could not create a commit"),
            SyncOutcome::PushFailedDivergent { .. } => {
                report::emit(Tag::Error, "the remote has changes that are missing locally")
            }
            SyncOutcome::PushFailedOther { message } => {
                report::emit(Tag::Error, format!("could not push changes: {}", message))
            }
        }
        for hint in outcome.hints(&self.config.remote, &self.config.branch) {
            report::emit(Tag::Hint, hint);
        }
    }
}

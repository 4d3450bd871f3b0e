//! Error-text classification for git failures
//!
//! Git reports failures as free text, so every decision the sync engine makes
//! about a failed command is driven by this one substring table.

use std::fmt;

/// Category of a git failure, derived from its output text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A ref lock on HEAD could not be taken, or HEAD stopped resolving mid-operation
    HeadLock,
    /// Histories share no common ancestor
    UnrelatedHistories,
    /// Push refused because the remote has commits we lack
    NonFastForward,
    /// Local branch is behind or has diverged from its upstream
    Diverged,
    /// HEAD cannot be resolved to a branch
    UnresolvedHead,
}

/// Lowercase substrings and the kind each one indicates.
///
/// Entries are ordered most specific first; `classify` returns the first hit.
pub const CLASSIFICATION_TABLE: &[(&str, ErrorKind)] = &[
    ("cannot lock ref 'head'", ErrorKind::HeadLock),
    ("unable to resolve reference", ErrorKind::HeadLock),
    ("unrelated histories", ErrorKind::UnrelatedHistories),
    ("non-fast-forward", ErrorKind::NonFastForward),
    ("rejected", ErrorKind::NonFastForward),
    ("diverged", ErrorKind::Diverged),
    ("behind", ErrorKind::Diverged),
    ("unable to resolve", ErrorKind::UnresolvedHead),
    ("fatal", ErrorKind::UnresolvedHead),
];

impl ErrorKind {
    /// Check whether `text` contains any substring mapped to this kind
    pub fn matches(self, text: &str) -> bool {
        let lowered = text.to_lowercase();
        CLASSIFICATION_TABLE
            .iter()
            .any(|(needle, kind)| *kind == self && lowered.contains(needle))
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::HeadLock => "head-lock",
            Self::UnrelatedHistories => "unrelated-histories",
            Self::NonFastForward => "non-fast-forward",
            Self::Diverged => "diverged",
            Self::UnresolvedHead => "unresolved-head",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Classify `text` by the first matching table entry
pub fn classify(text: &str) -> Option<ErrorKind> {
    let lowered = text.to_lowercase();
    CLASSIFICATION_TABLE
        .iter()
        .find(|(needle, _)| lowered.contains(needle))
        .map(|(_, kind)| *kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_needles_are_lowercase() {
        for (needle, _) in CLASSIFICATION_TABLE {
            assert_eq!(*needle, needle.to_lowercase());
        }
    }

    #[test]
    fn test_head_lock_is_case_insensitive() {
        let stderr = "fatal: cannot lock ref 'HEAD': unable to resolve reference 'refs/heads/main'";
        assert!(ErrorKind::HeadLock.matches(stderr));
        assert!(ErrorKind::HeadLock.matches("FATAL: CANNOT LOCK REF 'HEAD'"));
        assert_eq!(classify(stderr), Some(ErrorKind::HeadLock));
    }

    #[test]
    fn test_push_rejections() {
        let stderr = " ! [rejected]        main -> main (fetch first)\nerror: failed to push some refs";
        assert!(ErrorKind::NonFastForward.matches(stderr));
        assert!(ErrorKind::NonFastForward.matches("Updates were rejected because of a NON-FAST-FORWARD"));
        assert!(!ErrorKind::NonFastForward.matches("fatal: 'origin' does not appear to be a git repository"));
    }

    #[test]
    fn test_diverged_status() {
        assert!(ErrorKind::Diverged.matches("## main...origin/main [ahead 1, behind 2]"));
        assert!(ErrorKind::Diverged.matches("Your branch and 'origin/main' have Diverged"));
        assert!(!ErrorKind::Diverged.matches("## main...origin/main [ahead 1]"));
    }

    #[test]
    fn test_specific_entries_win_over_fatal() {
        assert_eq!(
            classify("fatal: refusing to merge unrelated histories"),
            Some(ErrorKind::UnrelatedHistories)
        );
        assert_eq!(classify("fatal: ref HEAD is not a symbolic ref"), Some(ErrorKind::UnresolvedHead));
        assert_eq!(classify("everything up-to-date"), None);
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(ErrorKind::NonFastForward.to_string(), "non-fast-forward");
        assert_eq!(ErrorKind::HeadLock.to_string(), "head-lock");
    }
}

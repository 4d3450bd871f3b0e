//! HEAD repair through direct metadata surgery
//!
//! When git itself can no longer resolve HEAD, the only way back is to edit
//! the files under `.git` by hand. This module is the single place that does
//! so: it validates (and if corrupt, deletes) the default branch's ref file,
//! and points `HEAD` back at that branch.

use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::repo::{RepoError, RepositoryHandle};

/// Shortest object-id prefix accepted as ref content
pub const MIN_REF_LEN: usize = 7;

/// Check whether ref file content looks like an object id
///
/// Content is trimmed and lowercased; it must be at least [`MIN_REF_LEN`]
/// characters, all in `0-9a-f`.
pub fn is_valid_ref_content(content: &str) -> bool {
    let trimmed = content.trim();
    trimmed.chars().count() >= MIN_REF_LEN
        && trimmed
            .chars()
            .map(|c| c.to_ascii_lowercase())
            .all(|c| matches!(c, '0'..='9' | 'a'..='f'))
}

/// State of the branch ref file after validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefState {
    /// No ref file (unborn branch)
    Missing,
    /// Ref file holds an object id and was left alone
    Valid,
    /// Ref file was corrupt and has been deleted
    Removed,
}

/// What a repair pass changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepairReport {
    pub ref_state: RefState,
    pub head_rewritten: bool,
}

impl RepairReport {
    /// True when the pass mutated anything on disk
    pub fn changed(&self) -> bool {
        self.head_rewritten || self.ref_state == RefState::Removed
    }
}

/// Repairs HEAD for one repository and one default branch
#[derive(Debug, Clone)]
pub struct HeadRepair {
    git_dir: PathBuf,
    branch: String,
}

impl HeadRepair {
    pub fn new(git_dir: impl Into<PathBuf>, branch: impl Into<String>) -> Self {
        Self {
            git_dir: git_dir.into(),
            branch: branch.into(),
        }
    }

    pub fn for_repo(repo: &RepositoryHandle, branch: impl Into<String>) -> Self {
        Self::new(repo.git_dir(), branch)
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// Path of the default branch's ref file
    pub fn ref_path(&self) -> PathBuf {
        self.git_dir.join("refs").join("heads").join(&self.branch)
    }

    pub fn head_path(&self) -> PathBuf {
        self.git_dir.join("HEAD")
    }

    /// Content HEAD must hold to point at the default branch
    pub fn head_content(&self) -> String {
        format!("ref: refs/heads/{}\n", self.branch)
    }

    /// Delete the branch ref file if its content is not an object id
    pub async fn prune_invalid_ref(&self) -> Result<RefState, RepoError> {
        let path = self.ref_path();
        debug!(?path, "HeadRepair::prune_invalid_ref: called");

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == IoErrorKind::NotFound => {
                debug!("HeadRepair::prune_invalid_ref: no ref file");
                return Ok(RefState::Missing);
            }
            Err(e) => return Err(RepoError::io(&path, e)),
        };

        let content = String::from_utf8_lossy(&bytes);
        if is_valid_ref_content(&content) {
            debug!("HeadRepair::prune_invalid_ref: ref content valid");
            return Ok(RefState::Valid);
        }

        info!(?path, content = %content.trim(), "Removing corrupt branch ref");
        remove_if_present(&path).await?;
        Ok(RefState::Removed)
    }

    /// Point HEAD at the default branch; returns whether the file changed
    pub async fn write_head(&self) -> Result<bool, RepoError> {
        let path = self.head_path();
        let wanted = self.head_content();
        debug!(?path, "HeadRepair::write_head: called");

        match tokio::fs::read_to_string(&path).await {
            Ok(current) if current == wanted => {
                debug!("HeadRepair::write_head: HEAD already points at default branch");
                return Ok(false);
            }
            Ok(_) => {}
            Err(e) if matches!(e.kind(), IoErrorKind::NotFound | IoErrorKind::InvalidData) => {}
            Err(e) => return Err(RepoError::io(&path, e)),
        }

        tokio::fs::write(&path, wanted).await.map_err(|e| RepoError::io(&path, e))?;
        info!(branch = %self.branch, "HEAD rewritten");
        Ok(true)
    }

    /// Full repair pass: prune a corrupt ref, then point HEAD at the branch
    pub async fn repair(&self) -> Result<RepairReport, RepoError> {
        debug!(branch = %self.branch, "HeadRepair::repair: called");
        let ref_state = self.prune_invalid_ref().await?;
        let head_rewritten = self.write_head().await?;
        Ok(RepairReport {
            ref_state,
            head_rewritten,
        })
    }
}

async fn remove_if_present(path: &Path) -> Result<(), RepoError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == IoErrorKind::NotFound => Ok(()),
        Err(e) => Err(RepoError::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::{TempDir, tempdir};

    fn synthetic_git_dir() -> TempDir {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("refs").join("heads")).unwrap();
        dir
    }

    #[test]
    fn test_ref_content_validation() {
        assert!(!is_valid_ref_content(""));
        assert!(!is_valid_ref_content("   "));
        assert!(!is_valid_ref_content("abc"));
        assert!(!is_valid_ref_content("12G4ab7"));
        assert!(!is_valid_ref_content("ref: refs/heads/main"));
        assert!(is_valid_ref_content("a1b2c3d"));
        assert!(is_valid_ref_content("A1B2C3D\n"));
        assert!(is_valid_ref_content("  0123456789abcdef0123456789abcdef01234567\n"));
    }

    #[tokio::test]
    async fn test_prune_removes_corrupt_refs() {
        for content in ["", "   ", "abc", "12G4ab7"] {
            let dir = synthetic_git_dir();
            let repair = HeadRepair::new(dir.path(), "main");
            std::fs::write(repair.ref_path(), content).unwrap();

            let state = repair.prune_invalid_ref().await.unwrap();
            assert_eq!(state, RefState::Removed, "content {:?}", content);
            assert!(!repair.ref_path().exists());
        }
    }

    #[tokio::test]
    async fn test_prune_keeps_valid_ref() {
        let dir = synthetic_git_dir();
        let repair = HeadRepair::new(dir.path(), "main");
        std::fs::write(repair.ref_path(), "a1b2c3d4e5\n").unwrap();

        assert_eq!(repair.prune_invalid_ref().await.unwrap(), RefState::Valid);
        assert_eq!(std::fs::read_to_string(repair.ref_path()).unwrap(), "a1b2c3d4e5\n");
    }

    #[tokio::test]
    async fn test_prune_missing_ref() {
        let dir = synthetic_git_dir();
        let repair = HeadRepair::new(dir.path(), "main");
        assert_eq!(repair.prune_invalid_ref().await.unwrap(), RefState::Missing);
    }

    #[tokio::test]
    async fn test_write_head_rewrites_garbage() {
        let dir = synthetic_git_dir();
        let repair = HeadRepair::new(dir.path(), "main");
        std::fs::write(repair.head_path(), "deadbeef\n").unwrap();

        assert!(repair.write_head().await.unwrap());
        assert_eq!(
            std::fs::read_to_string(repair.head_path()).unwrap(),
            "ref: refs/heads/main\n"
        );
    }

    #[tokio::test]
    async fn test_write_head_creates_missing_file() {
        let dir = synthetic_git_dir();
        let repair = HeadRepair::new(dir.path(), "trunk");

        assert!(repair.write_head().await.unwrap());
        assert_eq!(
            std::fs::read_to_string(repair.head_path()).unwrap(),
            "ref: refs/heads/trunk\n"
        );
    }

    #[tokio::test]
    async fn test_repair_is_idempotent() {
        let dir = synthetic_git_dir();
        let repair = HeadRepair::new(dir.path(), "main");
        std::fs::write(repair.head_path(), "").unwrap();
        std::fs::write(repair.ref_path(), "abc").unwrap();

        let first = repair.repair().await.unwrap();
        assert!(first.changed());
        assert_eq!(first.ref_state, RefState::Removed);
        assert!(first.head_rewritten);

        let modified = std::fs::metadata(repair.head_path()).unwrap().modified().unwrap();
        let second = repair.repair().await.unwrap();
        assert!(!second.changed());
        assert_eq!(second.ref_state, RefState::Missing);
        assert_eq!(
            std::fs::metadata(repair.head_path()).unwrap().modified().unwrap(),
            modified
        );
        assert_eq!(
            std::fs::read_to_string(repair.head_path()).unwrap(),
            "ref: refs/heads/main\n"
        );
    }

    proptest! {
        #[test]
        fn prop_hex_of_seven_or_more_is_valid(s in "[0-9a-fA-F]{7,64}") {
            prop_assert!(is_valid_ref_content(&s));
        }

        #[test]
        fn prop_short_content_is_invalid(s in "[0-9a-f]{0,6}") {
            prop_assert!(!is_valid_ref_content(&s));
        }

        #[test]
        fn prop_non_hex_character_is_invalid(prefix in "[0-9a-f]{3,10}", bad in "[g-zG-Z]", suffix in "[0-9a-f]{3,10}") {
            let content = format!("{}{}{}", prefix, bad, suffix);
            prop_assert!(!is_valid_ref_content(&content));
        }
    }
}

//! Repository location and startup validation

use std::path::{Path, PathBuf};

use tracing::debug;

/// Name of the metadata directory every watched repository must have
pub const GIT_DIR_NAME: &str = ".git";

/// Errors raised while locating or touching repository metadata
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("Not a git repository: {0} (no .git directory)")]
    NotARepository(PathBuf),

    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RepoError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Working tree root plus its `.git` directory
///
/// All git commands run with `root` as their working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryHandle {
    root: PathBuf,
    git_dir: PathBuf,
}

impl RepositoryHandle {
    /// Open the repository at `root`, failing if it has no metadata directory
    pub fn open(root: impl AsRef<Path>) -> Result<Self, RepoError> {
        let root = root.as_ref();
        debug!(?root, "RepositoryHandle::open: called");
        let root = root.canonicalize().map_err(|e| RepoError::io(root, e))?;
        let git_dir = root.join(GIT_DIR_NAME);

        if !git_dir.exists() {
            debug!(?git_dir, "RepositoryHandle::open: metadata directory missing");
            return Err(RepoError::NotARepository(root));
        }

        Ok(Self { root, git_dir })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }
}

use git2::Repository;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::git2_backend::{self as backend, LogEntry, PullOutcome};
use crate::config::Identity;
use crate::error::{Error, Result};

/// File written into otherwise empty directories so they are tracked.
pub const EMPTY_DIR_MARKER: &str = ".empty";

/// What is found at a charm directory's path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirState {
    /// Nothing at the path.
    Absent,
    /// A directory without version control metadata.
    Uninitialized,
    /// A directory ready for snapshots.
    Initialized,
}

/// A directory whose whole content is versioned with git.
///
/// Every mutation of a deployed charm goes through a `GitDir`, so the
/// directory can always be inspected, snapshotted, and reverted to its last
/// commit. Dirty and conflicted state are recomputed from disk on each call,
/// since hooks may change files between calls.
///
/// A `GitDir` is only a path plus a commit identity. It must not be
/// mutated from more than one place at a time.
#[derive(Debug, Clone)]
pub struct GitDir {
    path: PathBuf,
    identity: Identity,
}

impl GitDir {
    /// Name a charm directory at `path`, committing as the default identity.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_identity(path, Identity::default())
    }

    pub fn with_identity(path: impl Into<PathBuf>, identity: Identity) -> Self {
        Self {
            path: path.into(),
            identity,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Inspect the path.
    ///
    /// # Errors
    /// [`Error::NotADirectory`] when something other than a directory
    /// occupies the path.
    pub fn state(&self) -> Result<DirState> {
        match fs::metadata(&self.path) {
            Ok(meta) if !meta.is_dir() => Err(Error::NotADirectory(self.path.clone())),
            Ok(_) => {
                if Repository::open(&self.path).is_ok() {
                    Ok(DirState::Initialized)
                } else {
                    Ok(DirState::Uninitialized)
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(DirState::Absent),
            Err(e) => Err(Error::io_at(&self.path, e)),
        }
    }

    /// True when the directory exists and is initialized.
    pub fn exists(&self) -> Result<bool> {
        Ok(self.state()? == DirState::Initialized)
    }

    /// Create the directory if needed and initialize it.
    ///
    /// Idempotent: an already initialized directory keeps its history.
    pub fn init(&self) -> Result<()> {
        if let Ok(meta) = fs::metadata(&self.path)
            && !meta.is_dir()
        {
            return Err(Error::NotADirectory(self.path.clone()));
        }
        fs::create_dir_all(&self.path).map_err(|e| Error::io_at(&self.path, e))?;
        backend::init(&self.path, &self.identity)?;
        info!(path = %self.path.display(), "initialized charm directory");
        Ok(())
    }

    /// Open the repository, failing descriptively if it is not there.
    fn open(&self) -> Result<Repository> {
        match self.state()? {
            DirState::Absent => Err(Error::Missing(self.path.clone())),
            DirState::Uninitialized => Err(Error::NotInitialized(self.path.clone())),
            DirState::Initialized => Ok(Repository::open(&self.path)?),
        }
    }

    fn ensure_not_conflicted(&self, repo: &Repository) -> Result<()> {
        if backend::is_conflicted(repo)? {
            return Err(Error::Conflicted(self.path.clone()));
        }
        Ok(())
    }

    /// Stage the whole working tree for the next commit.
    ///
    /// Empty directories get an `.empty` file first so they survive.
    /// Refused while conflicted: staging would mark conflicts resolved.
    pub fn stage_all(&self) -> Result<()> {
        let repo = self.open()?;
        self.ensure_not_conflicted(&repo)?;
        self.mark_empty_dirs()?;
        backend::stage_all(&repo)
    }

    fn mark_empty_dirs(&self) -> Result<()> {
        let walker = WalkDir::new(&self.path)
            .min_depth(1)
            .into_iter()
            .filter_entry(|e| e.file_name() != ".git");
        for entry in walker {
            let entry = entry.map_err(io::Error::from)?;
            if entry.file_type().is_dir() && fs::read_dir(entry.path())?.next().is_none() {
                debug!(dir = %entry.path().display(), "preserving empty directory");
                fs::write(entry.path().join(EMPTY_DIR_MARKER), b"")?;
            }
        }
        Ok(())
    }

    /// Commit what is staged.
    ///
    /// # Errors
    /// - [`Error::EmptyMessage`] for a blank message.
    /// - [`Error::Conflicted`] while a merge has unresolved conflicts.
    /// - [`Error::NothingToCommit`] when nothing changed since the last commit.
    pub fn commit(&self, message: &str) -> Result<()> {
        if message.trim().is_empty() {
            return Err(Error::EmptyMessage);
        }
        let mut repo = self.open()?;
        self.ensure_not_conflicted(&repo)?;
        backend::commit(&mut repo, message)?;
        info!(path = %self.path.display(), msg = message, "committed");
        Ok(())
    }

    /// Stage everything and commit it in one step.
    pub fn snapshot(&self, message: &str) -> Result<()> {
        if message.trim().is_empty() {
            return Err(Error::EmptyMessage);
        }
        self.stage_all()?;
        self.commit(message)
    }

    /// Finish a conflicted merge after its files were fixed by hand.
    ///
    /// Stages everything, which marks the conflicts resolved, and records
    /// the merge commit.
    pub fn resolve(&self, message: &str) -> Result<()> {
        if message.trim().is_empty() {
            return Err(Error::EmptyMessage);
        }
        let mut repo = self.open()?;
        self.mark_empty_dirs()?;
        backend::stage_all(&repo)?;
        backend::commit(&mut repo, message)?;
        info!(path = %self.path.display(), "conflict resolved");
        Ok(())
    }

    /// True if the working tree differs from the last commit.
    pub fn is_dirty(&self) -> Result<bool> {
        backend::is_dirty(&self.open()?)
    }

    /// True if a merge with unresolved conflicts is in progress.
    pub fn is_conflicted(&self) -> Result<bool> {
        backend::is_conflicted(&self.open()?)
    }

    /// Commit history, newest first.
    pub fn history(&self) -> Result<Vec<LogEntry>> {
        backend::history(&self.open()?)
    }

    /// Clone the last committed state into `dst` and return a handle to it.
    ///
    /// Only history is copied: the new working tree starts empty, so the
    /// clone is dirty until it is snapshotted.
    pub fn clone_to(&self, dst: impl Into<PathBuf>) -> Result<GitDir> {
        self.open()?;
        let target = GitDir::with_identity(dst, self.identity.clone());
        if target.state()? == DirState::Absent {
            fs::create_dir_all(&target.path).map_err(|e| Error::io_at(&target.path, e))?;
        }
        backend::clone_bare_tree(&self.path, &target.path, &self.identity)?;
        info!(
            src = %self.path.display(),
            dst = %target.path.display(),
            "cloned charm directory"
        );
        Ok(target)
    }

    /// Merge `source`'s committed history into this directory.
    ///
    /// # Errors
    /// - [`Error::Conflict`] when the merge stopped on conflicts; the working
    ///   tree keeps the conflict markers until [`GitDir::revert`].
    /// - [`Error::Conflicted`] when an earlier conflict is still unresolved.
    /// - Any other variant when the pull could not be attempted.
    pub fn pull(&self, source: &GitDir) -> Result<PullOutcome> {
        let mut repo = self.open()?;
        self.ensure_not_conflicted(&repo)?;
        source.open()?;
        match backend::merge_from(&mut repo, &source.path) {
            Ok(outcome) => {
                info!(
                    path = %self.path.display(),
                    source = %source.path.display(),
                    ?outcome,
                    "pulled"
                );
                Ok(outcome)
            }
            Err(Error::Conflict) => {
                warn!(
                    path = %self.path.display(),
                    source = %source.path.display(),
                    "pull stopped on merge conflicts"
                );
                Err(Error::Conflict)
            }
            Err(e) => Err(e),
        }
    }

    /// Discard uncommitted changes and any conflicted merge.
    pub fn revert(&self) -> Result<()> {
        let repo = self.open()?;
        backend::reset_hard(&repo, &self.path)?;
        info!(path = %self.path.display(), "reverted to last commit");
        Ok(())
    }
}

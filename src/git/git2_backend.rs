use git2::{
    AnnotatedCommit, Commit, ConfigLevel, ErrorCode, IndexAddOption, Oid, Repository, ResetType,
    Sort, Status, StatusOptions,
    build::{CheckoutBuilder, RepoBuilder},
};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

use crate::config::Identity;
use crate::error::{Error, Result};

/// Ref the source's HEAD is fetched into before merging.
const PULL_REF: &str = "refs/charmdir/pull-source";

/// One entry of a directory's commit history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Shortest unambiguous commit id, at least 7 hex characters.
    pub id: String,
    /// First line of the commit message.
    pub message: String,
}

impl std::fmt::Display for LogEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.id, self.message)
    }
}

/// How a successful pull changed the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullOutcome {
    /// The source had nothing new.
    UpToDate,
    /// HEAD moved to the source's commit without a merge.
    FastForward,
    /// A merge commit joining both histories was recorded.
    Merged,
}

fn is_unborn(e: &git2::Error) -> bool {
    matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound)
}

/// The commit HEAD points at, or `None` before the first commit.
fn head_commit(repo: &Repository) -> Result<Option<Commit<'_>>> {
    match repo.head() {
        Ok(head) => Ok(Some(head.peel_to_commit()?)),
        Err(e) if is_unborn(&e) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Pin the commit identity in the repository's local config.
fn set_identity(repo: &Repository, identity: &Identity) -> Result<()> {
    let mut cfg = repo.config()?.open_level(ConfigLevel::Local)?;
    cfg.set_str("user.name", &identity.name)?;
    cfg.set_str("user.email", &identity.email)?;
    Ok(())
}

/// Initialize (or re-initialize) version control metadata in `path`.
///
/// Re-initializing an existing repository leaves its history untouched.
pub fn init(path: &Path, identity: &Identity) -> Result<Repository> {
    let repo = Repository::init(path)?;
    set_identity(&repo, identity)?;
    Ok(repo)
}

/// Clone `src` into `dst` without checking out a working tree.
///
/// `dst` starts with the source's history and an empty working tree, so
/// it reads as dirty until the next snapshot records what is actually there.
pub fn clone_bare_tree(src: &Path, dst: &Path, identity: &Identity) -> Result<Repository> {
    let url = src
        .to_str()
        .ok_or_else(|| git2::Error::from_str("source path is not valid UTF-8"))?;
    let mut checkout = CheckoutBuilder::new();
    checkout.dry_run();
    let repo = RepoBuilder::new().with_checkout(checkout).clone(url, dst)?;
    set_identity(&repo, identity)?;
    Ok(repo)
}

/// Stage every change in the working tree, including additions and removals.
pub fn stage_all(repo: &Repository) -> Result<()> {
    let mut index = repo.index()?;
    index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
    index.update_all(["*"].iter(), None)?;
    index.write()?;
    Ok(())
}

/// Heads recorded by an in-progress merge (`MERGE_HEAD`).
fn merge_heads(repo: &mut Repository) -> Result<Vec<Oid>> {
    let mut oids = Vec::new();
    match repo.mergehead_foreach(|oid| {
        oids.push(*oid);
        true
    }) {
        Ok(()) => Ok(oids),
        Err(e) if e.code() == ErrorCode::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

/// Record the staged content as a new commit on HEAD.
///
/// Pending merge heads become extra parents and the merge state is cleared.
/// Without a merge in progress, a tree identical to HEAD's is rejected
/// with [`Error::NothingToCommit`].
pub fn commit(repo: &mut Repository, message: &str) -> Result<Oid> {
    let merging = merge_heads(repo)?;
    let repo = &*repo;
    let mut index = repo.index()?;
    let tree_id = index.write_tree()?;
    let tree = repo.find_tree(tree_id)?;
    let parent = head_commit(repo)?;

    if merging.is_empty() {
        let unchanged = match &parent {
            Some(p) => p.tree_id() == tree_id,
            None => tree.is_empty(),
        };
        if unchanged {
            return Err(Error::NothingToCommit);
        }
    }

    let mut parents: Vec<Commit<'_>> = parent.into_iter().collect();
    for oid in &merging {
        parents.push(repo.find_commit(*oid)?);
    }
    let parent_refs: Vec<&Commit<'_>> = parents.iter().collect();

    let sig = repo.signature()?;
    let oid = repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parent_refs)?;
    if !merging.is_empty() {
        repo.cleanup_state()?;
    }
    debug!(%oid, "committed");
    Ok(oid)
}

/// True if the working tree or index differs from HEAD, untracked files included.
pub fn is_dirty(repo: &Repository) -> Result<bool> {
    let mut opts = StatusOptions::new();
    opts.include_untracked(true)
        .recurse_untracked_dirs(true)
        .include_ignored(false)
        .exclude_submodules(true);
    Ok(!repo.statuses(Some(&mut opts))?.is_empty())
}

/// True if the index holds unresolved merge conflicts.
pub fn is_conflicted(repo: &Repository) -> Result<bool> {
    Ok(repo.index()?.has_conflicts())
}

/// Commit history reachable from HEAD, newest first.
pub fn history(repo: &Repository) -> Result<Vec<LogEntry>> {
    if head_commit(repo)?.is_none() {
        return Ok(Vec::new());
    }
    let mut walk = repo.revwalk()?;
    walk.push_head()?;
    walk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME)?;

    let mut entries = Vec::new();
    for oid in walk {
        let commit = repo.find_commit(oid?)?;
        let short = commit.as_object().short_id()?;
        entries.push(LogEntry {
            id: short.as_str().unwrap_or_default().to_string(),
            message: commit.summary().unwrap_or_default().to_string(),
        });
    }
    Ok(entries)
}

/// Fetch the committed HEAD of the repository at `src` into `repo`.
fn fetch_source<'r>(repo: &'r Repository, src: &Path) -> Result<AnnotatedCommit<'r>> {
    let src_repo = Repository::open(src)?;
    let src_head = src_repo.head()?;
    let src_ref = src_head
        .name()
        .ok_or_else(|| git2::Error::from_str("source HEAD has a non UTF-8 name"))?;
    let url = src
        .to_str()
        .ok_or_else(|| git2::Error::from_str("source path is not valid UTF-8"))?;

    let mut remote = repo.remote_anonymous(url)?;
    remote.fetch(&[format!("+{}:{}", src_ref, PULL_REF)], None, None)?;
    let oid = repo.refname_to_id(PULL_REF)?;
    Ok(repo.find_annotated_commit(oid)?)
}

/// Where applying the source left the repository.
enum Applied {
    Done(PullOutcome),
    /// The tree was merged cleanly; the merge commit is still to be written.
    NeedsCommit(Oid),
    /// The merge stopped with conflicts recorded in the index.
    Conflicted,
}

/// Merge the committed state of `src` into `repo`.
///
/// On unresolved conflicts the merge is left in progress, conflict markers
/// are written to the working tree where possible, and [`Error::Conflict`]
/// is returned.
pub fn merge_from(repo: &mut Repository, src: &Path) -> Result<PullOutcome> {
    match apply_source(repo, src)? {
        Applied::Done(outcome) => Ok(outcome),
        Applied::Conflicted => Err(Error::Conflict),
        Applied::NeedsCommit(theirs) => {
            let message = format!("Merge {} from {}", theirs, src.display());
            commit(repo, &message)?;
            Ok(PullOutcome::Merged)
        }
    }
}

fn apply_source(repo: &Repository, src: &Path) -> Result<Applied> {
    let theirs = fetch_source(repo, src)?;
    let (analysis, _) = repo.merge_analysis(&[&theirs])?;

    if analysis.is_up_to_date() {
        return Ok(Applied::Done(PullOutcome::UpToDate));
    }

    let target = repo.find_commit(theirs.id())?;
    if analysis.is_unborn() || analysis.is_fast_forward() {
        let mut checkout = CheckoutBuilder::new();
        checkout.safe();
        repo.checkout_tree(target.as_object(), Some(&mut checkout))?;

        let head = repo.find_reference("HEAD")?;
        let branch = head
            .symbolic_target()
            .ok_or_else(|| git2::Error::from_str("HEAD is detached"))?
            .to_string();
        let reflog = format!("pull: fast-forward from {}", src.display());
        repo.reference(&branch, target.id(), true, &reflog)?;
        return Ok(Applied::Done(PullOutcome::FastForward));
    }

    // A file replacing a directory makes checkout fail halfway, so
    // conflicts are found on the trees first. Conflicted paths are then
    // left out of the checkout and get their markers afterwards.
    let ours = repo.head()?.peel_to_commit()?;
    if repo.merge_commits(&ours, &target, None)?.has_conflicts() {
        let mut checkout = CheckoutBuilder::new();
        checkout.safe().allow_conflicts(true).skip_unmerged(true);
        repo.merge(&[&theirs], None, Some(&mut checkout))?;

        let mut markers = CheckoutBuilder::new();
        markers.safe().allow_conflicts(true).conflict_style_merge(true);
        if let Err(e) = repo.checkout_index(None, Some(&mut markers)) {
            debug!(error = %e, "conflicting paths left as they were");
        }
        return Ok(Applied::Conflicted);
    }

    let mut checkout = CheckoutBuilder::new();
    checkout.safe();
    repo.merge(&[&theirs], None, Some(&mut checkout))?;
    if is_conflicted(repo)? {
        return Ok(Applied::Conflicted);
    }
    Ok(Applied::NeedsCommit(theirs.id()))
}

/// Reset index and working tree to HEAD and drop any in-progress merge.
///
/// Untracked files are removed along with directories left empty.
pub fn reset_hard(repo: &Repository, workdir: &Path) -> Result<()> {
    match head_commit(repo)? {
        Some(head) => {
            let mut checkout = CheckoutBuilder::new();
            checkout.force();
            repo.reset(head.as_object(), ResetType::Hard, Some(&mut checkout))?;
        }
        None => {
            let mut index = repo.index()?;
            index.clear()?;
            index.write()?;
        }
    }
    repo.cleanup_state()?;
    remove_untracked(repo, workdir)?;
    remove_empty_dirs(workdir)?;
    Ok(())
}

/// Delete everything the index does not know about. Untracked directories
/// are reported, and removed, as a whole.
fn remove_untracked(repo: &Repository, workdir: &Path) -> Result<()> {
    let mut opts = StatusOptions::new();
    opts.include_untracked(true)
        .recurse_untracked_dirs(false)
        .include_ignored(false)
        .exclude_submodules(true);
    let untracked: Vec<PathBuf> = repo
        .statuses(Some(&mut opts))?
        .iter()
        .filter(|e| e.status().contains(Status::WT_NEW))
        .filter_map(|e| e.path().map(|p| workdir.join(p)))
        .collect();

    for path in untracked {
        let meta = match fs::symlink_metadata(&path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e.into()),
        };
        if meta.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
        debug!(path = %path.display(), "removed untracked");
    }
    Ok(())
}

/// Remove directories under `root` that contain nothing, deepest first.
fn remove_empty_dirs(root: &Path) -> Result<()> {
    let walker = WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_entry(|e| e.file_name() != ".git");
    let mut dirs = Vec::new();
    for entry in walker {
        let entry = entry.map_err(io::Error::from)?;
        if entry.file_type().is_dir() {
            dirs.push(entry.into_path());
        }
    }
    // Pre-order reversed: children come before their parents.
    for dir in dirs.iter().rev() {
        if fs::read_dir(dir)?.next().is_none() {
            fs::remove_dir(dir)?;
        }
    }
    Ok(())
}


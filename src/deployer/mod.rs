//! Staging and deploying charms into a unit's charm directory.
//!
//! A deployer owns a data directory laid out as:
//!
//! ```text
//! <data>/current     -> update-<n>   (symlink to the staged charm)
//! <data>/update-<n>/                 (GitDir holding charm files + marker)
//! ```
//!
//! Staging builds a fresh `update-*` directory on top of the previous
//! staged history and swaps `current` over to it atomically. Deploying
//! pulls `current` into the unit's charm directory, so upgrades are merges
//! and local edits either merge cleanly or stop on a conflict.

mod cleanup;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{error, info, warn};
use walkdir::WalkDir;

use crate::charm::{CharmUrl, read_charm_url, write_charm_url};
use crate::config::Identity;
use crate::error::{Error, Result};
use crate::git::{GitDir, PullOutcome};

pub(crate) const UPDATE_PREFIX: &str = "update-";
const CURRENT: &str = "current";
const CURRENT_TMP: &str = ".current.tmp";

/// Message recorded when an operator marks an upgrade conflict resolved.
pub const RESOLVED_MESSAGE: &str = "Upgrade conflict resolved.";

pub struct Deployer {
    path: PathBuf,
    current: GitDir,
    identity: Identity,
}

impl Deployer {
    pub fn new(path: impl Into<PathBuf>, identity: Identity) -> Self {
        let path = path.into();
        let current = GitDir::with_identity(path.join(CURRENT), identity.clone());
        Self {
            path,
            current,
            identity,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The most recently staged charm.
    pub fn current(&self) -> &GitDir {
        &self.current
    }

    /// Url of the staged charm, `None` before anything was staged.
    pub fn staged_url(&self) -> Result<Option<CharmUrl>> {
        if !self.current.exists()? {
            return Ok(None);
        }
        match read_charm_url(&self.current) {
            Ok(url) => Ok(Some(url)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Url recorded in a deployed charm directory.
    pub fn deployed_url(target: &GitDir) -> Result<CharmUrl> {
        read_charm_url(target)
    }

    /// Make the charm files in `charm_dir` the ones the next deploy applies.
    ///
    /// Staging the url that is already staged does nothing.
    pub fn stage(&self, charm_dir: &Path, url: &CharmUrl) -> Result<()> {
        match fs::metadata(charm_dir) {
            Ok(meta) if !meta.is_dir() => return Err(Error::NotADirectory(charm_dir.into())),
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::Missing(charm_dir.into()));
            }
            Err(e) => return Err(Error::io_at(charm_dir, e)),
        }
        fs::create_dir_all(&self.path).map_err(|e| Error::io_at(&self.path, e))?;

        if self.staged_url()?.as_ref() == Some(url) {
            info!(%url, "charm already staged");
            return Ok(());
        }

        let update_path = self.new_update_path();
        let repo = if self.current.exists()? {
            self.current.clone_to(&update_path)?
        } else {
            let repo = GitDir::with_identity(&update_path, self.identity.clone());
            repo.init()?;
            repo
        };

        copy_tree(charm_dir, repo.path())?;
        write_charm_url(&repo, url)?;
        repo.snapshot(&format!(
            "Imported charm {} from {}.",
            url,
            charm_dir.display()
        ))?;

        let tmp = self.path.join(CURRENT_TMP);
        if fs::symlink_metadata(&tmp).is_ok() {
            fs::remove_file(&tmp)?;
        }
        std::os::unix::fs::symlink(&update_path, &tmp)?;
        fs::rename(&tmp, self.current.path())?;
        info!(%url, dir = %update_path.display(), "staged charm");

        cleanup::collect_orphans(&self.path, self.current.path());
        Ok(())
    }

    fn new_update_path(&self) -> PathBuf {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let mut n = 0u32;
        loop {
            let candidate = self
                .path
                .join(format!("{}{}-{}", UPDATE_PREFIX, stamp, n));
            if fs::symlink_metadata(&candidate).is_err() {
                return candidate;
            }
            n += 1;
        }
    }

    /// Apply the staged charm to `target`.
    ///
    /// A target that was never initialized is initialized first. Returns
    /// [`Error::Conflict`] when local changes clash with the upgrade; the
    /// target then waits for [`Deployer::notify_resolved`] or
    /// [`Deployer::notify_revert`].
    pub fn deploy(&self, target: &GitDir) -> Result<PullOutcome> {
        let result = self.deploy_staged(target);
        match &result {
            Ok(outcome) => {
                info!(target = %target.path().display(), ?outcome, "charm deployment succeeded")
            }
            Err(Error::Conflict) => {
                warn!(
                    target = %target.path().display(),
                    "charm deployment completed with conflicts"
                )
            }
            Err(e) => {
                error!(target = %target.path().display(), error = %e, "charm deployment failed")
            }
        }
        result
    }

    fn deploy_staged(&self, target: &GitDir) -> Result<PullOutcome> {
        if !self.current.exists()? {
            return Err(Error::NoCharmStaged(self.path.clone()));
        }
        if !target.exists()? {
            target.init()?;
        }
        target.pull(&self.current)
    }

    /// Record an operator's manual conflict resolution in `target`.
    pub fn notify_resolved(target: &GitDir) -> Result<()> {
        match target.resolve(RESOLVED_MESSAGE) {
            Err(Error::NothingToCommit) => Ok(()),
            other => other,
        }
    }

    /// Abandon a conflicted upgrade, returning `target` to its last commit.
    pub fn notify_revert(target: &GitDir) -> Result<()> {
        target.revert()
    }
}

/// Copy the contents of `src` into `dst`, skipping version control metadata.
fn copy_tree(src: &Path, dst: &Path) -> Result<()> {
    let walker = WalkDir::new(src)
        .min_depth(1)
        .into_iter()
        .filter_entry(|e| e.file_name() != ".git");
    for entry in walker {
        let entry = entry.map_err(std::io::Error::from)?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|_| Error::Missing(entry.path().into()))?;
        let out = dst.join(rel);
        let ft = entry.file_type();
        if ft.is_dir() {
            fs::create_dir_all(&out)?;
        } else if ft.is_symlink() {
            std::os::unix::fs::symlink(fs::read_link(entry.path())?, &out)?;
        } else {
            fs::copy(entry.path(), &out)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{TempDir, tempdir};

    fn charm(files: &[(&str, &str)]) -> TempDir {
        let td = tempdir().unwrap();
        for (name, body) in files {
            let p = td.path().join(name);
            fs::create_dir_all(p.parent().unwrap()).unwrap();
            fs::write(p, body).unwrap();
        }
        td
    }

    fn url(rev: u32) -> CharmUrl {
        format!("cs:series/app-{}", rev).parse().unwrap()
    }

    fn staging_dirs(root: &Path) -> usize {
        fs::read_dir(root)
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().starts_with(UPDATE_PREFIX))
            .count()
    }

    #[test]
    fn deploy_without_staging_fails() {
        let data = tempdir().unwrap();
        let unit = tempdir().unwrap();
        let d = Deployer::new(data.path(), Identity::default());
        let err = d.deploy(&GitDir::new(unit.path())).unwrap_err();
        assert!(matches!(err, Error::NoCharmStaged(_)), "{err:?}");
        assert_eq!(d.staged_url().unwrap(), None);
    }

    #[test]
    fn stage_rejects_missing_charm_dir() {
        let data = tempdir().unwrap();
        let d = Deployer::new(data.path(), Identity::default());
        let err = d.stage(&data.path().join("nope"), &url(1)).unwrap_err();
        assert!(matches!(err, Error::Missing(_)), "{err:?}");
    }

    #[test]
    fn install_then_upgrade() {
        let data = tempdir().unwrap();
        let unit_base = tempdir().unwrap();
        let unit = GitDir::new(unit_base.path().join("charm"));
        let d = Deployer::new(data.path(), Identity::default());

        let v1 = charm(&[("hooks/install", "v1"), ("config.yaml", "a"), ("old", "x")]);
        d.stage(v1.path(), &url(1)).unwrap();
        assert_eq!(d.staged_url().unwrap(), Some(url(1)));
        assert_eq!(d.deploy(&unit).unwrap(), PullOutcome::FastForward);
        assert_eq!(Deployer::deployed_url(&unit).unwrap(), url(1));
        assert_eq!(
            fs::read_to_string(unit.path().join("hooks/install")).unwrap(),
            "v1"
        );

        // Same url again is a no-op.
        d.stage(v1.path(), &url(1)).unwrap();
        assert_eq!(staging_dirs(data.path()), 1);

        let v2 = charm(&[("hooks/install", "v2"), ("config.yaml", "a")]);
        d.stage(v2.path(), &url(2)).unwrap();
        assert_eq!(staging_dirs(data.path()), 1);
        assert_eq!(d.current().history().unwrap().len(), 2);

        assert_eq!(d.deploy(&unit).unwrap(), PullOutcome::FastForward);
        assert_eq!(Deployer::deployed_url(&unit).unwrap(), url(2));
        assert_eq!(
            fs::read_to_string(unit.path().join("hooks/install")).unwrap(),
            "v2"
        );
        assert!(!unit.path().join("old").exists());
        assert!(!unit.is_dirty().unwrap());
    }

    #[test]
    fn conflicting_upgrade_can_be_reverted_or_resolved() {
        let data = tempdir().unwrap();
        let unit_td = tempdir().unwrap();
        let unit = GitDir::new(unit_td.path());
        let d = Deployer::new(data.path(), Identity::default());

        let v1 = charm(&[("config.yaml", "a")]);
        d.stage(v1.path(), &url(1)).unwrap();
        d.deploy(&unit).unwrap();

        fs::write(unit.path().join("config.yaml"), "local").unwrap();
        unit.snapshot("local edit").unwrap();

        let v2 = charm(&[("config.yaml", "b")]);
        d.stage(v2.path(), &url(2)).unwrap();
        assert!(d.deploy(&unit).unwrap_err().is_conflict());
        assert!(unit.is_conflicted().unwrap());

        Deployer::notify_revert(&unit).unwrap();
        assert!(!unit.is_conflicted().unwrap());
        assert_eq!(Deployer::deployed_url(&unit).unwrap(), url(1));
        assert_eq!(
            fs::read_to_string(unit.path().join("config.yaml")).unwrap(),
            "local"
        );

        assert!(d.deploy(&unit).unwrap_err().is_conflict());
        fs::write(unit.path().join("config.yaml"), "merged").unwrap();
        Deployer::notify_resolved(&unit).unwrap();
        assert!(!unit.is_conflicted().unwrap());
        assert!(!unit.is_dirty().unwrap());
        assert_eq!(Deployer::deployed_url(&unit).unwrap(), url(2));
        assert_eq!(unit.history().unwrap()[0].message, RESOLVED_MESSAGE);

        // Nothing left to resolve.
        Deployer::notify_resolved(&unit).unwrap();
        assert_eq!(d.deploy(&unit).unwrap(), PullOutcome::UpToDate);
    }
}

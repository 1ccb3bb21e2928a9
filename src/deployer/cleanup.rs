use std::fs;
use std::path::Path;
use tracing::{debug, warn};

use super::UPDATE_PREFIX;

/// Remove staging directories that `current` no longer points at.
///
/// A staging directory is an `update-*` entry directly under `root`. The
/// one `current` resolves to is kept; everything else is deleted. Failures
/// are logged and skipped so a stuck directory never blocks a deployment.
pub fn collect_orphans(root: &Path, current: &Path) {
    let keep = fs::canonicalize(current).ok();

    let rd = match fs::read_dir(root) {
        Ok(rd) => rd,
        Err(_) => return,
    };

    for ent in rd.flatten() {
        let name = ent.file_name().to_string_lossy().to_string();
        if !name.starts_with(UPDATE_PREFIX) {
            continue;
        }
        let path = ent.path();
        if keep.is_some() && keep == fs::canonicalize(&path).ok() {
            continue;
        }
        match fs::remove_dir_all(&path) {
            Ok(_) => debug!(dir = %path.display(), "removed orphaned staging directory"),
            Err(e) => warn!(dir = %path.display(), error = %e, "cannot remove staging directory"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;
    use tempfile::tempdir;

    #[test]
    fn keeps_current_and_unrelated_entries() {
        let td = tempdir().unwrap();
        let root = td.path();
        let live = root.join(format!("{}1", UPDATE_PREFIX));
        let stale = root.join(format!("{}2", UPDATE_PREFIX));
        fs::create_dir_all(live.join("inner")).unwrap();
        fs::create_dir_all(&stale).unwrap();
        fs::create_dir_all(root.join("other")).unwrap();
        symlink(&live, root.join("current")).unwrap();

        collect_orphans(root, &root.join("current"));

        assert!(live.join("inner").is_dir());
        assert!(!stale.exists());
        assert!(root.join("other").is_dir());
    }

    #[test]
    fn removes_everything_without_current() {
        let td = tempdir().unwrap();
        let stale = td.path().join(format!("{}x", UPDATE_PREFIX));
        fs::create_dir_all(&stale).unwrap();
        collect_orphans(td.path(), &td.path().join("current"));
        assert!(!stale.exists());
    }

    #[test]
    fn missing_root_is_ignored() {
        let td = tempdir().unwrap();
        let missing = td.path().join("nope");
        collect_orphans(&missing, &missing.join("current"));
    }
}

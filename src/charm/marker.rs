use std::fs;
use std::io::{self, Write};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{Error, Result};
use crate::git::GitDir;

use super::CharmUrl;

/// Name of the marker file recording the deployed charm.
pub const CHARM_URL_FILE: &str = ".juju-charm";

/// Write `url` to the marker file inside `dir`'s working tree.
///
/// The file is replaced atomically (temp file in the same directory, then
/// rename). Nothing is staged or committed: callers snapshot the marker
/// together with the charm files it describes.
pub fn write_charm_url(dir: &GitDir, url: &CharmUrl) -> Result<()> {
    let target = dir.path().join(CHARM_URL_FILE);
    let mut tmp = NamedTempFile::new_in(dir.path()).map_err(|e| Error::io_at(dir.path(), e))?;
    writeln!(tmp, "{}", url)?;
    tmp.persist(&target).map_err(|e| Error::io_at(&target, e.error))?;
    debug!(path = %target.display(), %url, "wrote charm url");
    Ok(())
}

/// Read the charm url recorded in `dir`.
///
/// # Errors
/// - [`Error::CharmUrlNotFound`] when the marker was never written.
/// - [`Error::InvalidCharmUrl`] when its content does not parse.
pub fn read_charm_url(dir: &GitDir) -> Result<CharmUrl> {
    let path = dir.path().join(CHARM_URL_FILE);
    let text = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(Error::CharmUrlNotFound(path));
        }
        Err(e) => return Err(Error::io_at(&path, e)),
    };
    Ok(text.trim().parse()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trips_through_a_second_handle() {
        let td = tempdir().unwrap();
        let dir = GitDir::new(td.path());
        let url: CharmUrl = "cs:series/blah-blah-123".parse().unwrap();

        write_charm_url(&dir, &url).unwrap();

        let raw = fs::read_to_string(td.path().join(CHARM_URL_FILE)).unwrap();
        assert_eq!(raw, "cs:series/blah-blah-123\n");

        let other = GitDir::new(td.path());
        assert_eq!(read_charm_url(&other).unwrap(), url);
    }

    #[test]
    fn missing_marker_is_not_found() {
        let td = tempdir().unwrap();
        let err = read_charm_url(&GitDir::new(td.path())).unwrap_err();
        assert!(err.is_not_found(), "{err:?}");
    }

    #[test]
    fn garbage_marker_is_a_parse_error() {
        let td = tempdir().unwrap();
        fs::write(td.path().join(CHARM_URL_FILE), "not a url\n").unwrap();
        let err = read_charm_url(&GitDir::new(td.path())).unwrap_err();
        assert!(matches!(err, Error::InvalidCharmUrl(_)), "{err:?}");
    }

    #[test]
    fn overwrite_leaves_no_temp_files() {
        let td = tempdir().unwrap();
        let dir = GitDir::new(td.path());
        let first: CharmUrl = "cs:series/app-1".parse().unwrap();
        write_charm_url(&dir, &first).unwrap();
        write_charm_url(&dir, &first.with_revision(2)).unwrap();

        assert_eq!(read_charm_url(&dir).unwrap().revision, Some(2));
        let names: Vec<_> = fs::read_dir(td.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from(CHARM_URL_FILE)]);
    }
}

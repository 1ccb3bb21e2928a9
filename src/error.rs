use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::charm::CharmUrlError;

/// Errors surfaced by charm directory operations.
///
/// [`Error::Conflict`] is the signal returned by a pull that stopped on
/// unresolved merge conflicts. Match on the variant, never on the message.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("{0:?} is not a directory")]
    NotADirectory(PathBuf),

    #[error("{path:?}: permission denied")]
    PermissionDenied {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{0:?} does not exist")]
    Missing(PathBuf),

    #[error("{0:?} is not an initialized charm directory")]
    NotInitialized(PathBuf),

    #[error("merge conflict")]
    Conflict,

    #[error("{0:?} has unresolved merge conflicts")]
    Conflicted(PathBuf),

    #[error("nothing to commit")]
    NothingToCommit,

    #[error("commit message must not be empty")]
    EmptyMessage,

    #[error("charm url marker not found: {0:?}")]
    CharmUrlNotFound(PathBuf),

    #[error(transparent)]
    InvalidCharmUrl(#[from] CharmUrlError),

    #[error("no charm staged in {0:?}")]
    NoCharmStaged(PathBuf),

    #[error(transparent)]
    Git(#[from] git2::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True for the merge-conflict signal returned by [`GitDir::pull`](crate::GitDir::pull).
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict)
    }

    /// True when the charm url marker has never been written.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::CharmUrlNotFound(_))
    }

    /// Classify an I/O error raised while touching `path`.
    pub(crate) fn io_at(path: impl Into<PathBuf>, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::PermissionDenied => Error::PermissionDenied {
                path: path.into(),
                source: err,
            },
            io::ErrorKind::NotADirectory => Error::NotADirectory(path.into()),
            _ => Error::Io(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_at_maps_permission_denied() {
        let err = Error::io_at("/x", io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(err, Error::PermissionDenied { .. }));
        assert!(err.to_string().ends_with("permission denied"));
    }

    #[test]
    fn io_at_keeps_other_kinds_generic() {
        let err = Error::io_at("/x", io::Error::from(io::ErrorKind::Other));
        assert!(matches!(err, Error::Io(_)));
        assert!(!err.is_conflict());
        assert!(!err.is_not_found());
    }

    #[test]
    fn not_a_directory_message_quotes_path() {
        let err = Error::NotADirectory(PathBuf::from("/base/repo"));
        assert_eq!(err.to_string(), r#""/base/repo" is not a directory"#);
    }
}

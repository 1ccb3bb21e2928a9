//! Versioned charm directories.
//!
//! [`GitDir`] is the public face of this module. The primitives it is built
//! from live in `git2_backend` (currently based on the `git2` crate) and are
//! not exported, so another backend could be swapped in without affecting
//! the rest of the codebase.

mod dir;
mod git2_backend;


pub use dir::{DirState, EMPTY_DIR_MARKER, GitDir};
pub use git2_backend::{LogEntry, PullOutcome};

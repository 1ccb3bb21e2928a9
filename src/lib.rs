//! Crate entry point for **charmdir**.
//!
//! Keeps a unit's charm directory in a consistent, recoverable state: every
//! change is snapshotted with git, upgrades are pulled in as merges, and a
//! conflicted or half-applied change can always be reverted to the last
//! commit.
//!
//! - [`GitDir`]: the versioned directory (init, snapshot, clone, pull, revert).
//! - [`charm`]: the `.juju-charm` marker naming the deployed charm.
//! - [`Deployer`]: stages charms and deploys them into a unit's directory.
//!
//! The `cmd_*` functions back the `charmdir` binary.

pub mod charm;
mod commands;
pub mod config;
mod deployer;
mod error;
mod git;
pub mod logging;
mod paths;

pub use charm::{CharmUrl, read_charm_url, write_charm_url};
pub use commands::*;
pub use config::{Config, Identity, load_config, load_config_from};
pub use deployer::{Deployer, RESOLVED_MESSAGE};
pub use error::{Error, Result};
pub use git::{DirState, EMPTY_DIR_MARKER, GitDir, LogEntry, PullOutcome};
pub use paths::charmdir_home;

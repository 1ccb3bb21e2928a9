//! # charmdir
//!
//! **charmdir** inspects and drives the versioned charm directory of a unit.
//!
//! Features:
//! - `charmdir init|snapshot|revert` manage a directory's commits
//! - `charmdir status|log|charm-url` show what is deployed and whether it drifted
//! - `charmdir pull|clone` move history between directories
//! - `charmdir stage|deploy|resolved` run the charm upgrade workflow
//!
//! This CLI is built with [clap](https://docs.rs/clap).

use anyhow::Result;
use charmdir::{
    cmd_charm_url, cmd_clone, cmd_deploy, cmd_init, cmd_log, cmd_pull, cmd_resolved, cmd_revert,
    cmd_snapshot, cmd_stage, cmd_status, load_config, load_config_from, logging,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Command-line interface definition.
#[derive(Parser, Debug)]
#[command(
    name = "charmdir",
    version,
    about = "charmdir - versioned, revertible charm directories",
    arg_required_else_help = true
)]
struct Cli {
    /// Configuration file (defaults to $CHARMDIR_HOME/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Cmd,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Cmd {
    /// Create and initialize a charm directory
    Init { dir: PathBuf },
    /// Show state, dirty/conflicted flags and the deployed charm
    Status { dir: PathBuf },
    /// Show commit history, newest first
    Log { dir: PathBuf },
    /// Stage everything and commit it
    Snapshot {
        dir: PathBuf,
        #[arg(short, long)]
        message: String,
    },
    /// Merge another charm directory into this one
    Pull { dir: PathBuf, source: PathBuf },
    /// Discard uncommitted changes and conflicted merges
    Revert { dir: PathBuf },
    /// Clone committed history into a new directory
    Clone { src: PathBuf, dst: PathBuf },
    /// Print (or set) the deployed charm url
    CharmUrl {
        dir: PathBuf,
        #[arg(long)]
        set: Option<String>,
    },
    /// Stage a charm for deployment
    Stage {
        /// Deployer data directory
        #[arg(long)]
        data: PathBuf,
        /// Directory holding the charm's files
        charm: PathBuf,
        /// Charm url, e.g. cs:trusty/mysql-12
        url: String,
    },
    /// Deploy the staged charm into a unit's charm directory
    Deploy {
        #[arg(long)]
        data: PathBuf,
        target: PathBuf,
    },
    /// Record that an upgrade conflict was resolved by hand
    Resolved { target: PathBuf },
}

/// CLI entry point.
fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    logging::init(if cli.verbose { "debug" } else { cfg.log_level.as_str() });

    match cli.cmd {
        Cmd::Init { dir } => cmd_init(&cfg, &dir),
        Cmd::Status { dir } => cmd_status(&cfg, &dir),
        Cmd::Log { dir } => cmd_log(&cfg, &dir),
        Cmd::Snapshot { dir, message } => cmd_snapshot(&cfg, &dir, &message),
        Cmd::Pull { dir, source } => cmd_pull(&cfg, &dir, &source),
        Cmd::Revert { dir } => cmd_revert(&cfg, &dir),
        Cmd::Clone { src, dst } => cmd_clone(&cfg, &src, &dst),
        Cmd::CharmUrl { dir, set } => cmd_charm_url(&cfg, &dir, set.as_deref()),
        Cmd::Stage { data, charm, url } => cmd_stage(&cfg, &data, &charm, &url),
        Cmd::Deploy { data, target } => cmd_deploy(&cfg, &data, &target),
        Cmd::Resolved { target } => cmd_resolved(&cfg, &target),
    }
}

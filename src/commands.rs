use anyhow::{Context, Result, anyhow};
use colored::Colorize;
use std::path::Path;

use crate::charm::{CharmUrl, read_charm_url, write_charm_url};
use crate::config::Config;
use crate::deployer::Deployer;
use crate::error::Error;
use crate::git::{DirState, GitDir, PullOutcome};

fn git_dir(cfg: &Config, dir: &Path) -> GitDir {
    GitDir::with_identity(dir, cfg.identity.clone())
}

fn yes_no(b: bool) -> colored::ColoredString {
    if b { "yes".yellow() } else { "no".green() }
}

fn conflict_hint(dir: &Path) -> anyhow::Error {
    eprintln!("{} merge conflicts in {}", "✘".red(), dir.display());
    anyhow!(
        "fix the files and run `charmdir resolved {0}`, or discard them with `charmdir revert {0}`",
        dir.display()
    )
}

/// CLI command: initialize a charm directory (idempotent).
pub fn cmd_init(cfg: &Config, dir: &Path) -> Result<()> {
    git_dir(cfg, dir)
        .init()
        .with_context(|| format!("cannot initialize {}", dir.display()))?;
    println!("{} initialized {}", "✔".green(), dir.display());
    Ok(())
}

/// CLI command: print state, dirty/conflicted flags and the recorded charm.
///
/// Example output:
/// ```text
/// path:       /var/lib/unit/charm
/// state:      initialized
/// dirty:      no
/// conflicted: no
/// charm:      cs:trusty/mysql-12
/// ```
pub fn cmd_status(cfg: &Config, dir: &Path) -> Result<()> {
    let gd = git_dir(cfg, dir);
    let state = gd.state()?;
    println!("path:       {}", dir.display());
    let label = match state {
        DirState::Absent => "absent",
        DirState::Uninitialized => "uninitialized",
        DirState::Initialized => "initialized",
    };
    println!("state:      {}", label);
    if state != DirState::Initialized {
        return Ok(());
    }
    println!("dirty:      {}", yes_no(gd.is_dirty()?));
    println!("conflicted: {}", yes_no(gd.is_conflicted()?));
    match read_charm_url(&gd) {
        Ok(url) => println!("charm:      {}", url),
        Err(e) if e.is_not_found() => println!("charm:      {}", "(none)".dimmed()),
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

/// CLI command: print history as `<id> <message>`, newest first.
pub fn cmd_log(cfg: &Config, dir: &Path) -> Result<()> {
    for entry in git_dir(cfg, dir).history()? {
        println!("{} {}", entry.id.yellow(), entry.message);
    }
    Ok(())
}

/// CLI command: stage everything and commit it.
pub fn cmd_snapshot(cfg: &Config, dir: &Path, message: &str) -> Result<()> {
    match git_dir(cfg, dir).snapshot(message) {
        Ok(()) => {
            println!("{} {}", "✔".green(), message);
            Ok(())
        }
        Err(Error::NothingToCommit) => {
            println!("nothing to commit");
            Ok(())
        }
        Err(Error::Conflicted(_)) => Err(conflict_hint(dir)),
        Err(e) => Err(e.into()),
    }
}

/// CLI command: merge another charm directory's history into `dir`.
pub fn cmd_pull(cfg: &Config, dir: &Path, source: &Path) -> Result<()> {
    let gd = git_dir(cfg, dir);
    match gd.pull(&git_dir(cfg, source)) {
        Ok(outcome) => {
            let what = match outcome {
                PullOutcome::UpToDate => "already up to date",
                PullOutcome::FastForward => "fast-forwarded",
                PullOutcome::Merged => "merged",
            };
            println!("{} {} from {}", "✔".green(), what, source.display());
            Ok(())
        }
        Err(Error::Conflict) | Err(Error::Conflicted(_)) => Err(conflict_hint(dir)),
        Err(e) => Err(e).with_context(|| format!("pull from {} failed", source.display())),
    }
}

/// CLI command: discard uncommitted changes and in-progress merges.
pub fn cmd_revert(cfg: &Config, dir: &Path) -> Result<()> {
    git_dir(cfg, dir).revert()?;
    println!("{} reverted {}", "✔".green(), dir.display());
    Ok(())
}

/// CLI command: clone committed history into a new directory.
pub fn cmd_clone(cfg: &Config, src: &Path, dst: &Path) -> Result<()> {
    let cloned = git_dir(cfg, src).clone_to(dst)?;
    println!(
        "{} cloned {} into {}",
        "✔".green(),
        src.display(),
        cloned.path().display()
    );
    Ok(())
}

/// CLI command: print or overwrite the charm url marker.
///
/// Setting the marker does not commit it; snapshot afterwards.
pub fn cmd_charm_url(cfg: &Config, dir: &Path, set: Option<&str>) -> Result<()> {
    let gd = git_dir(cfg, dir);
    if let Some(raw) = set {
        let url: CharmUrl = raw.parse()?;
        write_charm_url(&gd, &url)?;
        println!("{} {}", "✔".green(), url);
        return Ok(());
    }
    match read_charm_url(&gd) {
        Ok(url) => {
            println!("{}", url);
            Ok(())
        }
        Err(e) if e.is_not_found() => Err(anyhow!("no charm deployed in {}", dir.display())),
        Err(e) => Err(e.into()),
    }
}

/// CLI command: stage a charm for the next deploy.
pub fn cmd_stage(cfg: &Config, data: &Path, charm: &Path, url: &str) -> Result<()> {
    let url: CharmUrl = url.parse()?;
    Deployer::new(data, cfg.identity.clone()).stage(charm, &url)?;
    println!("{} staged {}", "✔".green(), url);
    Ok(())
}

/// CLI command: deploy the staged charm into `target`.
pub fn cmd_deploy(cfg: &Config, data: &Path, target: &Path) -> Result<()> {
    let d = Deployer::new(data, cfg.identity.clone());
    match d.deploy(&git_dir(cfg, target)) {
        Ok(_) => {
            let url = Deployer::deployed_url(&git_dir(cfg, target))?;
            println!("{} deployed {}", "✔".green(), url);
            Ok(())
        }
        Err(Error::Conflict) | Err(Error::Conflicted(_)) => Err(conflict_hint(target)),
        Err(e) => Err(e.into()),
    }
}

/// CLI command: record a manual conflict resolution in `target`.
pub fn cmd_resolved(cfg: &Config, target: &Path) -> Result<()> {
    Deployer::notify_resolved(&git_dir(cfg, target))?;
    println!("{} resolved {}", "✔".green(), target.display());
    Ok(())
}

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::io;
use std::path::Path;

use crate::paths::paths;

/// Top-level configuration loaded from `config.toml`.
///
/// Every key is optional; a missing file means defaults.
///
/// Example TOML:
/// ```toml
/// log_level = "debug"
///
/// [identity]
/// name  = "juju"
/// email = "juju@localhost"
/// ```
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct Config {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub identity: Identity,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            log_level: default_log_level(),
            identity: Identity::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Author and committer recorded on every snapshot.
///
/// Commits are made on behalf of the agent, never a human operator.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct Identity {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_email")]
    pub email: String,
}

impl Default for Identity {
    fn default() -> Self {
        Identity {
            name: default_name(),
            email: default_email(),
        }
    }
}

fn default_name() -> String {
    "juju".to_string()
}

fn default_email() -> String {
    "juju@localhost".to_string()
}

/// Load `config.toml` from the charmdir home.
///
/// # Errors
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_config() -> Result<Config> {
    let p = paths()?;
    load_config_from(&p.config)
}

/// Load configuration from an explicit path, falling back to defaults when
/// the file does not exist.
pub fn load_config_from(path: &Path) -> Result<Config> {
    let txt = match fs::read_to_string(path) {
        Ok(txt) => txt,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Config::default()),
        Err(e) => {
            return Err(e).with_context(|| format!("failed to read {}", path.display()));
        }
    };
    let cfg: Config = toml::from_str(&txt)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_defaults() {
        let td = tempdir().unwrap();
        let cfg = load_config_from(&td.path().join("config.toml")).unwrap();
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.identity.name, "juju");
        assert_eq!(cfg.identity.email, "juju@localhost");
        assert_eq!(cfg.log_level, "info");
    }

    #[test]
    fn partial_identity_keeps_other_defaults() {
        let td = tempdir().unwrap();
        let path = td.path().join("config.toml");
        fs::write(&path, "log_level = \"debug\"\n[identity]\nname = \"agent\"\n").unwrap();
        let cfg = load_config_from(&path).unwrap();
        assert_eq!(cfg.log_level, "debug");
        assert_eq!(cfg.identity.name, "agent");
        assert_eq!(cfg.identity.email, "juju@localhost");
    }

    #[test]
    fn malformed_file_is_an_error() {
        let td = tempdir().unwrap();
        let path = td.path().join("config.toml");
        fs::write(&path, "identity = [").unwrap();
        let err = load_config_from(&path).unwrap_err();
        assert!(err.to_string().contains("failed to parse"));
    }
}

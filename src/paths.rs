use anyhow::Result;
use std::{env, path::PathBuf};

#[derive(Clone)]
pub struct Paths {
    pub config: PathBuf,
}

/// Directory holding charmdir's own configuration.
///
/// `$CHARMDIR_HOME` wins; otherwise `$XDG_CONFIG_HOME/charmdir`, falling
/// back to `$HOME/.config/charmdir`.
pub fn charmdir_home() -> Result<PathBuf> {
    if let Some(home) = env::var_os("CHARMDIR_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(home));
    }
    let xdg = env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty());
    let base = xdg
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(env::var_os("HOME").unwrap_or_default()).join(".config"));
    Ok(base.join("charmdir"))
}

pub fn paths() -> Result<Paths> {
    let home = charmdir_home()?;
    Ok(Paths {
        config: home.join("config.toml"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::ffi::OsString;

    struct EnvGuard(Vec<(&'static str, Option<OsString>)>);

    impl EnvGuard {
        fn set(vars: &[(&'static str, Option<&str>)]) -> Self {
            let saved = vars.iter().map(|(k, _)| (*k, env::var_os(k))).collect();
            for (k, v) in vars {
                // SAFETY: tests touching the environment are serialized.
                unsafe {
                    match v {
                        Some(v) => env::set_var(k, v),
                        None => env::remove_var(k),
                    }
                }
            }
            EnvGuard(saved)
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (k, v) in &self.0 {
                // SAFETY: see EnvGuard::set.
                unsafe {
                    match v {
                        Some(v) => env::set_var(k, v),
                        None => env::remove_var(k),
                    }
                }
            }
        }
    }

    #[test]
    #[serial]
    fn explicit_home_wins() {
        let _g = EnvGuard::set(&[
            ("CHARMDIR_HOME", Some("/srv/agent")),
            ("XDG_CONFIG_HOME", Some("/xdg")),
        ]);
        assert_eq!(charmdir_home().unwrap(), PathBuf::from("/srv/agent"));
        assert_eq!(
            paths().unwrap().config,
            PathBuf::from("/srv/agent/config.toml")
        );
    }

    #[test]
    #[serial]
    fn xdg_then_home_fallback() {
        let _g = EnvGuard::set(&[
            ("CHARMDIR_HOME", None),
            ("XDG_CONFIG_HOME", Some("/xdg")),
        ]);
        assert_eq!(charmdir_home().unwrap(), PathBuf::from("/xdg/charmdir"));
        drop(_g);

        let _g = EnvGuard::set(&[
            ("CHARMDIR_HOME", None),
            ("XDG_CONFIG_HOME", None),
            ("HOME", Some("/home/u")),
        ]);
        assert_eq!(
            charmdir_home().unwrap(),
            PathBuf::from("/home/u/.config/charmdir")
        );
    }
}

//! Where terrace keeps its files
//!
//! Settings and profiles live under the config directory, lock files under the
//! state directory:
//!
//! | directory | override             | XDG                      | fallback                   |
//! |-----------|----------------------|--------------------------|----------------------------|
//! | config    | `TERRACE_CONFIG_DIR` | `$XDG_CONFIG_HOME/terrace` | `~/.config/terrace`      |
//! | state     | `TERRACE_STATE_DIR`  | `$XDG_STATE_HOME/terrace`  | `~/.local/state/terrace` |

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "TERRACE_CONFIG_DIR";

/// Environment variable for state directory override
pub const ENV_STATE_DIR: &str = "TERRACE_STATE_DIR";

/// Resolved config and state directories
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    config: PathBuf,
    state: PathBuf,
}

impl Layout {
    /// Resolve from the process environment
    pub fn current() -> Result<Self> {
        Self::resolve(|key| std::env::var(key).ok(), dirs::home_dir())
    }

    fn resolve(var: impl Fn(&str) -> Option<String>, home: Option<PathBuf>) -> Result<Self> {
        let pick = |override_var: &str, xdg_var: &str, fallback: &[&str]| -> Result<PathBuf> {
            if let Some(dir) = var(override_var).filter(|d| !d.is_empty()) {
                let tilde = shellexpand::tilde_with_context(&dir, || {
                    home.as_deref().and_then(Path::to_str)
                });
                log::debug!("{override_var} points at {tilde}");
                return Ok(PathBuf::from(tilde.as_ref()));
            }
            if let Some(xdg) = var(xdg_var).filter(|d| !d.is_empty()) {
                return Ok(PathBuf::from(xdg).join("terrace"));
            }
            let home = home
                .as_ref()
                .context("Could not determine home directory")?;
            Ok(fallback.iter().fold(home.clone(), |path, part| path.join(part)))
        };

        Ok(Self {
            config: pick(ENV_CONFIG_DIR, "XDG_CONFIG_HOME", &[".config", "terrace"])?,
            state: pick(ENV_STATE_DIR, "XDG_STATE_HOME", &[".local", "state", "terrace"])?,
        })
    }

    /// `config.toml` in the config directory
    pub fn config_file(&self) -> PathBuf {
        self.config.join("config.toml")
    }

    /// Profile root used when settings name none
    pub fn profiles_dir(&self) -> PathBuf {
        self.config.join("profiles")
    }

    /// Named lock files for `run_exclusive`
    pub fn lock_dir(&self) -> PathBuf {
        self.state.join("locks")
    }
}

pub fn config_file() -> Result<PathBuf> {
    Ok(Layout::current()?.config_file())
}

pub fn profiles_dir() -> Result<PathBuf> {
    Ok(Layout::current()?.profiles_dir())
}

pub fn lock_dir() -> Result<PathBuf> {
    Ok(Layout::current()?.lock_dir())
}

/// Expand `~` and `$VARS` in a configured profile path; unknown variables stay literal
pub fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::full(path).map_or_else(|_| path.to_string(), |p| p.into_owned()))
}

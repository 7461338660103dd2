//! Settings file schema (`config.toml`)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::paths;

/// The terrace settings file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Where profile documents live
    pub profiles: ProfilesSettings,

    /// Worker and lock tuning
    pub execution: ExecutionSettings,

    /// External program implementing the command boundary
    pub boundary: BoundarySettings,

    /// Runtime variables seeded before every application
    pub variables: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilesSettings {
    /// Directories searched in order; `~` and `$VAR` are expanded
    pub paths: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionSettings {
    pub jobs: usize,
    pub lock_timeout_secs: u64,
    pub poll_interval_ms: u64,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            jobs: 4,
            lock_timeout_secs: 600,
            poll_interval_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundarySettings {
    /// Executable invoked once per command
    pub program: Option<String>,
    /// Arguments placed before the command words
    pub args: Vec<String>,
}

impl Settings {
    /// Load settings from a file; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read settings file: {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid settings in {}", path.display()))
    }

    /// Load settings from the default location
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_file()?)
    }

    /// Parse settings TOML
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Invalid TOML format in terrace settings")
    }

    /// Profile search roots, expanded
    pub fn profile_roots(&self) -> Result<Vec<PathBuf>> {
        if self.profiles.paths.is_empty() {
            return Ok(vec![paths::profiles_dir()?]);
        }
        Ok(self.profiles.paths.iter().map(|p| paths::expand(p)).collect())
    }
}

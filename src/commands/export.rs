//! `export` - rebuild a profile document from a live-state snapshot

use anyhow::{Context as _, Result};
use declarative::Orchestrator;
use declarative::document::load_file;
use std::path::Path;
use std::sync::Arc;

use super::render;
use crate::boundary::Unconfigured;
use crate::cli::OutputFormat;

pub fn run(snapshot: &Path, format: OutputFormat) -> Result<()> {
    let snapshot = load_file(snapshot)
        .with_context(|| format!("Could not read snapshot {}", snapshot.display()))?;

    // Export never dispatches
    let orchestrator = Orchestrator::new(Arc::new(Unconfigured));
    let document = orchestrator
        .export(&snapshot)
        .context("Could not rebuild profile from snapshot")?;

    print!("{}", render(&document, format)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_export_reads_snapshot() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("live.yml");
        fs::write(&path, "config:\n  region:\n    config_value: eu\n").unwrap();
        assert!(run(&path, OutputFormat::Json).is_ok());
    }

    #[test]
    fn test_export_rejects_unknown_unit() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("live.yml");
        fs::write(&path, "nonsense:\n  a: {}\n").unwrap();
        assert!(run(&path, OutputFormat::Yaml).is_err());
    }

    #[test]
    fn test_export_missing_file() {
        let dir = TempDir::new().unwrap();
        assert!(run(&dir.path().join("absent.yml"), OutputFormat::Yaml).is_err());
    }
}

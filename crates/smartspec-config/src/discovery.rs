//! Config file discovery and loading.

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use tracing::debug;

use crate::model::Config;
use crate::validation::validate;

/// Search upward from `start` for `.spec/config.toml`.
///
/// Returns the first match walking toward the filesystem root, or `None`.
#[must_use]
pub fn discover_config_file(start: &Utf8Path) -> Option<Utf8PathBuf> {
    let mut current = Some(start);
    while let Some(dir) = current {
        let candidate = dir.join(".spec").join("config.toml");
        if candidate.is_file() {
            debug!(path = %candidate, "discovered config file");
            return Some(candidate);
        }
        current = dir.parent();
    }
    None
}

/// Load and validate a config file from an explicit path.
///
/// # Errors
/// IO failure, TOML parse failure, or validation failure.
pub fn load_from_path(path: &Utf8Path) -> Result<Config> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {path}"))?;
    let config: Config =
        toml::from_str(&raw).with_context(|| format!("Failed to parse config file: {path}"))?;
    validate(&config).with_context(|| format!("Invalid configuration in {path}"))?;
    Ok(config)
}

/// Load config with discovery from `start`; defaults when no file exists.
///
/// # Errors
/// Parse or validation failure of a discovered file. A missing file is not
/// an error.
pub fn load_with_discovery(start: &Utf8Path) -> Result<Config> {
    match discover_config_file(start) {
        Some(path) => load_from_path(&path),
        None => {
            debug!("no config file found, using defaults");
            let config = Config::default();
            validate(&config)?;
            Ok(config)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn utf8_root(dir: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap()
    }

    #[test]
    fn discovery_walks_upward() {
        let dir = TempDir::new().unwrap();
        let root = utf8_root(&dir);
        fs::create_dir_all(root.join(".spec")).unwrap();
        fs::write(root.join(".spec/config.toml"), "[engine]\nfan_out = 2\n").unwrap();
        let nested = root.join("a/b/c");
        fs::create_dir_all(&nested).unwrap();

        let found = discover_config_file(&nested).unwrap();
        assert_eq!(found, root.join(".spec/config.toml"));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let config = load_with_discovery(&utf8_root(&dir)).unwrap();
        assert_eq!(config.engine.fan_out, 4);
    }

    #[test]
    fn parse_error_is_surfaced_with_path() {
        let dir = TempDir::new().unwrap();
        let root = utf8_root(&dir);
        fs::create_dir_all(root.join(".spec")).unwrap();
        fs::write(root.join(".spec/config.toml"), "not valid toml [[").unwrap();

        let err = load_with_discovery(&root).unwrap_err();
        assert!(format!("{err:#}").contains("config.toml"));
    }
}

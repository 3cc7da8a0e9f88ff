// Shell configuration loaded from YAML

use crate::store::DEFAULT_FILE;
use eyre::{Context, Result, eyre};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Config file looked up in the working directory
pub const LOCAL_CONFIG: &str = "filestore.yml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Backing JSON file for the store
    pub file_path: PathBuf,

    /// Prompt shown before each interactive command
    pub prompt: String,

    /// Maximum tracing level (error, warn, info, debug, trace)
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            file_path: PathBuf::from(DEFAULT_FILE),
            prompt: "(hbnb) ".to_string(),
            log_level: "warn".to_string(),
        }
    }
}

impl Config {
    /// Load configuration
    ///
    /// An explicit path must exist. Without one, `./filestore.yml` and then
    /// `<config dir>/filestore/config.yml` are tried; if neither exists the
    /// defaults are used.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        for candidate in Self::candidates() {
            if candidate.is_file() {
                return Self::from_file(&candidate);
            }
        }

        debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).with_context(|| format!("Failed to read config {}", path.display()))?;
        let config = Self::from_yaml(&content).with_context(|| format!("Invalid config {}", path.display()))?;
        debug!(path = ?path, "Loaded config");
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Config = serde_yaml::from_str(content).context("Failed to parse YAML")?;
        config.validate()?;
        Ok(config)
    }

    /// Parsed `log_level`
    pub fn level(&self) -> Result<tracing::Level> {
        self.log_level
            .parse::<tracing::Level>()
            .map_err(|_| eyre!("Invalid log level: {}", self.log_level))
    }

    fn validate(&self) -> Result<()> {
        if self.file_path.as_os_str().is_empty() {
            return Err(eyre!("file_path cannot be empty"));
        }
        self.level()?;
        Ok(())
    }

    fn candidates() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(LOCAL_CONFIG)];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("filestore").join("config.yml"));
        }
        paths
    }
}

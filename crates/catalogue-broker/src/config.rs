//! Configuration loading and validation

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub catalogue: CatalogueConfig,
    #[serde(default, rename = "database")]
    pub databases: Vec<DatabaseConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Bind address for the HTTP server
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Queue depth of each change feed subscriber
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            event_buffer: default_event_buffer(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_event_buffer() -> usize {
    64
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogueConfig {
    /// Base of the source package URLs recorded on instances
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for CatalogueConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
        }
    }
}

fn default_base_url() -> String {
    "hyperty-catalogue://localhost:8080/.well-known".to_string()
}

/// An in-process catalogue database served as a device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub device_id: String,
    pub path: PathBuf,
}

impl Config {
    pub fn database(&self, device_id: &str) -> Option<&DatabaseConfig> {
        self.databases.iter().find(|db| db.device_id == device_id)
    }

    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for db in &self.databases {
            if db.device_id.is_empty() {
                bail!("database at {} has an empty device_id", db.path.display());
            }
            if !seen.insert(db.device_id.as_str()) {
                bail!("duplicate database device_id '{}'", db.device_id);
            }
        }
        Ok(())
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<Config> {
    let config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        info!(path = %path.display(), "Loaded configuration");
        config
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Config::default()
    };

    config.validate()?;
    Ok(config)
}

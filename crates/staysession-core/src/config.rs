//! Application configuration management.
//!
//! Configuration covers the API base URL, which durable storage backend to
//! use, and the refresh look-ahead window.
//!
//! Configuration is stored at `~/.config/staysession/config.json`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::auth::expiry::DEFAULT_LOOKAHEAD_SECS;
use crate::storage::{FileBackend, KeyringBackend, SessionStore, StorageBackend};

/// Application name used for config/data directory paths
pub const APP_NAME: &str = "staysession";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// File names of the two session tiers
const DURABLE_FILE: &str = "session.json";
const EPHEMERAL_FILE: &str = "session.ephemeral.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DurableBackendKind {
    /// JSON file in the user data directory
    #[default]
    File,
    /// OS keychain
    Keyring,
}

fn default_lookahead() -> i64 {
    DEFAULT_LOOKAHEAD_SECS
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api_base_url: Option<String>,
    #[serde(default)]
    pub durable_backend: DurableBackendKind,
    #[serde(default = "default_lookahead")]
    pub refresh_lookahead_secs: i64,
    /// Overrides the platform data directory for the durable file tier
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: None,
            durable_backend: DurableBackendKind::default(),
            refresh_lookahead_secs: DEFAULT_LOOKAHEAD_SECS,
            data_dir: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory for the durable session tier
    pub fn durable_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.data_dir {
            return Ok(dir.clone());
        }
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    /// Directory for the ephemeral session tier. The runtime directory is
    /// cleared when the user's login session ends.
    pub fn ephemeral_dir(&self) -> PathBuf {
        dirs::runtime_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(APP_NAME)
    }

    pub fn durable_backend(&self) -> Result<Arc<dyn StorageBackend>> {
        let backend: Arc<dyn StorageBackend> = match self.durable_backend {
            DurableBackendKind::File => Arc::new(FileBackend::new(
                "durable",
                self.durable_dir()?.join(DURABLE_FILE),
            )),
            DurableBackendKind::Keyring => Arc::new(KeyringBackend::default()),
        };
        Ok(backend)
    }

    pub fn ephemeral_backend(&self) -> Arc<dyn StorageBackend> {
        Arc::new(FileBackend::new(
            "ephemeral",
            self.ephemeral_dir().join(EPHEMERAL_FILE),
        ))
    }

    /// Session store over the configured durable and ephemeral tiers
    pub fn session_store(&self) -> Result<SessionStore> {
        Ok(SessionStore::new(
            self.durable_backend()?,
            self.ephemeral_backend(),
        ))
    }
}

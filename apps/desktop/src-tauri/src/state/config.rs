//! # Configuration State
//!
//! The client configuration loaded at startup.
//!
//! ## Configuration Sources (Priority Order)
//! 1. Environment variables (`ECOPILA_*`)
//! 2. Config file (`ecopila.toml` in the platform config dir)
//! 3. Defaults
//!
//! Edits are saved to the file. The API client is built once, so a new
//! base URL or timeout applies after a restart.

use std::path::PathBuf;

use tokio::sync::RwLock;

use ecopila_sync::{SyncConfig, SyncResult};

#[derive(Debug)]
pub struct ConfigState {
    config: RwLock<SyncConfig>,
    /// `None` uses the platform location.
    path: Option<PathBuf>,
}

impl ConfigState {
    pub fn new(config: SyncConfig, path: Option<PathBuf>) -> Self {
        ConfigState {
            config: RwLock::new(config),
            path,
        }
    }

    pub async fn get(&self) -> SyncConfig {
        self.config.read().await.clone()
    }

    /// Validates, saves and keeps `config`.
    pub async fn update(&self, config: SyncConfig) -> SyncResult<SyncConfig> {
        config.validate()?;
        config.save(self.path.clone())?;
        *self.config.write().await = config.clone();
        Ok(config)
    }
}

impl Default for ConfigState {
    fn default() -> Self {
        ConfigState::new(SyncConfig::default(), None)
    }
}

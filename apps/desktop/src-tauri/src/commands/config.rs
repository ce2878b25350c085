//! # Config Commands
//!
//! Reads and edits the client configuration (`ecopila.toml`).

use tracing::{debug, info};

use crate::error::ApiResult;
use crate::state::ConfigState;
use ecopila_sync::SyncConfig;

pub async fn get_config(config: &ConfigState) -> SyncConfig {
    debug!("get_config command");
    config.get().await
}

/// Validates and saves `new_config`. Takes effect on the next start.
pub async fn update_config(config: &ConfigState, new_config: SyncConfig) -> ApiResult<SyncConfig> {
    let saved = config.update(new_config).await?;
    info!(base_url = %saved.api.base_url, offline = saved.offline, "Config updated");
    Ok(saved)
}

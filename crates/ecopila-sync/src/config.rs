//! # Sync Configuration
//!
//! Where the API lives and how the background tasks pace themselves.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     ECOPILA_API_BASE_URL=https://api.ecopila.com.ar/api                │
//! │     ECOPILA_OFFLINE=1                                                  │
//! │     ECOPILA_QUEUE_INTERVAL=10                                          │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/ecopila/ecopila.toml (Linux)                             │
//! │     ~/Library/Application Support/com.ecopila.ecopila/ecopila.toml     │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     http://localhost:8090/api, 5 s queue interval                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # ecopila.toml
//! offline = false
//!
//! [api]
//! base_url = "http://localhost:8090/api"
//! request_timeout_secs = 15
//!
//! [queue]
//! interval_secs = 5
//! batch_size = 50
//! max_retry_attempts = 10
//! backoff_initial_ms = 500
//! backoff_max_secs = 60
//!
//! [cache]
//! dolar_refresh_secs = 300
//! query_stale_secs = 300
//! max_age_hours = 24
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{SyncError, SyncResult};

/// Name of the config file inside the platform config directory.
pub const CONFIG_FILE_NAME: &str = "ecopila.toml";

/// Name of the replica inside the platform data directory.
pub const DB_FILE_NAME: &str = "ecopila.db";

// =============================================================================
// API Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSettings {
    /// Root of every endpoint (`/producto/productos` is appended to it).
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:8090/api".to_string()
}

fn default_request_timeout() -> u64 {
    15
}

impl Default for ApiSettings {
    fn default() -> Self {
        ApiSettings {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

// =============================================================================
// Queue Settings
// =============================================================================

/// Pacing of the mutation queue replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSettings {
    /// Interval between queue poll cycles (seconds).
    #[serde(default = "default_queue_interval")]
    pub interval_secs: u64,

    /// Entries replayed per cycle.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Consecutive network failures before the queue pauses until the
    /// connection comes back.
    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,

    /// First backoff after a network failure (milliseconds).
    #[serde(default = "default_backoff_initial")]
    pub backoff_initial_ms: u64,

    /// Longest backoff between attempts (seconds).
    #[serde(default = "default_backoff_max")]
    pub backoff_max_secs: u64,
}

fn default_queue_interval() -> u64 {
    5
}
fn default_batch_size() -> u32 {
    50
}
fn default_max_retry_attempts() -> u32 {
    10
}
fn default_backoff_initial() -> u64 {
    500
}
fn default_backoff_max() -> u64 {
    60
}

impl Default for QueueSettings {
    fn default() -> Self {
        QueueSettings {
            interval_secs: default_queue_interval(),
            batch_size: default_batch_size(),
            max_retry_attempts: default_max_retry_attempts(),
            backoff_initial_ms: default_backoff_initial(),
            backoff_max_secs: default_backoff_max(),
        }
    }
}

// =============================================================================
// Cache Settings
// =============================================================================

/// Freshness of the local replica.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// A cached dólar younger than this is served without a request.
    #[serde(default = "default_dolar_refresh")]
    pub dolar_refresh_secs: u64,

    /// The catalog is pulled again once it is older than this.
    #[serde(default = "default_query_stale")]
    pub query_stale_secs: u64,

    /// Completed queue entries and stale dólar values older than this are
    /// dropped.
    #[serde(default = "default_max_age_hours")]
    pub max_age_hours: u64,
}

fn default_dolar_refresh() -> u64 {
    300
}
fn default_query_stale() -> u64 {
    300
}
fn default_max_age_hours() -> u64 {
    24
}

impl Default for CacheSettings {
    fn default() -> Self {
        CacheSettings {
            dolar_refresh_secs: default_dolar_refresh(),
            query_stale_secs: default_query_stale(),
            max_age_hours: default_max_age_hours(),
        }
    }
}

// =============================================================================
// Main Sync Configuration
// =============================================================================

/// Complete client configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Start in offline mode: nothing is sent until it is turned off.
    #[serde(default)]
    pub offline: bool,

    #[serde(default)]
    pub api: ApiSettings,

    #[serde(default)]
    pub queue: QueueSettings,

    #[serde(default)]
    pub cache: CacheSettings,
}

impl SyncConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults pointing at `base_url`, for tests against a mock server.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let mut config = Self::default();
        config.api.base_url = base_url.into();
        config
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (ecopila.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        let url = Url::parse(&self.api.base_url)?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(SyncError::InvalidUrl(format!(
                "API URL must start with http:// or https://, got: {}",
                self.api.base_url
            )));
        }

        let intervals = [
            ("api.request_timeout_secs", self.api.request_timeout_secs),
            ("queue.interval_secs", self.queue.interval_secs),
            ("queue.backoff_initial_ms", self.queue.backoff_initial_ms),
            ("queue.backoff_max_secs", self.queue.backoff_max_secs),
            ("cache.dolar_refresh_secs", self.cache.dolar_refresh_secs),
            ("cache.query_stale_secs", self.cache.query_stale_secs),
        ];
        for (name, value) in intervals {
            if value == 0 {
                return Err(SyncError::InvalidConfig(format!(
                    "{} must be greater than 0",
                    name
                )));
            }
        }

        if self.queue.batch_size == 0 {
            return Err(SyncError::InvalidConfig(
                "queue.batch_size must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("ECOPILA_API_BASE_URL") {
            debug!(url = %url, "Overriding API URL from environment");
            self.api.base_url = url;
        }

        if let Ok(offline) = std::env::var("ECOPILA_OFFLINE") {
            self.offline = matches!(
                offline.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }

        if let Ok(interval) = std::env::var("ECOPILA_QUEUE_INTERVAL") {
            match interval.parse::<u64>() {
                Ok(secs) => self.queue.interval_secs = secs,
                Err(_) => warn!(value = %interval, "Ignoring invalid ECOPILA_QUEUE_INTERVAL"),
            }
        }
    }

    fn project_dirs() -> Option<directories::ProjectDirs> {
        directories::ProjectDirs::from("com", "ecopila", "ecopila")
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Where the replica lives unless `ECOPILA_DB_PATH` says otherwise.
    pub fn default_db_path() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.data_dir().join(DB_FILE_NAME))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    pub fn base_url(&self) -> &str {
        &self.api.base_url
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.request_timeout_secs)
    }

    pub fn queue_interval(&self) -> Duration {
        Duration::from_secs(self.queue.interval_secs)
    }

    pub fn backoff_initial(&self) -> Duration {
        Duration::from_millis(self.queue.backoff_initial_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_secs(self.queue.backoff_max_secs)
    }

    pub fn dolar_refresh(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.cache.dolar_refresh_secs as i64)
    }

    pub fn query_stale(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.cache.query_stale_secs as i64)
    }

    pub fn cache_max_age(&self) -> chrono::Duration {
        chrono::Duration::hours(self.cache.max_age_hours as i64)
    }
}

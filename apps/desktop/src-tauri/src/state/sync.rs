//! # Sync State Module
//!
//! Gives commands access to the server: the API client, the dólar service
//! and the handle of the running sync agent.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync State Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                      SyncState                                  │   │
//! │  │                                                                 │   │
//! │  │  ┌─────────────────┐  ┌─────────────┐  ┌─────────────────────┐  │   │
//! │  │  │ SyncAgentHandle │  │ ApiClient   │  │ DolarService        │  │   │
//! │  │  │ (Background     │  │ login, bulk │  │ get / force update  │  │   │
//! │  │  │  processor)     │  │ rubros, ... │  │                     │  │   │
//! │  │  └─────────────────┘  └─────────────┘  └─────────────────────┘  │   │
//! │  │                                                                 │   │
//! │  │  Emits events (Tauri shell):                                    │   │
//! │  │  • sync:status         (SyncStatusDto)                          │   │
//! │  │  • sync:rejected       (mutation rolled back)                   │   │
//! │  │  • sync:error          (message, retryable)                     │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Event Flow
//! ```text
//! listen('sync:rejected', (event) => {
//!   toast.error(`${event.payload.kind}: ${event.payload.message}`);
//!   refetchProductos();
//! });
//! ```

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::info;

use ecopila_core::Dolar;
use ecopila_db::Database;
use ecopila_sync::{ApiClient, DolarService, OnlineManager, SyncAgentHandle, SyncStatus};

use crate::error::ApiResult;

pub struct SyncState {
    api: ApiClient,
    dolar: DolarService,
    agent: RwLock<Option<SyncAgentHandle>>,
}

impl SyncState {
    pub fn new(api: ApiClient, dolar: DolarService) -> Self {
        SyncState {
            api,
            dolar,
            agent: RwLock::new(None),
        }
    }

    pub async fn attach(&self, handle: SyncAgentHandle) {
        *self.agent.write().await = Some(handle);
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn dolar(&self) -> &DolarService {
        &self.dolar
    }

    pub fn online(&self) -> &OnlineManager {
        self.api.online()
    }

    /// Wakes the queue processor after a command queued a mutation.
    pub async fn notify_queued(&self) {
        if let Some(handle) = self.agent.read().await.as_ref() {
            handle.notify_queued().await;
        }
    }

    /// Current status; counted from the replica when no agent runs.
    pub async fn status(&self, db: &Database) -> ApiResult<SyncStatusDto> {
        if let Some(handle) = self.agent.read().await.as_ref() {
            handle.refresh_status().await;
            return Ok(handle.status().await.into());
        }

        let cached = db.dolar().latest().await?;
        let status = SyncStatus {
            online: self.online().is_online(),
            offline_mode: self.online().is_offline_mode(),
            pending_count: db.mutations().count_pending().await?,
            failed_count: db.mutations().count_failed().await?,
            dolar: cached.map(|c| c.dolar),
            ..Default::default()
        };
        Ok(status.into())
    }

    /// Stops the sync agent.
    pub async fn stop_agent(&self) {
        if let Some(handle) = self.agent.write().await.take() {
            info!("Stopping sync agent...");
            handle.shutdown().await;
            info!("Sync agent stopped");
        }
    }
}

/// Sync status as the frontend receives it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatusDto {
    pub online: bool,
    pub offline_mode: bool,
    pub pending_count: i64,
    pub failed_count: i64,
    /// ISO8601
    pub last_sync_at: Option<String>,
    pub error_message: Option<String>,
    pub dolar: Option<Dolar>,
    /// Online with nothing rejected.
    pub is_healthy: bool,
}

impl From<SyncStatus> for SyncStatusDto {
    fn from(status: SyncStatus) -> Self {
        SyncStatusDto {
            is_healthy: status.online && status.failed_count == 0,
            online: status.online,
            offline_mode: status.offline_mode,
            pending_count: status.pending_count,
            failed_count: status.failed_count,
            last_sync_at: status.last_sync.map(|t| t.to_rfc3339()),
            error_message: status.last_error,
            dolar: status.dolar,
        }
    }
}

// =============================================================================
// Tauri Event Emitter
// =============================================================================

#[cfg(feature = "tauri")]
pub use emitter::TauriSyncEventEmitter;

#[cfg(feature = "tauri")]
mod emitter {
    use serde::Serialize;
    use tauri::{AppHandle, Emitter};
    use tracing::{debug, error, warn};

    use super::SyncStatusDto;
    use ecopila_sync::{RejectedMutation, SyncEventEmitter, SyncStatus};

    /// Forwards agent events to the webview.
    #[derive(Clone)]
    pub struct TauriSyncEventEmitter {
        app_handle: AppHandle,
    }

    impl TauriSyncEventEmitter {
        pub fn new(app_handle: AppHandle) -> Self {
            Self { app_handle }
        }
    }

    impl SyncEventEmitter for TauriSyncEventEmitter {
        fn emit_status(&self, status: &SyncStatus) {
            let dto = SyncStatusDto::from(status.clone());
            if let Err(e) = self.app_handle.emit("sync:status", &dto) {
                error!(?e, "Failed to emit sync:status event");
            }
            debug!(?dto, "Emitted sync:status");
        }

        fn emit_rejected(&self, rejected: &RejectedMutation) {
            #[derive(Serialize, Clone)]
            struct RejectedEvent {
                id: String,
                kind: String,
                message: String,
            }

            let event = RejectedEvent {
                id: rejected.id.clone(),
                kind: rejected.kind.to_string(),
                message: rejected.message.clone(),
            };
            if let Err(e) = self.app_handle.emit("sync:rejected", &event) {
                error!(?e, "Failed to emit sync:rejected event");
            }
            warn!(kind = %event.kind, message = %event.message, "Emitted sync:rejected");
        }

        fn emit_error(&self, message: &str, retryable: bool) {
            #[derive(Serialize, Clone)]
            struct ErrorEvent {
                message: String,
                retryable: bool,
            }

            let event = ErrorEvent {
                message: message.to_string(),
                retryable,
            };
            if let Err(e) = self.app_handle.emit("sync:error", &event) {
                error!(?e, "Failed to emit sync:error event");
            }
        }
    }
}

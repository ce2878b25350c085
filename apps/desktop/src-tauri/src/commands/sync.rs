//! # Sync Commands
//!
//! ## Command Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Sync Commands                                    │
//! │                                                                         │
//! │  get_sync_status()        - Connection, queue counts, cached dólar      │
//! │  set_offline_mode(bool)   - Pin the client offline (or release it)      │
//! │  list_failed_mutations()  - Writes the server rejected                  │
//! │  discard_mutation(id)     - Forget a rejected write                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::state::{DbState, SyncState, SyncStatusDto};
use ecopila_core::{MutationEntry, MutationStatus};

pub async fn get_sync_status(db: &DbState, sync: &SyncState) -> ApiResult<SyncStatusDto> {
    sync.status(db.inner()).await
}

/// Pins the client offline: writes keep queueing, nothing is sent.
/// Releasing it wakes the processor so the queue drains right away.
pub async fn set_offline_mode(
    db: &DbState,
    sync: &SyncState,
    offline: bool,
) -> ApiResult<SyncStatusDto> {
    sync.online().set_offline_mode(offline);
    info!(offline, "Offline mode changed");
    if !offline {
        sync.notify_queued().await;
    }
    sync.status(db.inner()).await
}

pub async fn list_failed_mutations(db: &DbState) -> ApiResult<Vec<MutationEntry>> {
    Ok(db.inner().mutations().list_failed().await?)
}

/// Removes a rejected entry from the queue. Pending entries cannot be
/// discarded; their optimistic rows depend on them.
pub async fn discard_mutation(db: &DbState, id: String) -> ApiResult<()> {
    let entry = db
        .inner()
        .mutations()
        .get_by_id(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("Mutation", &id))?;
    if entry.status != MutationStatus::Failed {
        return Err(ApiError::validation(
            "Solo se pueden descartar operaciones rechazadas",
        ));
    }
    db.inner().mutations().discard(&id).await?;
    info!(id = %id, kind = %entry.kind, "Discarded failed mutation");
    Ok(())
}

//! # Commands Module
//!
//! Everything the frontend can ask for. Commands are plain async functions
//! over the state types, so they run (and are tested) without a webview;
//! [`crate::ipc`] wraps them as Tauri commands.
//!
//! ## Command Organization
//! ```text
//! commands/
//! ├── mod.rs        ◄─── You are here (exports, shared helpers)
//! ├── producto.rs   ◄─── Product list, optimistic CRUD, relations, scan
//! ├── proveedor.rs  ◄─── Supplier CRUD
//! ├── rubro.rs      ◄─── Category CRUD
//! ├── cart.rs       ◄─── Cart manipulation and checkout
//! ├── import.rs     ◄─── CSV preview, bulk upload, CSV export
//! ├── report.rs     ◄─── PDF price lists
//! ├── dolar.rs      ◄─── Exchange rate
//! ├── auth.rs       ◄─── Login, register, logout
//! ├── sync.rs       ◄─── Queue status and offline mode
//! └── config.rs     ◄─── Client configuration
//! ```
//!
//! ## Optimistic Writes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  create_producto(payload)                                               │
//! │       │                                                                 │
//! │       ├── validate ──────────────────────────► VALIDATION_ERROR         │
//! │       ├── price locally with the cached dólar                           │
//! │       ├── insert with a temporary id (shows as PENDIENTE)               │
//! │       ├── queue CreateProduct ─── mutation_queue (SQLite)               │
//! │       └── wake the processor ──► POST /producto/productos               │
//! │                                     ├── ok: rekey to the server id      │
//! │                                     └── rejected: row removed           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The command returns as soon as the row is in the replica; the frontend
//! hears about the outcome through `sync:status` and `sync:rejected`.

pub mod auth;
pub mod cart;
pub mod config;
pub mod dolar;
pub mod import;
pub mod producto;
pub mod proveedor;
pub mod report;
pub mod rubro;
pub mod sync;

use tracing::{debug, error};

use crate::error::ApiResult;
use crate::state::{DbState, SyncState};
use ecopila_core::ExchangeRate;
use ecopila_sync::QueuedMutation;

/// Rate used to price optimistic rows.
///
/// Falls back to the cached value (however old) when the server cannot be
/// reached.
pub(crate) async fn current_rate(sync: &SyncState) -> ApiResult<ExchangeRate> {
    Ok(sync.dolar().current().await?.rate())
}

/// Persists `mutation` and wakes the processor.
///
/// The optimistic change is already in the replica; if the mutation cannot
/// be stored it is undone, so the replica never holds a change the server
/// will not hear about.
pub(crate) async fn queue(
    db: &DbState,
    sync: &SyncState,
    mutation: QueuedMutation,
) -> ApiResult<()> {
    match mutation.enqueue(db.inner()).await {
        Ok(Some(entry)) => debug!(id = %entry.id, kind = %entry.kind, "Queued"),
        Ok(None) => debug!(kind = %mutation.kind(), "Cancelled a queued create"),
        Err(e) => {
            if let Err(undo) = mutation.undo(db.inner()).await {
                error!(kind = %mutation.kind(), error = %undo, "Could not undo unqueued change");
            }
            return Err(e.into());
        }
    }
    sync.notify_queued().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{offline_harness, producto};

    #[tokio::test]
    async fn test_failed_enqueue_undoes_local_write() {
        let h = offline_harness().await;
        let previous = producto(5, "AA-4");
        h.database().productos().insert(&previous).await.unwrap();
        crate::testing::block_queue_writes(h.database()).await;

        let mut edited = previous.clone();
        edited.descripcion = "Editada".into();
        h.database().productos().update(&edited).await.unwrap();

        let mutation = QueuedMutation::UpdateProduct {
            id: 5,
            payload: edited.to_payload(),
            previous: previous.clone(),
        };
        assert!(queue(&h.db, &h.sync, mutation).await.is_err());

        let stored = h.database().productos().get_by_id(5).await.unwrap().unwrap();
        assert_eq!(stored.descripcion, previous.descripcion);
    }
}

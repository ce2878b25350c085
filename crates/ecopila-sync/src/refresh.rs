//! # Catalog Refresh
//!
//! Pulls proveedores, rubros and productos from the server into the local
//! replica. Suppliers and rubros go first so product foreign keys resolve.
//!
//! A refresh never runs while mutations are queued: the server does not
//! know about them yet, and replacing the replica would hide the
//! optimistic rows' latest edits until the queue drains.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::api::ApiClient;
use crate::error::SyncResult;
use ecopila_core::ProductFilter;
use ecopila_db::Database;

/// What a refresh did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Refreshed {
        productos: usize,
        proveedores: usize,
        tipos: usize,
        at: DateTime<Utc>,
    },
    /// Mutations are still queued; the replica was left alone.
    SkippedPending(i64),
}

/// Replaces the confirmed part of the replica with the server's catalog.
pub async fn refresh_catalog(db: &Database, api: &ApiClient) -> SyncResult<RefreshOutcome> {
    let pending = db.mutations().count_pending().await?;
    if pending > 0 {
        debug!(pending, "Skipping catalog refresh while mutations are queued");
        return Ok(RefreshOutcome::SkippedPending(pending));
    }

    let proveedores = api.list_proveedores().await?;
    let tipos = api.list_tipos().await?;
    let productos = api.list_productos(&ProductFilter::default()).await?;

    let proveedores = db.proveedores().replace_all(&proveedores).await?;
    let tipos = db.tipos_producto().replace_all(&tipos).await?;
    let productos = db.productos().replace_all(&productos).await?;

    info!(productos, proveedores, tipos, "Catalog refreshed");
    Ok(RefreshOutcome::Refreshed {
        productos,
        proveedores,
        tipos,
        at: Utc::now(),
    })
}

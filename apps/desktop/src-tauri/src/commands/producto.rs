//! # Producto Commands
//!
//! Product list, details, optimistic CRUD, relations and the scan box.
//!
//! Reads come from the replica. Writes change the replica first and queue
//! the request; see [`crate::commands`] for the flow.

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};

use crate::commands::cart::CartResponse;
use crate::commands::{current_rate, queue};
use crate::error::{ApiError, ApiResult, ErrorCode};
use crate::state::{CartState, DbState, SyncState};
use ecopila_core::catalog::scan_lookup;
use ecopila_core::pricing::build_producto;
use ecopila_core::validation::{validate_product_payload, validate_search_query};
use ecopila_core::{
    display_id, CoreError, ProductFilter, ProductPayload, ProductRelationPayload, Producto,
    RelatedProduct, ScanOutcome, StockStatus, ValidationError,
};
use ecopila_sync::{refresh_catalog, QueuedMutation, RefreshOutcome};

/// A product as the table shows it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductoDto {
    #[serde(flatten)]
    pub producto: Producto,
    /// `00042`, or `PENDIENTE` until the server confirms the row
    pub display_id: String,
    pub pending: bool,
    pub stock_status: StockStatus,
    /// `$1.234,50`
    pub precio_publico_formatted: String,
}

impl From<Producto> for ProductoDto {
    fn from(producto: Producto) -> Self {
        ProductoDto {
            display_id: display_id(producto.id),
            pending: producto.is_pending(),
            stock_status: producto.stock_status(),
            precio_publico_formatted: producto.precio_publico().format_ars(),
            producto,
        }
    }
}

// =============================================================================
// Reads
// =============================================================================

/// Lists products matching `filter` (code, description or id substring,
/// plus exact supplier and rubro).
pub async fn list_productos(db: &DbState, filter: ProductFilter) -> ApiResult<Vec<ProductoDto>> {
    if let Some(term) = &filter.term {
        validate_search_query(term)?;
    }
    let productos = db.inner().productos().list(&filter).await?;
    debug!(count = productos.len(), "list_productos");
    Ok(productos.into_iter().map(ProductoDto::from).collect())
}

pub async fn get_producto(db: &DbState, id: i64) -> ApiResult<ProductoDto> {
    let producto = find(db, id).await?;
    Ok(producto.into())
}

/// Related products for the details view.
pub async fn get_related_productos(db: &DbState, id: i64) -> ApiResult<Vec<RelatedProduct>> {
    find(db, id).await?;
    Ok(db.inner().productos().list_related(id).await?)
}

async fn find(db: &DbState, id: i64) -> ApiResult<Producto> {
    db.inner()
        .productos()
        .get_by_id(id)
        .await?
        .ok_or_else(|| CoreError::ProductoNotFound(id).into())
}

// =============================================================================
// Optimistic Writes
// =============================================================================

/// Creates a product under a temporary id and queues the create.
pub async fn create_producto(
    db: &DbState,
    sync: &SyncState,
    payload: ProductPayload,
) -> ApiResult<ProductoDto> {
    let payload = validate_product_payload(payload)?;
    ensure_unique_codigo(db, &payload.codigo_producto, None).await?;

    let rate = current_rate(sync).await?;
    let temp_id = db.next_temp_id();
    let producto = build_producto(temp_id, &payload, rate, Utc::now())?;
    db.inner().productos().insert(&producto).await?;

    queue(db, sync, QueuedMutation::CreateProduct { temp_id, payload }).await?;

    info!(temp_id, codigo = %producto.codigo_producto, "Producto created (pending)");
    Ok(producto.into())
}

/// Applies `payload` to the local row and queues the update. The previous
/// row travels with the mutation so a rejection can restore it.
pub async fn update_producto(
    db: &DbState,
    sync: &SyncState,
    id: i64,
    payload: ProductPayload,
) -> ApiResult<ProductoDto> {
    let payload = validate_product_payload(payload)?;
    let previous = find(db, id).await?;
    ensure_unique_codigo(db, &payload.codigo_producto, Some(id)).await?;

    let rate = current_rate(sync).await?;
    let mut updated = previous.clone();
    updated.apply_payload(&payload, rate, Utc::now())?;
    db.inner().productos().update(&updated).await?;

    queue(
        db,
        sync,
        QueuedMutation::UpdateProduct {
            id,
            payload,
            previous,
        },
    )
    .await?;

    info!(id, "Producto updated");
    Ok(updated.into())
}

/// Removes the row and queues the delete. Deleting a row whose create is
/// still queued cancels the create instead.
pub async fn delete_producto(db: &DbState, sync: &SyncState, id: i64) -> ApiResult<()> {
    let snapshot = find(db, id).await?;
    db.inner().productos().delete(id).await?;

    queue(db, sync, QueuedMutation::DeleteProduct { id, snapshot }).await?;

    info!(id, "Producto deleted");
    Ok(())
}

async fn ensure_unique_codigo(db: &DbState, codigo: &str, own_id: Option<i64>) -> ApiResult<()> {
    match db.inner().productos().get_by_codigo(codigo).await? {
        Some(existing) if Some(existing.id) != own_id => Err(ValidationError::Duplicate {
            field: "codigo_producto".to_string(),
            value: codigo.to_string(),
        }
        .into()),
        _ => Ok(()),
    }
}

// =============================================================================
// Relations
// =============================================================================

/// Relates `id` with each of `related_ids` (unknown ids are skipped).
/// Returns the product's related list afterwards.
pub async fn relate_productos(
    db: &DbState,
    sync: &SyncState,
    id: i64,
    related_ids: Vec<i64>,
) -> ApiResult<Vec<RelatedProduct>> {
    find(db, id).await?;
    let repo = db.inner().productos();

    let previous: Vec<i64> = repo.list_related(id).await?.into_iter().map(|r| r.id).collect();
    let mut related_ids = related_ids;
    related_ids.retain(|other| *other != id);
    related_ids.sort_unstable();
    related_ids.dedup();
    if related_ids.is_empty() {
        return Err(ApiError::validation("Seleccione al menos un producto para relacionar"));
    }

    let added = repo.relate(id, &related_ids).await?;
    debug!(id, added, "Relations stored locally");

    queue(
        db,
        sync,
        QueuedMutation::RelateProducts {
            id,
            related_ids,
            previous,
        },
    )
    .await?;

    Ok(repo.list_related(id).await?)
}

pub async fn add_relacion(
    db: &DbState,
    sync: &SyncState,
    relation: ProductRelationPayload,
) -> ApiResult<()> {
    if relation.producto_id == relation.producto_relacionado_id {
        return Err(ApiError::validation("Un producto no puede relacionarse consigo mismo"));
    }
    db.inner()
        .productos()
        .add_relation(relation.producto_id, relation.producto_relacionado_id)
        .await?;
    queue(db, sync, QueuedMutation::RelateProduct { relation }).await
}

pub async fn remove_relacion(
    db: &DbState,
    sync: &SyncState,
    relation: ProductRelationPayload,
) -> ApiResult<()> {
    let removed = db
        .inner()
        .productos()
        .remove_relation(relation.producto_id, relation.producto_relacionado_id)
        .await?;
    if !removed {
        return Err(ApiError::new(
            ErrorCode::NotFound,
            format!(
                "Relación no encontrada: {} - {}",
                relation.producto_id, relation.producto_relacionado_id
            ),
        ));
    }
    queue(db, sync, QueuedMutation::UnrelateProduct { relation }).await
}

// =============================================================================
// Scan
// =============================================================================

/// What pressing Enter in the search box did.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ScanResponse {
    Added { cart: CartResponse },
    NoMatch { message: String },
    Multiple { count: usize, message: String },
}

/// Adds the product to the cart when `term` matches exactly one confirmed
/// product.
pub async fn scan_producto(
    db: &DbState,
    cart: &CartState,
    term: String,
) -> ApiResult<ScanResponse> {
    let term = validate_search_query(&term)?;
    let filter = ProductFilter::term(term);
    let candidates = db.inner().productos().list(&filter).await?;

    match scan_lookup(&candidates, &filter) {
        ScanOutcome::Single(producto) => {
            cart.with_cart_mut(|c| c.add_item(producto, 1))?;
            debug!(id = producto.id, "Scanned into cart");
            Ok(ScanResponse::Added {
                cart: cart.with_cart(|c| CartResponse::from(c)),
            })
        }
        ScanOutcome::Pending(producto) => Err(CoreError::ProductoPending(producto.id).into()),
        ScanOutcome::NoMatch => Ok(ScanResponse::NoMatch {
            message: "Producto no encontrado".to_string(),
        }),
        ScanOutcome::Multiple(count) => Ok(ScanResponse::Multiple {
            count,
            message: "Múltiples productos coinciden".to_string(),
        }),
    }
}

// =============================================================================
// Refresh
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub refreshed: bool,
    /// Queued mutations that held the refresh back.
    pub pending: i64,
    pub productos: usize,
}

/// Pulls the catalog from the server. Offline, or with writes still
/// queued, the replica is left as is.
pub async fn refresh_productos(db: &DbState, sync: &SyncState) -> ApiResult<RefreshResponse> {
    if !sync.online().is_online() {
        return Ok(RefreshResponse {
            refreshed: false,
            pending: db.inner().mutations().count_pending().await?,
            productos: db.inner().productos().count().await? as usize,
        });
    }

    match refresh_catalog(db.inner(), sync.api()).await? {
        RefreshOutcome::Refreshed { productos, .. } => Ok(RefreshResponse {
            refreshed: true,
            pending: 0,
            productos,
        }),
        RefreshOutcome::SkippedPending(pending) => Ok(RefreshResponse {
            refreshed: false,
            pending,
            productos: db.inner().productos().count().await? as usize,
        }),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{block_queue_writes, harness, offline_harness, payload, producto, serve};
    use axum::routing::get;
    use axum::{Json, Router};
    use ecopila_core::{is_optimistic_id, MutationKind};
    use serde_json::json;

    #[tokio::test]
    async fn test_create_is_optimistic() {
        let h = offline_harness().await;

        let dto = create_producto(&h.db, &h.sync, payload("AA-4")).await.unwrap();
        assert!(dto.pending);
        assert_eq!(dto.display_id, "PENDIENTE");
        assert!(is_optimistic_id(dto.producto.id));
        assert!(dto.producto.precio_publico_cents > 0);

        let stored = h.database().productos().get_by_id(dto.producto.id).await.unwrap();
        assert!(stored.is_some());

        let queued = h.database().mutations().get_pending(10).await.unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].kind, MutationKind::CreateProduct);
        assert_eq!(queued[0].entity_id, dto.producto.id.to_string());
    }

    #[tokio::test]
    async fn test_create_that_cannot_queue_leaves_no_row() {
        let h = offline_harness().await;
        block_queue_writes(h.database()).await;

        assert!(create_producto(&h.db, &h.sync, payload("AA-4")).await.is_err());
        assert!(h.database().productos().get_by_codigo("AA-4").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_and_duplicate() {
        let h = offline_harness().await;

        let mut bad = payload("AA-4");
        bad.descripcion = "  ".into();
        let err = create_producto(&h.db, &h.sync, bad).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);

        h.database().productos().insert(&producto(1, "AA-4")).await.unwrap();
        let err = create_producto(&h.db, &h.sync, payload("AA-4")).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);
        assert_eq!(h.database().mutations().count_pending().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_update_keeps_previous_for_rollback() {
        let h = offline_harness().await;
        let before = producto(5, "AA-4");
        h.database().productos().insert(&before).await.unwrap();

        let mut changed = payload("AA-4");
        changed.precio_sin_iva_cents = Some(2000);
        let dto = update_producto(&h.db, &h.sync, 5, changed).await.unwrap();
        assert!(dto.producto.precio_publico_cents > before.precio_publico_cents);

        let entry = &h.database().mutations().get_pending(1).await.unwrap()[0];
        match QueuedMutation::from_entry(entry).unwrap() {
            QueuedMutation::UpdateProduct { id, previous, .. } => {
                assert_eq!(id, 5);
                assert_eq!(previous.precio_publico_cents, before.precio_publico_cents);
            }
            other => panic!("unexpected mutation {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let h = offline_harness().await;
        let err = update_producto(&h.db, &h.sync, 77, payload("X-1")).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_delete_of_pending_create_cancels_both() {
        let h = offline_harness().await;
        let dto = create_producto(&h.db, &h.sync, payload("AA-4")).await.unwrap();

        delete_producto(&h.db, &h.sync, dto.producto.id).await.unwrap();

        assert!(h.database().productos().get_by_id(dto.producto.id).await.unwrap().is_none());
        assert_eq!(h.database().mutations().count_pending().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_confirmed_is_queued() {
        let h = offline_harness().await;
        h.database().productos().insert(&producto(5, "AA-4")).await.unwrap();

        delete_producto(&h.db, &h.sync, 5).await.unwrap();

        let queued = h.database().mutations().get_pending(10).await.unwrap();
        assert_eq!(queued[0].kind, MutationKind::DeleteProduct);
    }

    #[tokio::test]
    async fn test_relations_round_trip() {
        let h = offline_harness().await;
        for (id, codigo) in [(1, "A"), (2, "B"), (3, "C")] {
            h.database().productos().insert(&producto(id, codigo)).await.unwrap();
        }

        let related = relate_productos(&h.db, &h.sync, 1, vec![2, 3, 1]).await.unwrap();
        assert_eq!(related.len(), 2);

        let relation = ProductRelationPayload {
            producto_id: 3,
            producto_relacionado_id: 1,
        };
        remove_relacion(&h.db, &h.sync, relation).await.unwrap();
        assert_eq!(get_related_productos(&h.db, 1).await.unwrap().len(), 1);

        let err = remove_relacion(&h.db, &h.sync, relation).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);

        assert_eq!(h.database().mutations().count_pending().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_scan_adds_single_match() {
        let h = offline_harness().await;
        h.database().productos().insert(&producto(1, "AA-4")).await.unwrap();
        h.database().productos().insert(&producto(2, "AAA-2")).await.unwrap();

        match scan_producto(&h.db, &h.cart, "aaa".into()).await.unwrap() {
            ScanResponse::Added { cart } => assert_eq!(cart.items[0].producto_id, 2),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            scan_producto(&h.db, &h.cart, "aa".into()).await.unwrap(),
            ScanResponse::Multiple { count: 2, .. }
        ));
        assert!(matches!(
            scan_producto(&h.db, &h.cart, "zz".into()).await.unwrap(),
            ScanResponse::NoMatch { .. }
        ));
    }

    #[tokio::test]
    async fn test_scan_refuses_pending() {
        let h = offline_harness().await;
        create_producto(&h.db, &h.sync, payload("NEW-1")).await.unwrap();

        let err = scan_producto(&h.db, &h.cart, "new-1".into()).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::CartError);
        assert!(h.cart.with_cart(|c| c.is_empty()));
    }

    #[tokio::test]
    async fn test_refresh_offline_leaves_replica() {
        let h = offline_harness().await;
        h.database().productos().insert(&producto(1, "AA-4")).await.unwrap();

        let response = refresh_productos(&h.db, &h.sync).await.unwrap();
        assert_eq!(
            response,
            RefreshResponse {
                refreshed: false,
                pending: 0,
                productos: 1
            }
        );
    }

    #[tokio::test]
    async fn test_refresh_online_replaces_replica() {
        let router = Router::new()
            .route("/api/proveedor/proveedores", get(|| async { Json(json!([])) }))
            .route("/api/tipo-producto/tiposproducto", get(|| async { Json(json!([])) }))
            .route(
                "/api/producto/productos",
                get(|| async {
                    Json(json!([{
                        "id": 11,
                        "codigo_producto": "AA-4",
                        "descripcion": "Pila AA x4",
                        "cantidad": 5,
                        "iva": 0.21,
                        "porcentaje_ganancia": 30,
                        "precio_publico": 16520.0
                    }]))
                }),
            );
        let h = harness(serve(router).await).await;
        h.database().productos().insert(&producto(1, "OLD")).await.unwrap();

        let response = refresh_productos(&h.db, &h.sync).await.unwrap();
        assert!(response.refreshed);
        assert_eq!(response.productos, 1);

        let list = list_productos(&h.db, ProductFilter::default()).await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].producto.id, 11);
        assert_eq!(list[0].display_id, "00011");
    }
}

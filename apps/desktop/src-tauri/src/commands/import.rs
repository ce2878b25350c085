//! # Import / Export Commands
//!
//! ## Bulk Upload
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  run_import(csv, proveedor_id)                                          │
//! │       │                                                                 │
//! │       ├── plan_import ─────────────────► IMPORT_ERROR (file, columns)   │
//! │       │                                                                 │
//! │       ├── missing rubros?                                               │
//! │       │     online:  POST tiposproducto/bulk, store the reply           │
//! │       │     offline: insert with temp ids, queue bulk_tipo_producto     │
//! │       │                                                                 │
//! │       ├── resolve ─────────────────────► IMPORT_ERROR (bad lines)       │
//! │       │                                                                 │
//! │       └── insert rows with temp ids, queue bulk_upload_products         │
//! │             (rubro temp ids are rewritten when the rubros confirm)      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashSet;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::commands::{current_rate, queue};
use crate::error::ApiResult;
use crate::state::{DbState, SessionState, SyncState};
use ecopila_core::export::export_products_csv;
use ecopila_core::import::{plan_import, ImportPlan, ImportPreview};
use ecopila_core::pricing::build_producto;
use ecopila_core::{
    CoreError, ImportError, ProductFilter, ProductPayload, TipoProducto, TipoProductoPayload,
};
use ecopila_sync::QueuedMutation;

/// Checks a file without touching anything.
pub async fn preview_import(
    db: &DbState,
    csv: String,
    proveedor_id: Option<i64>,
) -> ApiResult<ImportPreview> {
    let rubros = db.inner().tipos_producto().list().await?;
    let plan = plan_import(&csv, proveedor_id, &rubros)?;
    Ok(plan.preview(&rubros))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResult {
    /// New products, pending until the upload goes through.
    pub productos: usize,
    /// Rows not inserted locally: codes already in the replica or repeated
    /// in the file. The server still gets them.
    pub existentes: usize,
    pub rubros_creados: Vec<String>,
}

/// Uploads a supplier's CSV price list.
pub async fn run_import(
    db: &DbState,
    session: &SessionState,
    sync: &SyncState,
    csv: String,
    proveedor_id: Option<i64>,
) -> ApiResult<ImportResult> {
    session.require_admin().await?;

    let existing = db.inner().tipos_producto().list().await?;
    let plan = plan_import(&csv, proveedor_id, &existing)?;
    if db.inner().proveedores().get_by_id(plan.proveedor_id).await?.is_none() {
        return Err(CoreError::ProveedorNotFound(plan.proveedor_id).into());
    }

    let created = create_missing_rubros(db, sync, &plan).await?;
    let mut rubros = existing;
    rubros.extend(created.iter().cloned());

    let payloads = plan.resolve(&rubros).into_upload()?;
    let (productos, existentes) = upload(db, sync, payloads).await?;

    info!(
        proveedor_id = plan.proveedor_id,
        productos,
        existentes,
        rubros = created.len(),
        "Import queued"
    );
    Ok(ImportResult {
        productos,
        existentes,
        rubros_creados: created.into_iter().map(|t| t.nombre).collect(),
    })
}

/// Creates the plan's missing rubros, on the server when it answers.
async fn create_missing_rubros(
    db: &DbState,
    sync: &SyncState,
    plan: &ImportPlan,
) -> ApiResult<Vec<TipoProducto>> {
    if plan.missing_rubros.is_empty() {
        return Ok(Vec::new());
    }
    let payloads: Vec<TipoProductoPayload> = plan
        .missing_rubros
        .iter()
        .map(|nombre| TipoProductoPayload {
            nombre: nombre.clone(),
        })
        .collect();

    if sync.online().is_online() {
        match sync.api().create_tipos_bulk(&payloads).await {
            Ok(tipos) => {
                let failed: Vec<String> = plan
                    .missing_rubros
                    .iter()
                    .filter(|nombre| {
                        !tipos
                            .iter()
                            .any(|t| t.nombre.trim().eq_ignore_ascii_case(nombre.trim()))
                    })
                    .cloned()
                    .collect();
                for tipo in &tipos {
                    db.inner().tipos_producto().upsert(tipo).await?;
                }
                if !failed.is_empty() {
                    return Err(ImportError::RubroCreationFailed(failed).into());
                }
                return Ok(tipos);
            }
            Err(e) if e.is_retryable() => {
                warn!(error = %e, "Rubro creation unreachable, queueing it");
            }
            Err(e) => {
                warn!(error = %e, "Server rejected rubro creation");
                return Err(ImportError::RubroCreationFailed(plan.missing_rubros.clone()).into());
            }
        }
    }

    let temp_ids = db.next_temp_ids(payloads.len());
    let tipos: Vec<TipoProducto> = temp_ids
        .iter()
        .zip(&payloads)
        .map(|(&id, p)| TipoProducto {
            id,
            nombre: p.nombre.clone(),
        })
        .collect();
    db.inner().tipos_producto().insert_many(&tipos).await?;
    queue(db, sync, QueuedMutation::BulkTipoProducto { temp_ids, payloads }).await?;
    Ok(tipos)
}

/// Inserts the new codes locally and queues the whole upload. Returns
/// (inserted, already known).
async fn upload(
    db: &DbState,
    sync: &SyncState,
    payloads: Vec<ProductPayload>,
) -> ApiResult<(usize, usize)> {
    let repo = db.inner().productos();
    let rate = current_rate(sync).await?;
    let now = Utc::now();

    let mut seen = HashSet::new();
    let mut fresh = Vec::new();
    for payload in &payloads {
        if !seen.insert(payload.codigo_producto.to_lowercase()) {
            continue;
        }
        if repo.get_by_codigo(&payload.codigo_producto).await?.is_none() {
            fresh.push(payload);
        }
    }

    let temp_ids = db.next_temp_ids(fresh.len());
    let productos = temp_ids
        .iter()
        .zip(&fresh)
        .map(|(&id, payload)| build_producto(id, payload, rate, now))
        .collect::<Result<Vec<_>, _>>()?;
    repo.insert_many(&productos).await?;

    let inserted = productos.len();
    let existing = payloads.len() - inserted;
    queue(db, sync, QueuedMutation::BulkUploadProducts { temp_ids, payloads }).await?;
    Ok((inserted, existing))
}

/// The whole catalog in the import layout.
pub async fn export_productos_csv(db: &DbState) -> ApiResult<String> {
    let productos = db.inner().productos().list(&ProductFilter::default()).await?;
    let rubros = db.inner().tipos_producto().list().await?;
    Ok(export_products_csv(&productos, &rubros)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::testing::{harness, offline_harness, producto, serve, Harness};
    use axum::routing::post;
    use axum::{Json, Router};
    use ecopila_core::{is_optimistic_id, MutationKind, Proveedor, Role};

    const FILE: &str = "\
CODIGO,DESCRIPCION,US S/IVA,%GAN,IVA,RES
,PILAS,,,,
AA-4,Pila AA alcalina x4,2.10,35,1.21,10
AAA-2,Pila AAA x2,1.05,,,
,Cargadores,,,,
CH-USB,Cargador USB,4.80,40,1.105,50
";

    async fn with_proveedor(h: &Harness) {
        h.database()
            .proveedores()
            .insert(&Proveedor {
                id: 2,
                nombre: "Energizer".to_string(),
                contacto: "-".to_string(),
            })
            .await
            .unwrap();
        h.database()
            .tipos_producto()
            .insert(&TipoProducto {
                id: 7,
                nombre: "Pilas".to_string(),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_preview_lists_new_rubros() {
        let h = offline_harness().await;
        with_proveedor(&h).await;

        let preview = preview_import(&h.db, FILE.to_string(), Some(2)).await.unwrap();
        assert_eq!(preview.productos, 3);
        assert_eq!(preview.rubros_nuevos, vec!["Cargadores".to_string()]);
        assert!(preview.errores.is_empty());

        let err = preview_import(&h.db, FILE.to_string(), None).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ImportError);
    }

    #[tokio::test]
    async fn test_offline_import_queues_rubros_then_products() {
        let h = offline_harness().await;
        with_proveedor(&h).await;
        h.database().productos().insert(&producto(1, "AA-4")).await.unwrap();

        let result = run_import(&h.db, &h.session, &h.sync, FILE.to_string(), Some(2))
            .await
            .unwrap();
        assert_eq!(result.productos, 2);
        assert_eq!(result.existentes, 1);
        assert_eq!(result.rubros_creados, vec!["Cargadores".to_string()]);

        let cargadores = h
            .database()
            .tipos_producto()
            .find_by_nombre("cargadores")
            .await
            .unwrap()
            .unwrap();
        assert!(is_optimistic_id(cargadores.id));

        let usb = h.database().productos().get_by_codigo("CH-USB").await.unwrap().unwrap();
        assert!(usb.is_pending());
        assert_eq!(usb.tipo_producto_id, Some(cargadores.id));

        let kinds: Vec<MutationKind> = h
            .database()
            .mutations()
            .get_pending(10)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.kind)
            .collect();
        assert_eq!(kinds, vec![MutationKind::BulkTipoProducto, MutationKind::BulkUploadProducts]);
    }

    #[tokio::test]
    async fn test_online_import_creates_rubros_first() {
        let router = Router::new().route(
            "/api/tipo-producto/tiposproducto/bulk",
            post(|Json(body): Json<Vec<TipoProductoPayload>>| async move {
                Json(
                    body.into_iter()
                        .enumerate()
                        .map(|(i, p)| TipoProducto {
                            id: 40 + i as i64,
                            nombre: p.nombre,
                        })
                        .collect::<Vec<_>>(),
                )
            }),
        );
        let h = harness(serve(router).await).await;
        with_proveedor(&h).await;

        run_import(&h.db, &h.session, &h.sync, FILE.to_string(), Some(2))
            .await
            .unwrap();

        let usb = h.database().productos().get_by_codigo("CH-USB").await.unwrap().unwrap();
        assert_eq!(usb.tipo_producto_id, Some(40));
        let queued = h.database().mutations().get_pending(10).await.unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].kind, MutationKind::BulkUploadProducts);
    }

    #[tokio::test]
    async fn test_import_rejects_bad_input() {
        let h = offline_harness().await;
        with_proveedor(&h).await;

        let err = run_import(&h.db, &h.session, &h.sync, FILE.to_string(), Some(99))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);

        let err = run_import(&h.db, &h.session, &h.sync, "CODIGO\nAA-4\n".to_string(), Some(2))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ImportError);

        h.login(Role::User).await;
        let err = run_import(&h.db, &h.session, &h.sync, FILE.to_string(), Some(2))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Forbidden);
    }

    #[tokio::test]
    async fn test_export_groups_by_rubro() {
        let h = offline_harness().await;
        with_proveedor(&h).await;
        let mut p = producto(1, "AA-4");
        p.tipo_producto_id = Some(7);
        h.database().productos().insert(&p).await.unwrap();

        let csv = export_productos_csv(&h.db).await.unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "CODIGO,DESCRIPCION,US S/IVA,%GAN,IVA,RES");
        assert_eq!(lines[1], ",Pilas,,,,");
        assert!(lines[2].starts_with("AA-4,"));
    }
}

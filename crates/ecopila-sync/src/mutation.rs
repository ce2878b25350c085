//! # Queued Mutations
//!
//! The typed form of a `mutation_queue` row: the request to replay plus
//! whatever is needed to undo the optimistic change if the server says no.
//!
//! ```text
//!   command                 mutation_queue                 processor
//!   ───────                 ──────────────                 ─────────
//!   optimistic write ──►  { "type": "update_product",  ──► PUT /producto/..
//!                           "id": 42,                       │
//!                           "payload": {...},               ├─ ok: upsert reply
//!                           "previous": {...} }             └─ 4xx: restore
//!                                                               "previous"
//! ```

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{SyncError, SyncResult};
use ecopila_core::{
    is_optimistic_id, MutationEntry, MutationKind, ProductPayload, ProductRelationPayload,
    Producto, Proveedor, ProveedorPayload, TipoProducto, TipoProductoPayload, VentaPayload,
};
use ecopila_db::{Database, DbError, DbResult};

/// A write waiting for the server, with its rollback data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueuedMutation {
    CreateProduct {
        temp_id: i64,
        payload: ProductPayload,
    },
    UpdateProduct {
        id: i64,
        payload: ProductPayload,
        previous: Producto,
    },
    DeleteProduct {
        id: i64,
        snapshot: Producto,
    },

    CreateProveedor {
        temp_id: i64,
        payload: ProveedorPayload,
    },
    UpdateProveedor {
        id: i64,
        payload: ProveedorPayload,
        previous: Proveedor,
    },
    DeleteProveedor {
        id: i64,
        snapshot: Proveedor,
    },

    CreateTipoProducto {
        temp_id: i64,
        payload: TipoProductoPayload,
    },
    UpdateTipoProducto {
        id: i64,
        payload: TipoProductoPayload,
        previous: TipoProducto,
    },
    DeleteTipoProducto {
        id: i64,
        snapshot: TipoProducto,
    },

    /// Rubros created on the fly by a CSV import.
    BulkTipoProducto {
        temp_ids: Vec<i64>,
        payloads: Vec<TipoProductoPayload>,
    },
    BulkUploadProducts {
        temp_ids: Vec<i64>,
        payloads: Vec<ProductPayload>,
    },

    /// Adds several relations from one product.
    RelateProducts {
        id: i64,
        related_ids: Vec<i64>,
        /// Relations that already existed (kept on rollback).
        previous: Vec<i64>,
    },
    RelateProduct {
        relation: ProductRelationPayload,
    },
    UnrelateProduct {
        relation: ProductRelationPayload,
    },

    RegistrarVenta {
        venta: VentaPayload,
    },
}

impl QueuedMutation {
    pub fn kind(&self) -> MutationKind {
        match self {
            QueuedMutation::CreateProduct { .. } => MutationKind::CreateProduct,
            QueuedMutation::UpdateProduct { .. } => MutationKind::UpdateProduct,
            QueuedMutation::DeleteProduct { .. } => MutationKind::DeleteProduct,
            QueuedMutation::CreateProveedor { .. } => MutationKind::CreateProveedor,
            QueuedMutation::UpdateProveedor { .. } => MutationKind::UpdateProveedor,
            QueuedMutation::DeleteProveedor { .. } => MutationKind::DeleteProveedor,
            QueuedMutation::CreateTipoProducto { .. } => MutationKind::CreateTipoProducto,
            QueuedMutation::UpdateTipoProducto { .. } => MutationKind::UpdateTipoProducto,
            QueuedMutation::DeleteTipoProducto { .. } => MutationKind::DeleteTipoProducto,
            QueuedMutation::BulkTipoProducto { .. } => MutationKind::BulkTipoProducto,
            QueuedMutation::BulkUploadProducts { .. } => MutationKind::BulkUploadProducts,
            QueuedMutation::RelateProducts { .. } => MutationKind::RelateProducts,
            QueuedMutation::RelateProduct { .. } => MutationKind::RelateProduct,
            QueuedMutation::UnrelateProduct { .. } => MutationKind::UnrelateProduct,
            QueuedMutation::RegistrarVenta { .. } => MutationKind::RegistrarVenta,
        }
    }

    /// The row the mutation targets, as stored in `entity_id`.
    pub fn entity_id(&self) -> String {
        match self {
            QueuedMutation::CreateProduct { temp_id, .. }
            | QueuedMutation::CreateProveedor { temp_id, .. }
            | QueuedMutation::CreateTipoProducto { temp_id, .. } => temp_id.to_string(),

            QueuedMutation::UpdateProduct { id, .. }
            | QueuedMutation::DeleteProduct { id, .. }
            | QueuedMutation::UpdateProveedor { id, .. }
            | QueuedMutation::DeleteProveedor { id, .. }
            | QueuedMutation::UpdateTipoProducto { id, .. }
            | QueuedMutation::DeleteTipoProducto { id, .. }
            | QueuedMutation::RelateProducts { id, .. } => id.to_string(),

            QueuedMutation::RelateProduct { relation }
            | QueuedMutation::UnrelateProduct { relation } => relation.producto_id.to_string(),

            QueuedMutation::BulkTipoProducto { .. } => "rubros".to_string(),
            QueuedMutation::BulkUploadProducts { .. } => "productos".to_string(),
            QueuedMutation::RegistrarVenta { .. } => "venta".to_string(),
        }
    }

    /// The create that must reach the server before this delete makes
    /// sense, when the target only exists locally.
    fn pending_create(&self) -> Option<(MutationKind, i64)> {
        match *self {
            QueuedMutation::DeleteProduct { id, .. } if is_optimistic_id(id) => {
                Some((MutationKind::CreateProduct, id))
            }
            QueuedMutation::DeleteProveedor { id, .. } if is_optimistic_id(id) => {
                Some((MutationKind::CreateProveedor, id))
            }
            QueuedMutation::DeleteTipoProducto { id, .. } if is_optimistic_id(id) => {
                Some((MutationKind::CreateTipoProducto, id))
            }
            _ => None,
        }
    }

    pub fn to_json(&self) -> SyncResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decodes a queue row, checking that its kind column agrees with the
    /// payload.
    pub fn from_entry(entry: &MutationEntry) -> SyncResult<Self> {
        let mutation: QueuedMutation = serde_json::from_str(&entry.payload)?;
        if mutation.kind() != entry.kind {
            return Err(SyncError::InvalidPayload(format!(
                "entry {} is {} but its payload is {}",
                entry.id,
                entry.kind,
                mutation.kind()
            )));
        }
        Ok(mutation)
    }

    /// Persists the mutation.
    ///
    /// Deleting a row whose create is still waiting in the queue cancels
    /// the create (and anything queued against the row) instead; nothing is
    /// queued and `None` is returned. Once the processor has claimed the
    /// create the delete is queued as usual and follows the row to its
    /// server id.
    pub async fn enqueue(&self, db: &Database) -> SyncResult<Option<MutationEntry>> {
        if let Some((create_kind, temp_id)) = self.pending_create() {
            let cancelled = db
                .mutations()
                .cancel_unclaimed_create(create_kind, &temp_id.to_string())
                .await?;
            if cancelled > 0 {
                info!(temp_id, cancelled, "Delete cancelled queued create");
                return Ok(None);
            }
        }

        let entry = db
            .mutations()
            .enqueue(self.kind(), &self.entity_id(), &self.to_json()?)
            .await?;
        debug!(id = %entry.id, kind = %entry.kind, "Mutation queued");
        Ok(Some(entry))
    }

    /// Reverts the optimistic change this mutation made to the replica.
    /// Used when the server rejects it and when it could not be queued.
    pub async fn undo(&self, db: &Database) -> SyncResult<()> {
        match self {
            QueuedMutation::CreateProduct { temp_id, .. } => {
                ignore_missing(db.productos().delete(*temp_id).await)?;
            }
            QueuedMutation::UpdateProduct { previous, .. } => {
                db.productos().upsert(previous).await?;
            }
            QueuedMutation::DeleteProduct { snapshot, .. } => {
                db.productos().upsert(snapshot).await?;
            }

            QueuedMutation::CreateProveedor { temp_id, .. } => {
                ignore_missing(db.proveedores().delete(*temp_id).await)?;
            }
            QueuedMutation::UpdateProveedor { previous, .. } => {
                db.proveedores().upsert(previous).await?;
            }
            QueuedMutation::DeleteProveedor { snapshot, .. } => {
                db.proveedores().upsert(snapshot).await?;
            }

            QueuedMutation::CreateTipoProducto { temp_id, .. } => {
                ignore_missing(db.tipos_producto().delete(*temp_id).await)?;
            }
            QueuedMutation::UpdateTipoProducto { previous, .. } => {
                db.tipos_producto().upsert(previous).await?;
            }
            QueuedMutation::DeleteTipoProducto { snapshot, .. } => {
                db.tipos_producto().upsert(snapshot).await?;
            }

            QueuedMutation::BulkTipoProducto { temp_ids, .. } => {
                for id in temp_ids {
                    ignore_missing(db.tipos_producto().delete(*id).await)?;
                }
            }
            QueuedMutation::BulkUploadProducts { temp_ids, .. } => {
                for id in temp_ids {
                    ignore_missing(db.productos().delete(*id).await)?;
                }
            }

            QueuedMutation::RelateProducts {
                id,
                related_ids,
                previous,
            } => {
                for other in related_ids.iter().filter(|o| !previous.contains(o)) {
                    db.productos().remove_relation(*id, *other).await?;
                }
            }
            QueuedMutation::RelateProduct { relation } => {
                db.productos()
                    .remove_relation(relation.producto_id, relation.producto_relacionado_id)
                    .await?;
            }
            QueuedMutation::UnrelateProduct { relation } => {
                ignore_missing(
                    db.productos()
                        .add_relation(relation.producto_id, relation.producto_relacionado_id)
                        .await,
                )?;
            }

            QueuedMutation::RegistrarVenta { venta } => {
                for item in &venta.items {
                    ignore_missing(db.productos().adjust_stock(item.id, item.cantidad).await)?;
                }
            }
        }
        debug!(kind = %self.kind(), "Rolled back optimistic change");
        Ok(())
    }
}

/// A row that is already gone needs no undoing.
pub(crate) fn ignore_missing<T>(result: DbResult<T>) -> DbResult<()> {
    match result {
        Ok(_) => Ok(()),
        Err(DbError::NotFound { .. }) => Ok(()),
        Err(e) => Err(e),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{database, payload, producto};

    #[test]
    fn test_json_is_tagged() {
        let mutation = QueuedMutation::RelateProduct {
            relation: ProductRelationPayload {
                producto_id: 1,
                producto_relacionado_id: 2,
            },
        };
        let json = mutation.to_json().unwrap();
        assert!(json.starts_with(r#"{"type":"relate_product""#));
        assert_eq!(mutation.entity_id(), "1");
    }

    #[tokio::test]
    async fn test_from_entry_rejects_kind_mismatch() {
        let db = database().await;
        let entry = db
            .mutations()
            .enqueue(
                MutationKind::DeleteProduct,
                "5",
                r#"{"type":"registrar_venta","venta":{"items":[],"total_cents":0}}"#,
            )
            .await
            .unwrap();

        assert!(matches!(
            QueuedMutation::from_entry(&entry),
            Err(SyncError::InvalidPayload(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_of_queued_create_cancels_both() {
        let db = database().await;
        let temp_id = 1_700_000_000_000;

        let create = QueuedMutation::CreateProduct {
            temp_id,
            payload: payload("AA-4"),
        };
        create.enqueue(&db).await.unwrap().unwrap();

        let local = producto(temp_id, "AA-4");
        let update = QueuedMutation::UpdateProduct {
            id: temp_id,
            payload: payload("AA-4"),
            previous: local.clone(),
        };
        update.enqueue(&db).await.unwrap().unwrap();

        let delete = QueuedMutation::DeleteProduct {
            id: temp_id,
            snapshot: local,
        };
        assert!(delete.enqueue(&db).await.unwrap().is_none());
        assert_eq!(db.mutations().count_pending().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_of_claimed_create_is_queued() {
        let db = database().await;
        let temp_id = 1_700_000_000_000;

        let create = QueuedMutation::CreateProduct {
            temp_id,
            payload: payload("AA-4"),
        };
        let entry = create.enqueue(&db).await.unwrap().unwrap();
        assert!(db.mutations().claim(&entry.id).await.unwrap());

        let delete = QueuedMutation::DeleteProduct {
            id: temp_id,
            snapshot: producto(temp_id, "AA-4"),
        };
        let queued = delete.enqueue(&db).await.unwrap().unwrap();
        assert_eq!(queued.kind, MutationKind::DeleteProduct);
        assert_eq!(db.mutations().count_pending().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_delete_of_confirmed_row_is_queued() {
        let db = database().await;
        let delete = QueuedMutation::DeleteProduct {
            id: 42,
            snapshot: producto(42, "AA-4"),
        };

        let entry = delete.enqueue(&db).await.unwrap().unwrap();
        assert_eq!(entry.kind, MutationKind::DeleteProduct);
        assert_eq!(entry.entity_id, "42");
        assert_eq!(QueuedMutation::from_entry(&entry).unwrap(), delete);
    }
}

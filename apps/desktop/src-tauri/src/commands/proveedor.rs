//! # Proveedor Commands
//!
//! Supplier CRUD. Reads are open to every user; writes need an admin
//! session and go through the mutation queue like product writes.

use tracing::info;

use crate::commands::queue;
use crate::error::ApiResult;
use crate::state::{DbState, SessionState, SyncState};
use ecopila_core::validation::{validate_contacto, validate_nombre};
use ecopila_core::{CoreError, Proveedor, ProveedorPayload};
use ecopila_sync::QueuedMutation;

pub async fn list_proveedores(db: &DbState) -> ApiResult<Vec<Proveedor>> {
    Ok(db.inner().proveedores().list().await?)
}

pub async fn get_proveedor(db: &DbState, id: i64) -> ApiResult<Proveedor> {
    find(db, id).await
}

async fn find(db: &DbState, id: i64) -> ApiResult<Proveedor> {
    db.inner()
        .proveedores()
        .get_by_id(id)
        .await?
        .ok_or_else(|| CoreError::ProveedorNotFound(id).into())
}

fn validate(payload: ProveedorPayload) -> ApiResult<ProveedorPayload> {
    Ok(ProveedorPayload {
        nombre: validate_nombre(&payload.nombre)?,
        contacto: validate_contacto(&payload.contacto)?,
    })
}

pub async fn create_proveedor(
    db: &DbState,
    session: &SessionState,
    sync: &SyncState,
    payload: ProveedorPayload,
) -> ApiResult<Proveedor> {
    session.require_admin().await?;
    let payload = validate(payload)?;

    let temp_id = db.next_temp_id();
    let proveedor = db
        .inner()
        .proveedores()
        .insert(&Proveedor {
            id: temp_id,
            nombre: payload.nombre.clone(),
            contacto: payload.contacto.clone(),
        })
        .await?;

    queue(db, sync, QueuedMutation::CreateProveedor { temp_id, payload }).await?;

    info!(temp_id, nombre = %proveedor.nombre, "Proveedor created (pending)");
    Ok(proveedor)
}

pub async fn update_proveedor(
    db: &DbState,
    session: &SessionState,
    sync: &SyncState,
    id: i64,
    payload: ProveedorPayload,
) -> ApiResult<Proveedor> {
    session.require_admin().await?;
    let payload = validate(payload)?;
    let previous = find(db, id).await?;

    let updated = Proveedor {
        id,
        nombre: payload.nombre.clone(),
        contacto: payload.contacto.clone(),
    };
    db.inner().proveedores().update(&updated).await?;

    queue(
        db,
        sync,
        QueuedMutation::UpdateProveedor {
            id,
            payload,
            previous,
        },
    )
    .await?;

    info!(id, "Proveedor updated");
    Ok(updated)
}

/// Removes the supplier. Its products stay, without supplier.
pub async fn delete_proveedor(
    db: &DbState,
    session: &SessionState,
    sync: &SyncState,
    id: i64,
) -> ApiResult<()> {
    session.require_admin().await?;
    let snapshot = find(db, id).await?;
    db.inner().proveedores().delete(id).await?;

    queue(db, sync, QueuedMutation::DeleteProveedor { id, snapshot }).await?;

    info!(id, "Proveedor deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::testing::{offline_harness, producto};
    use ecopila_core::{is_optimistic_id, MutationKind, Role};

    fn payload(nombre: &str) -> ProveedorPayload {
        ProveedorPayload {
            nombre: format!("  {nombre} "),
            contacto: "ventas@energizer.com.ar".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_update_delete() {
        let h = offline_harness().await;

        let created = create_proveedor(&h.db, &h.session, &h.sync, payload("Energizer"))
            .await
            .unwrap();
        assert!(is_optimistic_id(created.id));
        assert_eq!(created.nombre, "Energizer");

        let updated = update_proveedor(&h.db, &h.session, &h.sync, created.id, payload("Duracell"))
            .await
            .unwrap();
        assert_eq!(get_proveedor(&h.db, created.id).await.unwrap(), updated);

        // create still queued: the update queues behind it, the delete
        // cancels both
        delete_proveedor(&h.db, &h.session, &h.sync, created.id).await.unwrap();
        assert!(list_proveedores(&h.db).await.unwrap().is_empty());
        assert_eq!(h.database().mutations().count_pending().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_confirmed_queues_snapshot() {
        let h = offline_harness().await;
        let proveedor = Proveedor {
            id: 3,
            nombre: "Varta".to_string(),
            contacto: "-".to_string(),
        };
        h.database().proveedores().insert(&proveedor).await.unwrap();
        let mut p = producto(1, "AA-4");
        p.proveedor_id = Some(3);
        h.database().productos().insert(&p).await.unwrap();

        delete_proveedor(&h.db, &h.session, &h.sync, 3).await.unwrap();

        let stored = h.database().productos().get_by_id(1).await.unwrap().unwrap();
        assert_eq!(stored.proveedor_id, None);

        let queued = h.database().mutations().get_pending(10).await.unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].kind, MutationKind::DeleteProveedor);
        assert_eq!(queued[0].entity_id, "3");
    }

    #[tokio::test]
    async fn test_writes_require_admin() {
        let h = offline_harness().await;
        h.login(Role::User).await;

        let err = create_proveedor(&h.db, &h.session, &h.sync, payload("Energizer"))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Forbidden);

        h.session.clear().await;
        let err = delete_proveedor(&h.db, &h.session, &h.sync, 1).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::Unauthorized);
    }

    #[tokio::test]
    async fn test_validation_and_not_found() {
        let h = offline_harness().await;

        let err = create_proveedor(&h.db, &h.session, &h.sync, payload(""))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);

        let err = get_proveedor(&h.db, 77).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }
}

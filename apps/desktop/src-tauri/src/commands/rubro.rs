//! # Rubro Commands
//!
//! Category CRUD over `tipos_producto`. Same rules as suppliers: admin-only
//! writes, applied locally and queued.

use tracing::info;

use crate::commands::queue;
use crate::error::ApiResult;
use crate::state::{DbState, SessionState, SyncState};
use ecopila_core::validation::validate_nombre;
use ecopila_core::{CoreError, TipoProducto, TipoProductoPayload, ValidationError};
use ecopila_sync::QueuedMutation;

pub async fn list_rubros(db: &DbState) -> ApiResult<Vec<TipoProducto>> {
    Ok(db.inner().tipos_producto().list().await?)
}

pub async fn get_rubro(db: &DbState, id: i64) -> ApiResult<TipoProducto> {
    find(db, id).await
}

async fn find(db: &DbState, id: i64) -> ApiResult<TipoProducto> {
    db.inner()
        .tipos_producto()
        .get_by_id(id)
        .await?
        .ok_or_else(|| CoreError::RubroNotFound(id).into())
}

/// Trims the name and rejects one another rubro already uses (ignoring
/// case, as the CSV importer matches them).
async fn validate(
    db: &DbState,
    payload: TipoProductoPayload,
    own_id: Option<i64>,
) -> ApiResult<TipoProductoPayload> {
    let nombre = validate_nombre(&payload.nombre)?;
    match db.inner().tipos_producto().find_by_nombre(&nombre).await? {
        Some(existing) if Some(existing.id) != own_id => Err(ValidationError::Duplicate {
            field: "nombre".to_string(),
            value: nombre,
        }
        .into()),
        _ => Ok(TipoProductoPayload { nombre }),
    }
}

pub async fn create_rubro(
    db: &DbState,
    session: &SessionState,
    sync: &SyncState,
    payload: TipoProductoPayload,
) -> ApiResult<TipoProducto> {
    session.require_admin().await?;
    let payload = validate(db, payload, None).await?;

    let temp_id = db.next_temp_id();
    let tipo = db
        .inner()
        .tipos_producto()
        .insert(&TipoProducto {
            id: temp_id,
            nombre: payload.nombre.clone(),
        })
        .await?;

    queue(db, sync, QueuedMutation::CreateTipoProducto { temp_id, payload }).await?;

    info!(temp_id, nombre = %tipo.nombre, "Rubro created (pending)");
    Ok(tipo)
}

pub async fn update_rubro(
    db: &DbState,
    session: &SessionState,
    sync: &SyncState,
    id: i64,
    payload: TipoProductoPayload,
) -> ApiResult<TipoProducto> {
    session.require_admin().await?;
    let previous = find(db, id).await?;
    let payload = validate(db, payload, Some(id)).await?;

    let updated = TipoProducto {
        id,
        nombre: payload.nombre.clone(),
    };
    db.inner().tipos_producto().update(&updated).await?;

    queue(
        db,
        sync,
        QueuedMutation::UpdateTipoProducto {
            id,
            payload,
            previous,
        },
    )
    .await?;

    info!(id, "Rubro updated");
    Ok(updated)
}

pub async fn delete_rubro(
    db: &DbState,
    session: &SessionState,
    sync: &SyncState,
    id: i64,
) -> ApiResult<()> {
    session.require_admin().await?;
    let snapshot = find(db, id).await?;
    db.inner().tipos_producto().delete(id).await?;

    queue(db, sync, QueuedMutation::DeleteTipoProducto { id, snapshot }).await?;

    info!(id, "Rubro deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::testing::offline_harness;
    use ecopila_core::{MutationKind, Role};

    fn payload(nombre: &str) -> TipoProductoPayload {
        TipoProductoPayload {
            nombre: nombre.to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_name() {
        let h = offline_harness().await;

        let created = create_rubro(&h.db, &h.session, &h.sync, payload(" Alcalinas "))
            .await
            .unwrap();
        assert_eq!(created.nombre, "Alcalinas");

        let err = create_rubro(&h.db, &h.session, &h.sync, payload("ALCALINAS"))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);

        // renaming to its own name is fine
        update_rubro(&h.db, &h.session, &h.sync, created.id, payload("alcalinas"))
            .await
            .unwrap();
        assert_eq!(list_rubros(&h.db).await.unwrap()[0].nombre, "alcalinas");
    }

    #[tokio::test]
    async fn test_update_keeps_previous_for_rollback() {
        let h = offline_harness().await;
        let tipo = TipoProducto {
            id: 5,
            nombre: "Recargables".to_string(),
        };
        h.database().tipos_producto().insert(&tipo).await.unwrap();

        update_rubro(&h.db, &h.session, &h.sync, 5, payload("Litio")).await.unwrap();

        let queued = h.database().mutations().get_pending(10).await.unwrap();
        assert_eq!(queued[0].kind, MutationKind::UpdateTipoProducto);
        match QueuedMutation::from_entry(&queued[0]).unwrap() {
            QueuedMutation::UpdateTipoProducto { previous, .. } => assert_eq!(previous, tipo),
            other => panic!("unexpected mutation {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_delete_requires_admin() {
        let h = offline_harness().await;
        h.login(Role::User).await;

        let err = delete_rubro(&h.db, &h.session, &h.sync, 5).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::Forbidden);
        assert_eq!(get_rubro(&h.db, 5).await.unwrap_err().code, ErrorCode::NotFound);
    }
}

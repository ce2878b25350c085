//! # Proveedor Repository
//!
//! Suppliers. Deleting one leaves its products without supplier
//! (`ON DELETE SET NULL`); re-keying carries them along
//! (`ON UPDATE CASCADE`).

use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::repository::id_list;
use ecopila_core::{Proveedor, OPTIMISTIC_ID_THRESHOLD};

/// Repository for supplier operations.
#[derive(Debug, Clone)]
pub struct ProveedorRepository {
    pool: SqlitePool,
}

impl ProveedorRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ProveedorRepository { pool }
    }

    /// All suppliers, ordered by name.
    pub async fn list(&self) -> DbResult<Vec<Proveedor>> {
        let proveedores = sqlx::query_as::<_, Proveedor>(
            "SELECT id, nombre, contacto FROM proveedores ORDER BY nombre COLLATE NOCASE, id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(proveedores)
    }

    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<Proveedor>> {
        let proveedor = sqlx::query_as::<_, Proveedor>(
            "SELECT id, nombre, contacto FROM proveedores WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(proveedor)
    }

    pub async fn insert(&self, proveedor: &Proveedor) -> DbResult<Proveedor> {
        debug!(id = proveedor.id, nombre = %proveedor.nombre, "Inserting proveedor");

        sqlx::query("INSERT INTO proveedores (id, nombre, contacto) VALUES (?1, ?2, ?3)")
            .bind(proveedor.id)
            .bind(&proveedor.nombre)
            .bind(&proveedor.contacto)
            .execute(&self.pool)
            .await?;
        Ok(proveedor.clone())
    }

    /// ## Returns
    /// * `Err(DbError::NotFound)` - Supplier doesn't exist
    pub async fn update(&self, proveedor: &Proveedor) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        if update_row(&mut conn, proveedor).await? == 0 {
            return Err(DbError::not_found("Proveedor", proveedor.id));
        }
        Ok(())
    }

    pub async fn delete(&self, id: i64) -> DbResult<()> {
        debug!(id, "Deleting proveedor");

        let result = sqlx::query("DELETE FROM proveedores WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Proveedor", id));
        }
        Ok(())
    }

    /// Stores the server's copy.
    pub async fn upsert(&self, proveedor: &Proveedor) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        upsert_row(&mut conn, proveedor).await
    }

    /// Replaces confirmed suppliers with the server's list; optimistic rows
    /// stay.
    pub async fn replace_all(&self, proveedores: &[Proveedor]) -> DbResult<usize> {
        let ids: Vec<i64> = proveedores.iter().map(|p| p.id).collect();

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "DELETE FROM proveedores
             WHERE id < ?1 AND id NOT IN (SELECT value FROM json_each(?2))",
        )
        .bind(OPTIMISTIC_ID_THRESHOLD)
        .bind(id_list(&ids)?)
        .execute(&mut *tx)
        .await?;
        for proveedor in proveedores {
            upsert_row(&mut tx, proveedor).await?;
        }
        tx.commit().await?;

        info!(count = proveedores.len(), "Replaced proveedores from server");
        Ok(proveedores.len())
    }

    /// Moves an optimistic supplier to its server id.
    pub async fn rekey(&self, temp_id: i64, server_id: i64) -> DbResult<()> {
        if temp_id == server_id {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;

        let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM proveedores WHERE id = ?1")
            .bind(server_id)
            .fetch_optional(&mut *tx)
            .await?;

        if exists.is_some() {
            sqlx::query("UPDATE productos SET proveedor_id = ?2 WHERE proveedor_id = ?1")
                .bind(temp_id)
                .bind(server_id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM proveedores WHERE id = ?1")
                .bind(temp_id)
                .execute(&mut *tx)
                .await?;
        } else {
            let result = sqlx::query("UPDATE proveedores SET id = ?2 WHERE id = ?1")
                .bind(temp_id)
                .bind(server_id)
                .execute(&mut *tx)
                .await?;
            if result.rows_affected() == 0 {
                return Err(DbError::not_found("Proveedor", temp_id));
            }
        }

        tx.commit().await?;
        debug!(temp_id, server_id, "Re-keyed proveedor");
        Ok(())
    }
}

async fn update_row(conn: &mut SqliteConnection, p: &Proveedor) -> DbResult<u64> {
    let result = sqlx::query("UPDATE proveedores SET nombre = ?2, contacto = ?3 WHERE id = ?1")
        .bind(p.id)
        .bind(&p.nombre)
        .bind(&p.contacto)
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}

async fn upsert_row(conn: &mut SqliteConnection, p: &Proveedor) -> DbResult<()> {
    sqlx::query(
        "INSERT INTO proveedores (id, nombre, contacto) VALUES (?1, ?2, ?3)
         ON CONFLICT (id) DO UPDATE SET nombre = excluded.nombre, contacto = excluded.contacto",
    )
    .bind(p.id)
    .bind(&p.nombre)
    .bind(&p.contacto)
    .execute(conn)
    .await?;
    Ok(())
}

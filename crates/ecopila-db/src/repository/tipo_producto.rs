//! # TipoProducto Repository
//!
//! Product categories ("rubros"). Names are matched case-insensitively,
//! the same way the CSV importer matches them.

use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::repository::id_list;
use ecopila_core::{TipoProducto, OPTIMISTIC_ID_THRESHOLD};

#[derive(Debug, Clone)]
pub struct TipoProductoRepository {
    pool: SqlitePool,
}

impl TipoProductoRepository {
    pub fn new(pool: SqlitePool) -> Self {
        TipoProductoRepository { pool }
    }

    pub async fn list(&self) -> DbResult<Vec<TipoProducto>> {
        let tipos = sqlx::query_as::<_, TipoProducto>(
            "SELECT id, nombre FROM tipos_producto ORDER BY nombre COLLATE NOCASE, id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(tipos)
    }

    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<TipoProducto>> {
        let tipo = sqlx::query_as::<_, TipoProducto>(
            "SELECT id, nombre FROM tipos_producto WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(tipo)
    }

    /// Finds a rubro by name, ignoring case and surrounding spaces.
    pub async fn find_by_nombre(&self, nombre: &str) -> DbResult<Option<TipoProducto>> {
        let tipo = sqlx::query_as::<_, TipoProducto>(
            "SELECT id, nombre FROM tipos_producto
             WHERE trim(nombre) = ?1 COLLATE NOCASE
             ORDER BY id
             LIMIT 1",
        )
        .bind(nombre.trim())
        .fetch_optional(&self.pool)
        .await?;
        Ok(tipo)
    }

    pub async fn insert(&self, tipo: &TipoProducto) -> DbResult<TipoProducto> {
        debug!(id = tipo.id, nombre = %tipo.nombre, "Inserting rubro");
        let mut conn = self.pool.acquire().await?;
        insert_row(&mut conn, tipo).await?;
        Ok(tipo.clone())
    }

    /// Inserts several rubros atomically (CSV import creates the missing
    /// ones in one go).
    pub async fn insert_many(&self, tipos: &[TipoProducto]) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        for tipo in tipos {
            insert_row(&mut tx, tipo).await?;
        }
        tx.commit().await?;

        info!(count = tipos.len(), "Inserted rubros");
        Ok(())
    }

    pub async fn update(&self, tipo: &TipoProducto) -> DbResult<()> {
        let result = sqlx::query("UPDATE tipos_producto SET nombre = ?2 WHERE id = ?1")
            .bind(tipo.id)
            .bind(&tipo.nombre)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Rubro", tipo.id));
        }
        Ok(())
    }

    pub async fn delete(&self, id: i64) -> DbResult<()> {
        debug!(id, "Deleting rubro");
        let result = sqlx::query("DELETE FROM tipos_producto WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Rubro", id));
        }
        Ok(())
    }

    /// Stores the server's copy.
    pub async fn upsert(&self, tipo: &TipoProducto) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        upsert_row(&mut conn, tipo).await
    }

    /// Replaces confirmed rubros with the server's list; optimistic rows stay.
    pub async fn replace_all(&self, tipos: &[TipoProducto]) -> DbResult<usize> {
        let ids: Vec<i64> = tipos.iter().map(|t| t.id).collect();

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "DELETE FROM tipos_producto
             WHERE id < ?1 AND id NOT IN (SELECT value FROM json_each(?2))",
        )
        .bind(OPTIMISTIC_ID_THRESHOLD)
        .bind(id_list(&ids)?)
        .execute(&mut *tx)
        .await?;
        for tipo in tipos {
            upsert_row(&mut tx, tipo).await?;
        }
        tx.commit().await?;

        info!(count = tipos.len(), "Replaced rubros from server");
        Ok(tipos.len())
    }

    /// Moves an optimistic rubro to its server id.
    pub async fn rekey(&self, temp_id: i64, server_id: i64) -> DbResult<()> {
        if temp_id == server_id {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;

        let exists: Option<i64> =
            sqlx::query_scalar("SELECT id FROM tipos_producto WHERE id = ?1")
                .bind(server_id)
                .fetch_optional(&mut *tx)
                .await?;

        if exists.is_some() {
            sqlx::query("UPDATE productos SET tipo_producto_id = ?2 WHERE tipo_producto_id = ?1")
                .bind(temp_id)
                .bind(server_id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM tipos_producto WHERE id = ?1")
                .bind(temp_id)
                .execute(&mut *tx)
                .await?;
        } else {
            let result = sqlx::query("UPDATE tipos_producto SET id = ?2 WHERE id = ?1")
                .bind(temp_id)
                .bind(server_id)
                .execute(&mut *tx)
                .await?;
            if result.rows_affected() == 0 {
                return Err(DbError::not_found("Rubro", temp_id));
            }
        }

        tx.commit().await?;
        debug!(temp_id, server_id, "Re-keyed rubro");
        Ok(())
    }
}

async fn insert_row(conn: &mut SqliteConnection, t: &TipoProducto) -> DbResult<()> {
    sqlx::query("INSERT INTO tipos_producto (id, nombre) VALUES (?1, ?2)")
        .bind(t.id)
        .bind(&t.nombre)
        .execute(conn)
        .await?;
    Ok(())
}

async fn upsert_row(conn: &mut SqliteConnection, t: &TipoProducto) -> DbResult<()> {
    sqlx::query(
        "INSERT INTO tipos_producto (id, nombre) VALUES (?1, ?2)
         ON CONFLICT (id) DO UPDATE SET nombre = excluded.nombre",
    )
    .bind(t.id)
    .bind(&t.nombre)
    .execute(conn)
    .await?;
    Ok(())
}

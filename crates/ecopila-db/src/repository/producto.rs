//! # Producto Repository
//!
//! Products, their relations and stock.
//!
//! ## Relations
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  producto_relaciones is undirected: (a, b) means a ~ b and b ~ a.       │
//! │                                                                         │
//! │   add_relation(7, 3)   ──► INSERT (3, 7)        (smaller id first)      │
//! │   list_related(7)      ──► rows where 7 is on either side               │
//! │   rekey(temp → 42)     ──► ON UPDATE CASCADE may leave (42, 3);         │
//! │                            readers never assume an order                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Server vs Local Rows
//! [`ProductoRepository::upsert`] and [`ProductoRepository::replace_all`]
//! store what the server returned. `replace_all` never drops optimistic
//! rows, whose creates are still queued.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::repository::id_list;
use ecopila_core::{ProductFilter, Producto, RelatedProduct, OPTIMISTIC_ID_THRESHOLD};

const SELECT_PRODUCTOS: &str = r#"
    SELECT
        id, codigo_producto, descripcion, cantidad,
        iva_bps, porcentaje_ganancia_bps, resto, costo_fijo,
        precio_sin_iva_cents, costo_dolares_cents, costo_pesos_cents,
        precio_publico_us_cents, precio_sin_redondear_cents, precio_publico_cents,
        fecha_ingreso, proveedor_id, tipo_producto_id, updated_at
    FROM productos
"#;

/// A `productos` row; relations live in their own table.
#[derive(Debug, sqlx::FromRow)]
struct ProductoRow {
    id: i64,
    codigo_producto: String,
    descripcion: String,
    cantidad: i64,
    iva_bps: u32,
    porcentaje_ganancia_bps: u32,
    resto: Option<i64>,
    costo_fijo: bool,
    precio_sin_iva_cents: i64,
    costo_dolares_cents: i64,
    costo_pesos_cents: i64,
    precio_publico_us_cents: i64,
    precio_sin_redondear_cents: i64,
    precio_publico_cents: i64,
    fecha_ingreso: Option<NaiveDate>,
    proveedor_id: Option<i64>,
    tipo_producto_id: Option<i64>,
    updated_at: DateTime<Utc>,
}

impl ProductoRow {
    fn into_producto(self, productos_relacionados_ids: Vec<i64>) -> Producto {
        Producto {
            id: self.id,
            codigo_producto: self.codigo_producto,
            descripcion: self.descripcion,
            cantidad: self.cantidad,
            iva_bps: self.iva_bps,
            porcentaje_ganancia_bps: self.porcentaje_ganancia_bps,
            resto: self.resto,
            costo_fijo: self.costo_fijo,
            precio_sin_iva_cents: self.precio_sin_iva_cents,
            costo_dolares_cents: self.costo_dolares_cents,
            costo_pesos_cents: self.costo_pesos_cents,
            precio_publico_us_cents: self.precio_publico_us_cents,
            precio_sin_redondear_cents: self.precio_sin_redondear_cents,
            precio_publico_cents: self.precio_publico_cents,
            fecha_ingreso: self.fecha_ingreso,
            proveedor_id: self.proveedor_id,
            tipo_producto_id: self.tipo_producto_id,
            productos_relacionados_ids,
            updated_at: self.updated_at,
        }
    }
}

/// Repository for product database operations.
///
/// ## Usage
/// ```rust,ignore
/// let repo = db.productos();
/// let pilas = repo.list(&ProductFilter::term("pila")).await?;
/// let relacionados = repo.list_related(pilas[0].id).await?;
/// ```
#[derive(Debug, Clone)]
pub struct ProductoRepository {
    pool: SqlitePool,
}

impl ProductoRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ProductoRepository { pool }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Lists products matching `filter`, ordered by description.
    ///
    /// Supplier and category are filtered in SQL; the search term goes
    /// through [`ProductFilter::matches`] so the local list and the search
    /// box agree on what matches.
    pub async fn list(&self, filter: &ProductFilter) -> DbResult<Vec<Producto>> {
        let sql = format!(
            "{SELECT_PRODUCTOS}
             WHERE (?1 IS NULL OR proveedor_id = ?1)
               AND (?2 IS NULL OR tipo_producto_id = ?2)
             ORDER BY descripcion COLLATE NOCASE, id"
        );
        let rows: Vec<ProductoRow> = sqlx::query_as(&sql)
            .bind(filter.proveedor_id)
            .bind(filter.tipo_producto_id)
            .fetch_all(&self.pool)
            .await?;

        let mut relations = self.relation_map().await?;
        let productos: Vec<Producto> = rows
            .into_iter()
            .map(|row| {
                let related = relations.remove(&row.id).unwrap_or_default();
                row.into_producto(related)
            })
            .filter(|p| filter.matches(p))
            .collect();

        debug!(count = productos.len(), "Listed productos");
        Ok(productos)
    }

    /// Products of one supplier, ordered by code.
    pub async fn list_by_proveedor(&self, proveedor_id: i64) -> DbResult<Vec<Producto>> {
        let filter = ProductFilter {
            proveedor_id: Some(proveedor_id),
            ..Default::default()
        };
        let mut productos = self.list(&filter).await?;
        productos.sort_by(|a, b| a.codigo_producto.cmp(&b.codigo_producto));
        Ok(productos)
    }

    pub async fn count_by_proveedor(&self, proveedor_id: i64) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM productos WHERE proveedor_id = ?1")
            .bind(proveedor_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Gets a product by id.
    ///
    /// ## Returns
    /// * `Ok(Some(Producto))` - Product found
    /// * `Ok(None)` - Product not found
    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<Producto>> {
        let sql = format!("{SELECT_PRODUCTOS} WHERE id = ?1");
        let row: Option<ProductoRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let related = self.related_ids(id).await?;
                Ok(Some(row.into_producto(related)))
            }
            None => Ok(None),
        }
    }

    /// Gets a product by its business code (exact match).
    pub async fn get_by_codigo(&self, codigo: &str) -> DbResult<Option<Producto>> {
        let sql = format!("{SELECT_PRODUCTOS} WHERE codigo_producto = ?1");
        let row: Option<ProductoRow> = sqlx::query_as(&sql)
            .bind(codigo.trim())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let related = self.related_ids(row.id).await?;
                Ok(Some(row.into_producto(related)))
            }
            None => Ok(None),
        }
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM productos")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Inserts a new product with its relations.
    ///
    /// ## Returns
    /// * `Err(DbError::UniqueViolation)` - id or code already exists
    pub async fn insert(&self, producto: &Producto) -> DbResult<Producto> {
        debug!(id = producto.id, codigo = %producto.codigo_producto, "Inserting producto");

        let mut tx = self.pool.begin().await?;
        insert_row(&mut tx, producto).await?;
        set_relations(&mut tx, producto.id, &producto.productos_relacionados_ids).await?;
        tx.commit().await?;

        Ok(producto.clone())
    }

    /// Inserts several products in one transaction (bulk upload).
    pub async fn insert_many(&self, productos: &[Producto]) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        for producto in productos {
            insert_row(&mut tx, producto).await?;
        }
        tx.commit().await?;

        info!(count = productos.len(), "Inserted productos");
        Ok(())
    }

    /// Updates every column except relations.
    ///
    /// ## Returns
    /// * `Err(DbError::NotFound)` - Product doesn't exist
    pub async fn update(&self, producto: &Producto) -> DbResult<()> {
        debug!(id = producto.id, "Updating producto");

        let mut conn = self.pool.acquire().await?;
        let affected = update_row(&mut conn, producto).await?;
        if affected == 0 {
            return Err(DbError::not_found("Producto", producto.id));
        }
        Ok(())
    }

    /// Saves several products (e.g. after repricing), in one transaction.
    pub async fn update_many(&self, productos: &[Producto]) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        for producto in productos {
            update_row(&mut tx, producto).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Stores the server's copy of a product, relations included.
    pub async fn upsert(&self, producto: &Producto) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        upsert_row(&mut tx, producto).await?;
        set_relations(&mut tx, producto.id, &producto.productos_relacionados_ids).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Replaces the confirmed part of the catalog with the server's list.
    ///
    /// Rows missing from `productos` are deleted unless they are
    /// optimistic. Returns the number of rows written.
    pub async fn replace_all(&self, productos: &[Producto]) -> DbResult<usize> {
        let ids: Vec<i64> = productos.iter().map(|p| p.id).collect();

        let mut tx = self.pool.begin().await?;

        let removed = sqlx::query(
            "DELETE FROM productos
             WHERE id < ?1 AND id NOT IN (SELECT value FROM json_each(?2))",
        )
        .bind(OPTIMISTIC_ID_THRESHOLD)
        .bind(id_list(&ids)?)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        for producto in productos {
            upsert_row(&mut tx, producto).await?;
        }

        // Relations between confirmed rows come from the server
        sqlx::query(
            "DELETE FROM producto_relaciones
             WHERE producto_id < ?1 AND relacionado_id < ?1",
        )
        .bind(OPTIMISTIC_ID_THRESHOLD)
        .execute(&mut *tx)
        .await?;
        for producto in productos {
            for &other in &producto.productos_relacionados_ids {
                insert_relation(&mut tx, producto.id, other).await?;
            }
        }

        tx.commit().await?;

        info!(written = productos.len(), removed, "Replaced productos from server");
        Ok(productos.len())
    }

    /// Deletes a product (its relations cascade).
    pub async fn delete(&self, id: i64) -> DbResult<()> {
        debug!(id, "Deleting producto");

        let result = sqlx::query("DELETE FROM productos WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Producto", id));
        }
        Ok(())
    }

    /// Moves an optimistic row to the id the server assigned.
    ///
    /// If the server row already arrived (a refresh won the race), the
    /// temporary row's relations are merged into it and the temporary row
    /// is dropped.
    pub async fn rekey(&self, temp_id: i64, server_id: i64) -> DbResult<()> {
        if temp_id == server_id {
            return Ok(());
        }
        debug!(temp_id, server_id, "Re-keying producto");

        let mut tx = self.pool.begin().await?;

        let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM productos WHERE id = ?1")
            .bind(server_id)
            .fetch_optional(&mut *tx)
            .await?;

        if exists.is_some() {
            let related: Vec<i64> = sqlx::query_scalar(
                "SELECT relacionado_id FROM producto_relaciones WHERE producto_id = ?1
                 UNION
                 SELECT producto_id FROM producto_relaciones WHERE relacionado_id = ?1",
            )
            .bind(temp_id)
            .fetch_all(&mut *tx)
            .await?;
            for other in related {
                insert_relation(&mut tx, server_id, other).await?;
            }
            sqlx::query("DELETE FROM productos WHERE id = ?1")
                .bind(temp_id)
                .execute(&mut *tx)
                .await?;
        } else {
            let result = sqlx::query("UPDATE productos SET id = ?2 WHERE id = ?1")
                .bind(temp_id)
                .bind(server_id)
                .execute(&mut *tx)
                .await?;
            if result.rows_affected() == 0 {
                return Err(DbError::not_found("Producto", temp_id));
            }
        }

        tx.commit().await?;
        Ok(())
    }

    /// Adds `delta` to the stock (negative for sales).
    pub async fn adjust_stock(&self, id: i64, delta: i64) -> DbResult<()> {
        debug!(id, delta, "Adjusting stock");

        let result = sqlx::query(
            "UPDATE productos SET cantidad = cantidad + ?2, updated_at = ?3 WHERE id = ?1",
        )
        .bind(id)
        .bind(delta)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Producto", id));
        }
        Ok(())
    }

    // =========================================================================
    // Relations
    // =========================================================================

    /// Relates `id` with each of `ids`. Unknown ids and `id` itself are
    /// skipped. Returns how many new links were stored.
    pub async fn relate(&self, id: i64, ids: &[i64]) -> DbResult<u64> {
        let mut tx = self.pool.begin().await?;
        let mut added = 0;
        for &other in ids {
            added += insert_relation(&mut tx, id, other).await?;
        }
        tx.commit().await?;

        debug!(id, added, "Related productos");
        Ok(added)
    }

    /// Links two products. Linking an existing pair is a no-op.
    pub async fn add_relation(&self, a: i64, b: i64) -> DbResult<()> {
        if self.get_by_id(a).await?.is_none() {
            return Err(DbError::not_found("Producto", a));
        }
        if self.get_by_id(b).await?.is_none() {
            return Err(DbError::not_found("Producto", b));
        }
        let mut conn = self.pool.acquire().await?;
        insert_relation(&mut conn, a, b).await?;
        Ok(())
    }

    /// Unlinks two products, whichever order the pair was stored in.
    pub async fn remove_relation(&self, a: i64, b: i64) -> DbResult<bool> {
        let result = sqlx::query(
            "DELETE FROM producto_relaciones
             WHERE (producto_id = ?1 AND relacionado_id = ?2)
                OR (producto_id = ?2 AND relacionado_id = ?1)",
        )
        .bind(a)
        .bind(b)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Related products with supplier and category names, for the details
    /// view.
    pub async fn list_related(&self, id: i64) -> DbResult<Vec<RelatedProduct>> {
        let related = sqlx::query_as::<_, RelatedProduct>(
            r#"
            SELECT
                p.id,
                p.descripcion,
                pr.nombre AS nombre_proveedor,
                p.precio_publico_cents,
                t.nombre AS nombre_tipo_producto
            FROM productos p
            LEFT JOIN proveedores pr ON pr.id = p.proveedor_id
            LEFT JOIN tipos_producto t ON t.id = p.tipo_producto_id
            WHERE p.id IN (
                SELECT relacionado_id FROM producto_relaciones WHERE producto_id = ?1
                UNION
                SELECT producto_id FROM producto_relaciones WHERE relacionado_id = ?1
            )
            ORDER BY p.descripcion COLLATE NOCASE
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(related)
    }

    async fn related_ids(&self, id: i64) -> DbResult<Vec<i64>> {
        let ids: Vec<i64> = sqlx::query_scalar(
            "SELECT relacionado_id FROM producto_relaciones WHERE producto_id = ?1
             UNION
             SELECT producto_id FROM producto_relaciones WHERE relacionado_id = ?1
             ORDER BY 1",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn relation_map(&self) -> DbResult<HashMap<i64, Vec<i64>>> {
        let pairs: Vec<(i64, i64)> =
            sqlx::query_as("SELECT producto_id, relacionado_id FROM producto_relaciones")
                .fetch_all(&self.pool)
                .await?;

        let mut map: HashMap<i64, Vec<i64>> = HashMap::new();
        for (a, b) in pairs {
            map.entry(a).or_default().push(b);
            map.entry(b).or_default().push(a);
        }
        for ids in map.values_mut() {
            ids.sort_unstable();
            ids.dedup();
        }
        Ok(map)
    }
}

// =============================================================================
// Row Writers
// =============================================================================

async fn insert_row(conn: &mut SqliteConnection, p: &Producto) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO productos (
            id, codigo_producto, descripcion, cantidad,
            iva_bps, porcentaje_ganancia_bps, resto, costo_fijo,
            precio_sin_iva_cents, costo_dolares_cents, costo_pesos_cents,
            precio_publico_us_cents, precio_sin_redondear_cents, precio_publico_cents,
            fecha_ingreso, proveedor_id, tipo_producto_id, updated_at
        ) VALUES (
            ?1, ?2, ?3, ?4,
            ?5, ?6, ?7, ?8,
            ?9, ?10, ?11,
            ?12, ?13, ?14,
            ?15, ?16, ?17, ?18
        )
        "#,
    )
    .bind(p.id)
    .bind(&p.codigo_producto)
    .bind(&p.descripcion)
    .bind(p.cantidad)
    .bind(p.iva_bps)
    .bind(p.porcentaje_ganancia_bps)
    .bind(p.resto)
    .bind(p.costo_fijo)
    .bind(p.precio_sin_iva_cents)
    .bind(p.costo_dolares_cents)
    .bind(p.costo_pesos_cents)
    .bind(p.precio_publico_us_cents)
    .bind(p.precio_sin_redondear_cents)
    .bind(p.precio_publico_cents)
    .bind(p.fecha_ingreso)
    .bind(p.proveedor_id)
    .bind(p.tipo_producto_id)
    .bind(p.updated_at)
    .execute(conn)
    .await?;
    Ok(())
}

async fn update_row(conn: &mut SqliteConnection, p: &Producto) -> DbResult<u64> {
    let result = sqlx::query(
        r#"
        UPDATE productos SET
            codigo_producto = ?2,
            descripcion = ?3,
            cantidad = ?4,
            iva_bps = ?5,
            porcentaje_ganancia_bps = ?6,
            resto = ?7,
            costo_fijo = ?8,
            precio_sin_iva_cents = ?9,
            costo_dolares_cents = ?10,
            costo_pesos_cents = ?11,
            precio_publico_us_cents = ?12,
            precio_sin_redondear_cents = ?13,
            precio_publico_cents = ?14,
            fecha_ingreso = ?15,
            proveedor_id = ?16,
            tipo_producto_id = ?17,
            updated_at = ?18
        WHERE id = ?1
        "#,
    )
    .bind(p.id)
    .bind(&p.codigo_producto)
    .bind(&p.descripcion)
    .bind(p.cantidad)
    .bind(p.iva_bps)
    .bind(p.porcentaje_ganancia_bps)
    .bind(p.resto)
    .bind(p.costo_fijo)
    .bind(p.precio_sin_iva_cents)
    .bind(p.costo_dolares_cents)
    .bind(p.costo_pesos_cents)
    .bind(p.precio_publico_us_cents)
    .bind(p.precio_sin_redondear_cents)
    .bind(p.precio_publico_cents)
    .bind(p.fecha_ingreso)
    .bind(p.proveedor_id)
    .bind(p.tipo_producto_id)
    .bind(p.updated_at)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

async fn upsert_row(conn: &mut SqliteConnection, p: &Producto) -> DbResult<()> {
    if update_row(&mut *conn, p).await? == 0 {
        insert_row(conn, p).await?;
    }
    Ok(())
}

/// Replaces the links of `id` with `ids`.
async fn set_relations(conn: &mut SqliteConnection, id: i64, ids: &[i64]) -> DbResult<()> {
    sqlx::query("DELETE FROM producto_relaciones WHERE producto_id = ?1 OR relacionado_id = ?1")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    for &other in ids {
        insert_relation(&mut *conn, id, other).await?;
    }
    Ok(())
}

/// Stores `a ~ b` once, only if both products exist. Returns rows added.
async fn insert_relation(conn: &mut SqliteConnection, a: i64, b: i64) -> DbResult<u64> {
    if a == b {
        return Ok(0);
    }
    let (low, high) = if a < b { (a, b) } else { (b, a) };
    let result = sqlx::query(
        "INSERT INTO producto_relaciones (producto_id, relacionado_id)
         SELECT ?1, ?2
         WHERE EXISTS (SELECT 1 FROM productos WHERE id = ?1)
           AND EXISTS (SELECT 1 FROM productos WHERE id = ?2)
           AND NOT EXISTS (
               SELECT 1 FROM producto_relaciones
               WHERE (producto_id = ?1 AND relacionado_id = ?2)
                  OR (producto_id = ?2 AND relacionado_id = ?1)
           )",
    )
    .bind(low)
    .bind(high)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::tests::{producto, setup};

    #[tokio::test]
    async fn test_insert_and_get() {
        let db = setup().await;
        let repo = db.productos();

        repo.insert(&producto(1, "AA-4", "Pila AA x4")).await.unwrap();

        let found = repo.get_by_id(1).await.unwrap().unwrap();
        assert_eq!(found.codigo_producto, "AA-4");
        assert_eq!(found.precio_publico_cents, 164_900);
        assert!(repo.get_by_id(2).await.unwrap().is_none());

        let by_code = repo.get_by_codigo(" AA-4 ").await.unwrap().unwrap();
        assert_eq!(by_code.id, 1);
    }

    #[tokio::test]
    async fn test_duplicate_code_is_unique_violation() {
        let db = setup().await;
        let repo = db.productos();

        repo.insert(&producto(1, "AA-4", "Pila AA x4")).await.unwrap();
        let err = repo.insert(&producto(2, "AA-4", "Otra")).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn test_list_filters() {
        let db = setup().await;
        let repo = db.productos();

        repo.insert(&producto(1, "AA-4", "Pila AA x4")).await.unwrap();
        repo.insert(&producto(2, "AAA-2", "Pila AAA x2")).await.unwrap();
        let mut cable = producto(3, "CAB-1", "Cable USB");
        cable.proveedor_id = Some(2);
        repo.insert(&cable).await.unwrap();

        assert_eq!(repo.list(&ProductFilter::default()).await.unwrap().len(), 3);
        assert_eq!(repo.list(&ProductFilter::term("PILA")).await.unwrap().len(), 2);

        let by_proveedor = repo.list_by_proveedor(2).await.unwrap();
        assert_eq!(by_proveedor.len(), 1);
        assert_eq!(repo.count_by_proveedor(1).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_update_and_delete_missing() {
        let db = setup().await;
        let repo = db.productos();

        let err = repo.update(&producto(9, "X", "X")).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(repo.delete(9).await.unwrap_err().is_not_found());

        let mut p = producto(1, "AA-4", "Pila AA x4");
        repo.insert(&p).await.unwrap();
        p.descripcion = "Pila AA alcalina x4".into();
        repo.update(&p).await.unwrap();
        assert_eq!(
            repo.get_by_id(1).await.unwrap().unwrap().descripcion,
            "Pila AA alcalina x4"
        );

        repo.delete(1).await.unwrap();
        assert_eq!(repo.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_relations_are_undirected() {
        let db = setup().await;
        let repo = db.productos();
        for (id, code) in [(1, "A"), (2, "B"), (3, "C")] {
            repo.insert(&producto(id, code, code)).await.unwrap();
        }

        assert_eq!(repo.relate(3, &[1, 2, 3, 99]).await.unwrap(), 2);
        // Same pair, other direction
        repo.add_relation(1, 3).await.unwrap();

        let p1 = repo.get_by_id(1).await.unwrap().unwrap();
        assert_eq!(p1.productos_relacionados_ids, vec![3]);
        let p3 = repo.get_by_id(3).await.unwrap().unwrap();
        assert_eq!(p3.productos_relacionados_ids, vec![1, 2]);

        let related = repo.list_related(3).await.unwrap();
        assert_eq!(related.len(), 2);
        assert_eq!(related[0].nombre_proveedor.as_deref(), Some("Energizar"));

        assert!(repo.remove_relation(3, 1).await.unwrap());
        assert!(!repo.remove_relation(3, 1).await.unwrap());
        assert_eq!(repo.list_related(1).await.unwrap().len(), 0);

        assert!(repo.add_relation(1, 42).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_rekey_moves_row_and_relations() {
        let db = setup().await;
        let repo = db.productos();
        let temp = 1_700_000_000_000;

        repo.insert(&producto(1, "A", "A")).await.unwrap();
        repo.insert(&producto(temp, "T", "Temporal")).await.unwrap();
        repo.add_relation(temp, 1).await.unwrap();

        repo.rekey(temp, 50).await.unwrap();

        assert!(repo.get_by_id(temp).await.unwrap().is_none());
        let moved = repo.get_by_id(50).await.unwrap().unwrap();
        assert_eq!(moved.productos_relacionados_ids, vec![1]);
    }

    #[tokio::test]
    async fn test_rekey_onto_existing_server_row() {
        let db = setup().await;
        let repo = db.productos();
        let temp = 1_700_000_000_000;

        repo.insert(&producto(1, "A", "A")).await.unwrap();
        repo.insert(&producto(temp, "T-tmp", "Temporal")).await.unwrap();
        repo.add_relation(temp, 1).await.unwrap();
        repo.insert(&producto(50, "T", "Temporal")).await.unwrap();

        repo.rekey(temp, 50).await.unwrap();
        assert_eq!(repo.count().await.unwrap(), 2);
        assert_eq!(
            repo.get_by_id(50).await.unwrap().unwrap().productos_relacionados_ids,
            vec![1]
        );
    }

    #[tokio::test]
    async fn test_replace_all_keeps_optimistic_rows() {
        let db = setup().await;
        let repo = db.productos();
        let temp = 1_700_000_000_000;

        repo.insert(&producto(1, "OLD", "Viejo")).await.unwrap();
        repo.insert(&producto(temp, "NEW", "Pendiente")).await.unwrap();

        let mut a = producto(2, "A", "A");
        a.productos_relacionados_ids = vec![3];
        let b = producto(3, "B", "B");
        repo.replace_all(&[a, b]).await.unwrap();

        let ids: Vec<i64> = repo
            .list(&ProductFilter::default())
            .await
            .unwrap()
            .iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids.len(), 3);
        assert!(ids.contains(&temp));
        assert!(!ids.contains(&1));
        assert_eq!(
            repo.get_by_id(3).await.unwrap().unwrap().productos_relacionados_ids,
            vec![2]
        );
    }

    #[tokio::test]
    async fn test_adjust_stock() {
        let db = setup().await;
        let repo = db.productos();
        repo.insert(&producto(1, "A", "A")).await.unwrap();

        repo.adjust_stock(1, -3).await.unwrap();
        let p = repo.get_by_id(1).await.unwrap().unwrap();
        assert_eq!(p.cantidad, -2);
        assert!(repo.adjust_stock(7, 1).await.unwrap_err().is_not_found());
    }
}

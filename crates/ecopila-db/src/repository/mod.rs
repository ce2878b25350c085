//! # Repository Module
//!
//! One repository per table group, each a cheap handle over the pool.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Desktop command / MutationProcessor                                    │
//! │       │                                                                 │
//! │       │  db.productos().rekey(temp_id, server_id)                       │
//! │       ▼                                                                 │
//! │  ProductoRepository ──┐                                                 │
//! │  ProveedorRepository ─┤                                                 │
//! │  TipoProductoRepo ────┼──► SQLite (local replica)                       │
//! │  MutationRepository ──┤                                                 │
//! │  DolarRepository ─────┘                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`producto::ProductoRepository`] - Products, relations, stock
//! - [`proveedor::ProveedorRepository`] - Suppliers
//! - [`tipo_producto::TipoProductoRepository`] - Categories (rubros)
//! - [`mutation::MutationRepository`] - Persisted offline queue
//! - [`dolar::DolarRepository`] - Last known dollar rate

pub mod dolar;
pub mod mutation;
pub mod producto;
pub mod proveedor;
pub mod tipo_producto;

use crate::error::DbResult;

/// Encodes ids as a JSON array for `json_each(?)` in `NOT IN` clauses.
pub(crate) fn id_list(ids: &[i64]) -> DbResult<String> {
    Ok(serde_json::to_string(ids)?)
}

#[cfg(test)]
pub(crate) mod tests {
    use chrono::Utc;
    use ecopila_core::{Producto, Proveedor, TipoProducto};

    use crate::{Database, DbConfig};

    /// In-memory database with two suppliers and two rubros.
    pub(crate) async fn setup() -> Database {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        for (id, nombre) in [(1, "Energizar"), (2, "Cablemax")] {
            db.proveedores()
                .insert(&Proveedor {
                    id,
                    nombre: nombre.to_string(),
                    contacto: format!("ventas@{}.com", nombre.to_lowercase()),
                })
                .await
                .unwrap();
        }
        for (id, nombre) in [(10, "Pilas"), (20, "Cables")] {
            db.tipos_producto()
                .insert(&TipoProducto {
                    id,
                    nombre: nombre.to_string(),
                })
                .await
                .unwrap();
        }
        db
    }

    pub(crate) fn producto(id: i64, codigo: &str, descripcion: &str) -> Producto {
        Producto {
            id,
            codigo_producto: codigo.to_string(),
            descripcion: descripcion.to_string(),
            cantidad: 1,
            iva_bps: 2100,
            porcentaje_ganancia_bps: 3000,
            resto: None,
            costo_fijo: false,
            precio_sin_iva_cents: 100,
            costo_dolares_cents: 121,
            costo_pesos_cents: 127_050,
            precio_publico_us_cents: 157,
            precio_sin_redondear_cents: 164_850,
            precio_publico_cents: 164_900,
            fecha_ingreso: None,
            proveedor_id: Some(1),
            tipo_producto_id: Some(10),
            productos_relacionados_ids: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_id_list() {
        assert_eq!(super::id_list(&[1, 2, 3]).unwrap(), "[1,2,3]");
        assert_eq!(super::id_list(&[]).unwrap(), "[]");
    }
}

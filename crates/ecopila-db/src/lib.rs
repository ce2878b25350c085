//! # ecopila-db: Local Replica for Ecopila
//!
//! SQLite copy of the server catalog, the persisted mutation queue and the
//! last known dollar rate. Everything the app shows while offline comes
//! from here.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Desktop command (create_producto)        MutationProcessor             │
//! │       │  optimistic insert + enqueue           │  replay, rekey,        │
//! │       ▼                                        ▼  rollback              │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   ecopila-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   Database (pool.rs)       Repositories          Migrations     │   │
//! │  │   SqlitePool, WAL          productos             001_init.sql   │   │
//! │  │                            proveedores                          │   │
//! │  │                            tipos_producto                       │   │
//! │  │                            mutation_queue                       │   │
//! │  │                            dolar_cache                          │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  <data dir>/ecopila.db  (or ECOPILA_DB_PATH)                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ecopila_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("ecopila.db")).await?;
//! let productos = db.productos().list(&ProductFilter::default()).await?;
//! let pendientes = db.mutations().count_pending().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::dolar::{CachedDolar, DolarRepository};
pub use repository::mutation::MutationRepository;
pub use repository::producto::ProductoRepository;
pub use repository::proveedor::ProveedorRepository;
pub use repository::tipo_producto::TipoProductoRepository;

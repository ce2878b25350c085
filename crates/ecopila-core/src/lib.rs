//! # ecopila-core: Pure Business Logic for Ecopila
//!
//! Pricing, validation, catalog filtering and CSV handling for the Ecopila
//! inventory client. Nothing here touches the disk, the network or the clock.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Ecopila Architecture                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    Frontend                                     │   │
//! │  │   Productos ──► Proveedores ──► Rubros ──► Carrito ──► Listas   │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ Tauri IPC                              │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    Desktop Commands                             │   │
//! │  └──────────────┬──────────────────────────────┬───────────────────┘   │
//! │                 │                              │                        │
//! │  ┌──────────────▼───────────────┐  ┌──────────▼────────────────────┐   │
//! │  │ ★ ecopila-core (THIS CRATE) ★│  │ ecopila-sync                  │   │
//! │  │                              │  │ REST client, mutation queue,  │   │
//! │  │  types    money    pricing   │  │ dólar service                 │   │
//! │  │  catalog  import   export    │  └──────────┬────────────────────┘   │
//! │  │  validation                  │             │                        │
//! │  │                              │  ┌──────────▼────────────────────┐   │
//! │  │  NO I/O • PURE FUNCTIONS     │  │ ecopila-db (SQLite replica)   │   │
//! │  └──────────────────────────────┘  └───────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Producto, Proveedor, mutations, ...)
//! - [`money`] - Integer money and the dollar rate
//! - [`pricing`] - Derived price fields
//! - [`validation`] - Form and payload rules
//! - [`catalog`] - Search filter and scan lookup
//! - [`import`] - CSV bulk upload planning
//! - [`export`] - CSV export and price-list model
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use ecopila_core::money::{ExchangeRate, Money};
//! use ecopila_core::types::TaxRate;
//!
//! let precio = Money::from_cents(1300); // US$ 13.00
//! let costo = precio.with_tax(TaxRate::GENERAL); // US$ 15.73
//! assert_eq!(costo.cents(), 1573);
//!
//! let dolar = ExchangeRate::from_centavos(105_000); // $1.050,00
//! assert_eq!(dolar.to_pesos(costo).cents(), 1_651_650);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod catalog;
pub mod error;
pub mod export;
pub mod import;
pub mod money;
pub mod pricing;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use catalog::{ProductFilter, ScanOutcome};
pub use error::{CoreError, CoreResult, ImportError, LineError, PricingError, ValidationError};
pub use export::{PriceList, PriceListRow};
pub use import::{ImportPlan, ImportPreview};
pub use money::{ExchangeRate, Money};
pub use pricing::PriceBreakdown;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum lines allowed in a single cart.
pub const MAX_CART_ITEMS: usize = 100;

/// Maximum quantity of a single line.
///
/// Catches a scanner repeating the code into the quantity field.
pub const MAX_ITEM_QUANTITY: i64 = 999;

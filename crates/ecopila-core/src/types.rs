//! # Domain Types
//!
//! Core domain types used throughout Ecopila.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Producto     │   │    Proveedor    │   │  TipoProducto   │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  (Rubro)        │       │
//! │  │  id (i64)       │──►│  id             │   │  ─────────────  │       │
//! │  │  codigo (biz)   │   │  nombre         │   │  id             │       │
//! │  │  precios (¢)    │──────────────────────►  │  nombre         │       │
//! │  │  relacionados   │   │  contacto       │   └─────────────────┘       │
//! │  └─────────────────┘   └─────────────────┘                              │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    TaxRate      │   │    Percent      │   │  MutationEntry  │       │
//! │  │  IVA in bps     │   │  margin in bps  │   │  offline queue  │       │
//! │  │  2100 = 21%     │   │  3000 = 30%     │   │  row            │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Optimistic Identity
//! The server assigns integer ids. A row created offline gets a temporary
//! id taken from the clock in milliseconds, which is always above
//! [`OPTIMISTIC_ID_THRESHOLD`]. When the create reaches the server the row
//! is re-keyed to the real id.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::money::{ExchangeRate, Money};

// =============================================================================
// Rates
// =============================================================================

/// IVA rate in basis points (2100 = 21%).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaxRate(u32);

impl TaxRate {
    /// Standard Argentine IVA.
    pub const GENERAL: TaxRate = TaxRate(2100);

    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    /// Creates a rate from a fraction as the API sends it (`0.21`).
    pub fn from_fraction(fraction: f64) -> Self {
        if !fraction.is_finite() || fraction <= 0.0 {
            return TaxRate(0);
        }
        TaxRate((fraction * 10_000.0).round() as u32)
    }

    /// The rate as a fraction (`0.21`), for the API and display only.
    #[inline]
    pub fn fraction(&self) -> f64 {
        self.0 as f64 / 10_000.0
    }

    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Returns the rate as a percentage (for display only).
    #[inline]
    pub fn percentage(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        TaxRate::GENERAL
    }
}

/// A percentage in basis points, used for the profit margin (3000 = 30%).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Percent(u32);

impl Percent {
    /// Margin used when a CSV row leaves `%GAN` blank.
    pub const DEFAULT_MARGIN: Percent = Percent(3000);

    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        Percent(bps)
    }

    /// Creates a percent from a human percentage (`30.0` → 30%).
    pub fn from_percentage(pct: f64) -> Self {
        if !pct.is_finite() || pct <= 0.0 {
            return Percent(0);
        }
        Percent((pct * 100.0).round() as u32)
    }

    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    #[inline]
    pub fn percentage(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    #[inline]
    pub const fn zero() -> Self {
        Percent(0)
    }
}

impl Default for Percent {
    fn default() -> Self {
        Percent::DEFAULT_MARGIN
    }
}

// =============================================================================
// Optimistic Identifiers
// =============================================================================

/// Ids at or above this value were minted locally and are unknown to the
/// server (milliseconds since epoch pass 10^12 in September 2001).
pub const OPTIMISTIC_ID_THRESHOLD: i64 = 1_000_000_000_000;

/// Returns true when `id` is a temporary id created while offline.
#[inline]
pub const fn is_optimistic_id(id: i64) -> bool {
    id >= OPTIMISTIC_ID_THRESHOLD
}

/// Mints a temporary id from the given instant.
pub fn optimistic_id(now: DateTime<Utc>) -> i64 {
    now.timestamp_millis().max(OPTIMISTIC_ID_THRESHOLD)
}

/// Formats an id for the product table: zero-padded to five digits, or
/// `PENDIENTE` for rows the server has not confirmed.
///
/// ## Example
/// ```rust
/// use ecopila_core::types::display_id;
///
/// assert_eq!(display_id(42), "00042");
/// assert_eq!(display_id(123456), "123456");
/// assert_eq!(display_id(1_700_000_000_000), "PENDIENTE");
/// ```
pub fn display_id(id: i64) -> String {
    if is_optimistic_id(id) {
        "PENDIENTE".to_string()
    } else {
        format!("{:05}", id)
    }
}

// =============================================================================
// Proveedor / TipoProducto
// =============================================================================

/// A supplier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Proveedor {
    pub id: i64,
    pub nombre: String,
    pub contacto: String,
}

/// A product category ("rubro").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct TipoProducto {
    pub id: i64,
    pub nombre: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ProveedorPayload {
    pub nombre: String,
    pub contacto: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TipoProductoPayload {
    pub nombre: String,
}

// =============================================================================
// Producto
// =============================================================================

/// A sellable inventory item with its derived price fields.
///
/// Monetary fields are stored in cents. `*_us_*`, `costo_dolares` and
/// `precio_sin_iva` are dollars; the rest are pesos.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Producto {
    pub id: i64,
    pub codigo_producto: String,
    pub descripcion: String,
    /// Units in stock. Zero or less shows "Revisar Stock".
    pub cantidad: i64,
    pub iva_bps: u32,
    pub porcentaje_ganancia_bps: u32,
    /// Rounding increment in whole pesos.
    pub resto: Option<i64>,
    /// When set, `costo_pesos` is fixed and does not follow the dollar.
    pub costo_fijo: bool,
    pub precio_sin_iva_cents: i64,
    pub costo_dolares_cents: i64,
    pub costo_pesos_cents: i64,
    pub precio_publico_us_cents: i64,
    pub precio_sin_redondear_cents: i64,
    pub precio_publico_cents: i64,
    #[ts(as = "Option<String>")]
    pub fecha_ingreso: Option<NaiveDate>,
    pub proveedor_id: Option<i64>,
    pub tipo_producto_id: Option<i64>,
    pub productos_relacionados_ids: Vec<i64>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Producto {
    #[inline]
    pub fn iva(&self) -> TaxRate {
        TaxRate::from_bps(self.iva_bps)
    }

    #[inline]
    pub fn margen(&self) -> Percent {
        Percent::from_bps(self.porcentaje_ganancia_bps)
    }

    #[inline]
    pub fn precio_publico(&self) -> Money {
        Money::from_cents(self.precio_publico_cents)
    }

    #[inline]
    pub fn precio_sin_iva(&self) -> Money {
        Money::from_cents(self.precio_sin_iva_cents)
    }

    #[inline]
    pub fn costo_pesos(&self) -> Money {
        Money::from_cents(self.costo_pesos_cents)
    }

    /// True while the create for this row is still queued.
    #[inline]
    pub fn is_pending(&self) -> bool {
        is_optimistic_id(self.id)
    }

    #[inline]
    pub fn stock_status(&self) -> StockStatus {
        StockStatus::from_cantidad(self.cantidad)
    }

    /// The editable part of the product, as create/update send it.
    pub fn to_payload(&self) -> ProductPayload {
        ProductPayload {
            codigo_producto: self.codigo_producto.clone(),
            descripcion: self.descripcion.clone(),
            cantidad: self.cantidad,
            proveedor_id: self.proveedor_id,
            tipo_producto_id: self.tipo_producto_id,
            porcentaje_ganancia_bps: self.porcentaje_ganancia_bps,
            iva_bps: self.iva_bps,
            resto: self.resto,
            costo_fijo: self.costo_fijo,
            precio_sin_iva_cents: Some(self.precio_sin_iva_cents),
            costo_pesos_cents: self.costo_fijo.then_some(self.costo_pesos_cents),
        }
    }
}

/// Stock badge shown next to each product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    Ok,
    RevisarStock,
}

impl StockStatus {
    #[inline]
    pub const fn from_cantidad(cantidad: i64) -> Self {
        if cantidad <= 0 {
            StockStatus::RevisarStock
        } else {
            StockStatus::Ok
        }
    }
}

/// What create, update and bulk upload send for a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ProductPayload {
    pub codigo_producto: String,
    pub descripcion: String,
    pub cantidad: i64,
    pub proveedor_id: Option<i64>,
    pub tipo_producto_id: Option<i64>,
    pub porcentaje_ganancia_bps: u32,
    pub iva_bps: u32,
    pub resto: Option<i64>,
    pub costo_fijo: bool,
    pub precio_sin_iva_cents: Option<i64>,
    pub costo_pesos_cents: Option<i64>,
}

impl ProductPayload {
    #[inline]
    pub fn iva(&self) -> TaxRate {
        TaxRate::from_bps(self.iva_bps)
    }

    #[inline]
    pub fn margen(&self) -> Percent {
        Percent::from_bps(self.porcentaje_ganancia_bps)
    }
}

/// Undirected link between two products.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ProductRelationPayload {
    pub producto_id: i64,
    pub producto_relacionado_id: i64,
}

/// A related product as shown in the product details view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct RelatedProduct {
    pub id: i64,
    pub descripcion: String,
    pub nombre_proveedor: Option<String>,
    pub precio_publico_cents: i64,
    pub nombre_tipo_producto: Option<String>,
}

// =============================================================================
// Ventas
// =============================================================================

/// One product leaving stock in a sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ProductDiscountPayload {
    pub id: i64,
    pub cantidad: i64,
}

/// What checkout queues for `/venta/ventas`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct VentaPayload {
    pub items: Vec<ProductDiscountPayload>,
    pub total_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct VentaItem {
    pub id: i64,
    pub producto_id: i64,
    pub producto_descripcion: String,
    pub cantidad: i64,
    pub precio_unitario_cents: i64,
}

/// A sale as confirmed by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Venta {
    pub id: i64,
    pub numero_comprobante: String,
    #[ts(as = "String")]
    pub fecha_venta: DateTime<Utc>,
    pub total_venta_cents: i64,
    pub items: Vec<VentaItem>,
}

// =============================================================================
// Dólar
// =============================================================================

/// Name shown when the server leaves the rate unnamed.
pub const DEFAULT_DOLAR_NAME: &str = "Valor del Dólar Actual";

/// The exchange rate published by `/dolar/dolar`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Dolar {
    pub id: i64,
    pub nombre: String,
    pub precio_centavos: i64,
}

impl Dolar {
    #[inline]
    pub fn rate(&self) -> ExchangeRate {
        ExchangeRate::from_centavos(self.precio_centavos)
    }

    /// A rate of zero or less is treated as missing.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.rate().is_valid()
    }
}

// =============================================================================
// Auth
// =============================================================================

/// Role carried in the session token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::User => "USER",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().trim_start_matches("ROLE_").to_ascii_uppercase().as_str() {
            "ADMIN" => Ok(Role::Admin),
            "USER" => Ok(Role::User),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

// =============================================================================
// Mutation Queue
// =============================================================================

/// Every write the client can queue while offline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    CreateProduct,
    UpdateProduct,
    DeleteProduct,
    CreateProveedor,
    UpdateProveedor,
    DeleteProveedor,
    CreateTipoProducto,
    UpdateTipoProducto,
    DeleteTipoProducto,
    BulkTipoProducto,
    BulkUploadProducts,
    RelateProducts,
    RelateProduct,
    UnrelateProduct,
    RegistrarVenta,
}

impl MutationKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            MutationKind::CreateProduct => "create_product",
            MutationKind::UpdateProduct => "update_product",
            MutationKind::DeleteProduct => "delete_product",
            MutationKind::CreateProveedor => "create_proveedor",
            MutationKind::UpdateProveedor => "update_proveedor",
            MutationKind::DeleteProveedor => "delete_proveedor",
            MutationKind::CreateTipoProducto => "create_tipo_producto",
            MutationKind::UpdateTipoProducto => "update_tipo_producto",
            MutationKind::DeleteTipoProducto => "delete_tipo_producto",
            MutationKind::BulkTipoProducto => "bulk_tipo_producto",
            MutationKind::BulkUploadProducts => "bulk_upload_products",
            MutationKind::RelateProducts => "relate_products",
            MutationKind::RelateProduct => "relate_product",
            MutationKind::UnrelateProduct => "unrelate_product",
            MutationKind::RegistrarVenta => "registrar_venta",
        }
    }

    /// Mutations that touch the product table (shown as the pending badge
    /// on the product list).
    pub const fn affects_products(&self) -> bool {
        matches!(
            self,
            MutationKind::CreateProduct
                | MutationKind::UpdateProduct
                | MutationKind::DeleteProduct
                | MutationKind::BulkUploadProducts
                | MutationKind::RegistrarVenta
        )
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a queued mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum MutationStatus {
    /// Waiting to be sent (or to be retried after a network error).
    Pending,
    /// Claimed by the processor; the request is on the wire.
    #[cfg_attr(feature = "sqlx", sqlx(rename = "in_flight"))]
    InFlight,
    /// Accepted by the server.
    Done,
    /// Rejected by the server; rolled back locally and never retried.
    Failed,
}

impl Default for MutationStatus {
    fn default() -> Self {
        MutationStatus::Pending
    }
}

/// A row in the persisted mutation queue.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct MutationEntry {
    pub id: String,
    pub kind: MutationKind,
    /// Id of the row the mutation targets (may be optimistic).
    pub entity_id: String,
    /// Request body plus rollback snapshot, as JSON.
    pub payload: String,
    pub status: MutationStatus,
    pub attempts: i64,
    pub last_error: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub attempted_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub completed_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Unit Tests
// =============================================================================

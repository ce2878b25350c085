//! # Error Types
//!
//! Domain-specific error types for ecopila-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  ecopila-core errors (this file)                                       │
//! │  ├── CoreError        - General domain errors                          │
//! │  ├── ValidationError  - Input validation failures                      │
//! │  ├── PricingError     - Price derivation failures                      │
//! │  └── ImportError      - CSV bulk upload failures                       │
//! │                                                                         │
//! │  ecopila-db errors     └── DbError    - Database operation failures    │
//! │  ecopila-sync errors   └── SyncError  - Network / server failures      │
//! │  desktop app errors    └── ApiError   - What the frontend sees         │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError/SyncError → ApiError      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Messages shown verbatim to the shop staff are in Spanish; the rest stay
//! in English for the logs.

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Producto no encontrado: {0}")]
    ProductoNotFound(i64),

    #[error("Proveedor no encontrado: {0}")]
    ProveedorNotFound(i64),

    #[error("Rubro no encontrado: {0}")]
    RubroNotFound(i64),

    /// The product was created offline and the server has not confirmed it.
    ///
    /// ## When This Occurs
    /// - Scanning a code that matches a product still in the queue
    /// - Relating or selling a product with an optimistic id
    #[error("El producto {0} está pendiente de sincronización")]
    ProductoPending(i64),

    /// Cart has exceeded maximum allowed lines.
    #[error("Cart cannot have more than {max} items")]
    CartTooLarge { max: usize },

    /// Item quantity exceeds maximum allowed.
    #[error("Quantity {requested} exceeds maximum allowed ({max})")]
    QuantityTooLarge { requested: i64, max: i64 },

    /// Checkout with nothing in the cart.
    #[error("El carrito está vacío")]
    EmptyCart,

    /// Custom price list with no products selected.
    #[error("No hay productos seleccionados para generar la lista")]
    NadaSeleccionado,

    /// Per-supplier price list for a supplier with no products.
    #[error("El proveedor {0} no tiene productos para listar")]
    ProveedorSinProductos(String),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Pricing(#[from] PricingError),

    #[error(transparent)]
    Import(#[from] ImportError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Used for early validation before business logic runs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field} is required")]
    Required { field: String },

    #[error("{field} must be at least {min} characters")]
    TooShort { field: String, min: usize },

    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    #[error("{field} must be positive")]
    MustBePositive { field: String },

    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Password and confirmation differ on the register form.
    #[error("Las contraseñas no coinciden")]
    PasswordMismatch,

    #[error("{field} '{value}' already exists")]
    Duplicate { field: String, value: String },
}

// =============================================================================
// Pricing Error
// =============================================================================

/// Failures while deriving a product's prices.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PricingError {
    /// The dollar rate is zero, negative or was never fetched.
    #[error("Valor del dólar inválido: {centavos} centavos")]
    InvalidRate { centavos: i64 },

    /// A fixed-cost product without a peso cost.
    #[error("Producto con costo fijo requiere costo en pesos")]
    MissingFixedCost,

    #[error("Costo negativo: {cents} centavos")]
    NegativeCost { cents: i64 },
}

// =============================================================================
// Import Error
// =============================================================================

/// A single CSV row that could not be turned into a product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineError {
    /// 1-based line in the file (the header is line 1).
    pub line: usize,
    pub message: String,
}

impl std::fmt::Display for LineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Línea {}: {}", self.line, self.message)
    }
}

/// CSV bulk upload failures.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Debe seleccionar un proveedor antes de cargar el archivo")]
    ProveedorRequired,

    /// The file is not valid CSV (unbalanced quotes, bad encoding).
    #[error("Error al leer el archivo CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("El archivo no contiene la columna {0}")]
    MissingColumn(&'static str),

    /// One or more rows failed; nothing is uploaded.
    #[error("El archivo contiene {} errores", .0.len())]
    InvalidRows(Vec<LineError>),

    #[error("No se encontraron productos para cargar")]
    Empty,

    /// Creating the missing categories failed; the upload is aborted.
    #[error("Falló la creación de algunos rubros: {}", .0.join(", "))]
    RubroCreationFailed(Vec<String>),
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

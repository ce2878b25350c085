//! # API Error Type
//!
//! Unified error type for desktop commands.
//!
//! ## Error Handling Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow in Ecopila                                │
//! │                                                                         │
//! │  Frontend                    Rust Backend                               │
//! │  ────────                    ────────────                               │
//! │                                                                         │
//! │  invoke('create_producto')                                              │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │  Command Function                                                │  │
//! │  │  Result<T, ApiError>                                             │  │
//! │  │         │                                                        │  │
//! │  │  Validation? ──── ValidationError ──────────────┐                │  │
//! │  │  Replica?    ──── DbError::NotFound ────────────┤                │  │
//! │  │  Server?     ──── SyncError::Server{409, ..} ───┼──► ApiError ──►│  │
//! │  │  Import?     ──── ImportError::InvalidRows ─────┘                │  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! │                                                                         │
//! │  try {                                                                  │
//! │    await invoke('create_producto', { payload })                         │
//! │  } catch (e) {                                                          │
//! │    // e.code = "VALIDATION_ERROR"                                       │
//! │    // e.message = "codigo_producto is required"                         │
//! │  }                                                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::Serialize;

use ecopila_core::{CoreError, ImportError, PricingError, ValidationError};
use ecopila_db::DbError;
use ecopila_sync::SyncError;

use crate::pdf::PdfError;

/// Error returned from every command.
///
/// ```json
/// { "code": "NOT_FOUND", "message": "Producto no encontrado: 42" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    /// Machine-readable error code for programmatic handling
    pub code: ErrorCode,

    /// Human-readable error message for display
    pub message: String,
}

/// Error codes for command responses.
///
/// ## Usage in Frontend
/// ```typescript
/// switch (e.code) {
///   case 'NETWORK_ERROR': showOfflineBanner(); break;
///   case 'USERNAME_TAKEN': setFieldError('username', e.message); break;
///   case 'FORBIDDEN': toast.error('Solo administradores'); break;
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Row missing from the replica or the server (404)
    NotFound,

    /// Input validation failed (400)
    ValidationError,

    /// Local replica failure
    DatabaseError,

    /// Server unreachable; the write may still be queued
    NetworkError,

    /// Server answered with an error
    ServerError,

    /// No session, or the server refused the token
    Unauthorized,

    /// Logged in, but not as an admin
    Forbidden,

    /// Cart operation failed
    CartError,

    /// CSV could not be imported
    ImportError,

    InternalError,

    /// Registration with a name that already exists
    UsernameTaken,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        ApiError {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(resource: &str, id: impl std::fmt::Display) -> Self {
        ApiError::new(ErrorCode::NotFound, format!("{} not found: {}", resource, id))
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::ValidationError, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::InternalError, message)
    }

    pub fn cart(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::CartError, message)
    }

    pub fn forbidden() -> Self {
        ApiError::new(
            ErrorCode::Forbidden,
            "Esta acción requiere permisos de administrador",
        )
    }

    pub fn unauthorized() -> Self {
        ApiError::new(ErrorCode::Unauthorized, "Debe iniciar sesión")
    }
}

/// Converts database errors to API errors.
impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => ApiError::not_found(&entity, id),
            DbError::UniqueViolation { field, value } => ApiError::new(
                ErrorCode::ValidationError,
                format!("{} '{}' already exists", field, value),
            ),
            DbError::ForeignKeyViolation { message } => {
                tracing::error!("Foreign key violation: {}", message);
                ApiError::new(ErrorCode::ValidationError, "Invalid reference")
            }
            DbError::ConnectionFailed(_) => {
                ApiError::new(ErrorCode::DatabaseError, "Database connection failed")
            }
            DbError::MigrationFailed(_) => {
                ApiError::new(ErrorCode::DatabaseError, "Database migration failed")
            }
            DbError::QueryFailed(e) => {
                // Log the actual error but return a generic message
                tracing::error!("Database query failed: {}", e);
                ApiError::new(ErrorCode::DatabaseError, "Database operation failed")
            }
            DbError::TransactionFailed(e) => {
                tracing::error!("Transaction failed: {}", e);
                ApiError::new(ErrorCode::DatabaseError, "Database transaction failed")
            }
            DbError::PoolExhausted => {
                ApiError::new(ErrorCode::DatabaseError, "Database pool exhausted")
            }
            DbError::Internal(e) => {
                tracing::error!("Internal database error: {}", e);
                ApiError::new(ErrorCode::DatabaseError, "Database operation failed")
            }
        }
    }
}

/// Converts core errors to API errors.
impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        let message = err.to_string();
        match err {
            CoreError::ProductoNotFound(_)
            | CoreError::ProveedorNotFound(_)
            | CoreError::RubroNotFound(_) => ApiError::new(ErrorCode::NotFound, message),
            CoreError::ProductoPending(_)
            | CoreError::CartTooLarge { .. }
            | CoreError::QuantityTooLarge { .. }
            | CoreError::EmptyCart => ApiError::new(ErrorCode::CartError, message),
            CoreError::NadaSeleccionado | CoreError::ProveedorSinProductos(_) => {
                ApiError::validation(message)
            }
            CoreError::Validation(e) => e.into(),
            CoreError::Pricing(e) => e.into(),
            CoreError::Import(e) => e.into(),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::validation(err.to_string())
    }
}

impl From<PricingError> for ApiError {
    fn from(err: PricingError) -> Self {
        ApiError::validation(err.to_string())
    }
}

/// Row errors are listed one per line after the summary.
impl From<ImportError> for ApiError {
    fn from(err: ImportError) -> Self {
        let message = match &err {
            ImportError::InvalidRows(lines) => {
                let mut message = err.to_string();
                for line in lines {
                    message.push('\n');
                    message.push_str(&line.to_string());
                }
                message
            }
            _ => err.to_string(),
        };
        ApiError::new(ErrorCode::ImportError, message)
    }
}

/// Converts sync errors to API errors.
impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Network(_) | SyncError::Timeout(_) | SyncError::Offline => {
                ApiError::new(ErrorCode::NetworkError, err.to_string())
            }
            SyncError::Server { status: 404, message } => {
                ApiError::new(ErrorCode::NotFound, message)
            }
            SyncError::Server { message, .. } => ApiError::new(ErrorCode::ServerError, message),
            SyncError::Unauthorized { status: 403 } => ApiError::forbidden(),
            SyncError::Unauthorized { .. }
            | SyncError::NotAuthenticated
            | SyncError::InvalidToken(_) => {
                ApiError::new(ErrorCode::Unauthorized, err.to_string())
            }
            SyncError::DolarUnavailable => ApiError::new(ErrorCode::ServerError, err.to_string()),
            SyncError::InvalidConfig(_) | SyncError::InvalidUrl(_) => {
                ApiError::validation(err.to_string())
            }
            SyncError::DatabaseError(e) => {
                tracing::error!("Database error during sync: {}", e);
                ApiError::new(ErrorCode::DatabaseError, "Database operation failed")
            }
            other => {
                tracing::error!(error = %other, "Sync failure");
                ApiError::internal(other.to_string())
            }
        }
    }
}

impl From<csv::Error> for ApiError {
    fn from(err: csv::Error) -> Self {
        tracing::error!("CSV export failed: {}", err);
        ApiError::internal(format!("No se pudo generar el CSV: {}", err))
    }
}

impl From<PdfError> for ApiError {
    fn from(err: PdfError) -> Self {
        tracing::error!(error = %err, "Price list rendering failed");
        ApiError::internal(format!("No se pudo generar el PDF: {}", err))
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

/// Result type of every command.
pub type ApiResult<T> = Result<T, ApiError>;

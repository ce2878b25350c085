//! # Validation Module
//!
//! Input validation for products, suppliers, categories and the login forms.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Frontend forms (required fields, lengths)                    │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Tauri command → THIS MODULE                                  │
//! │           │  runs before anything is queued, so a bad payload never    │
//! │           │  sits in the offline queue waiting to be rejected          │
//! │           ▼                                                             │
//! │  Layer 3: Local SQLite constraints (UNIQUE codigo, FKs)                │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 4: Ecopila API server                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use ecopila_core::validation::{validate_codigo, validate_username};
//!
//! assert!(validate_codigo("PIL-AA-4").is_ok());
//! assert!(validate_username("ana").is_err());
//! ```

use crate::error::ValidationError;
use crate::types::ProductPayload;
use crate::MAX_ITEM_QUANTITY;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Minimum length for usernames and passwords on the register form.
pub const MIN_CREDENTIAL_LENGTH: usize = 6;

fn required(field: &str, value: &str, max: usize) -> ValidationResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }
    Ok(value.to_string())
}

fn in_range(field: &str, value: i64, min: i64, max: i64) -> ValidationResult<()> {
    if value < min || value > max {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min,
            max,
        });
    }
    Ok(())
}

// =============================================================================
// String Validators
// =============================================================================

/// Validates a product code.
///
/// ## Rules
/// - Required, at most 50 characters
/// - No inner whitespace (codes are typed into the scan box)
///
/// ## Returns
/// The trimmed code.
pub fn validate_codigo(codigo: &str) -> ValidationResult<String> {
    let codigo = required("codigo_producto", codigo, 50)?;
    if codigo.chars().any(char::is_whitespace) {
        return Err(ValidationError::InvalidFormat {
            field: "codigo_producto".to_string(),
            reason: "must not contain spaces".to_string(),
        });
    }
    Ok(codigo)
}

/// Validates a product description (required, at most 200 characters).
pub fn validate_descripcion(descripcion: &str) -> ValidationResult<String> {
    required("descripcion", descripcion, 200)
}

/// Validates a supplier or category name (required, at most 100 characters).
pub fn validate_nombre(nombre: &str) -> ValidationResult<String> {
    required("nombre", nombre, 100)
}

/// Validates supplier contact details (email, phone, free text).
pub fn validate_contacto(contacto: &str) -> ValidationResult<String> {
    required("contacto", contacto, 200)
}

/// Validates a search query.
///
/// ## Rules
/// - Can be empty (returns all results)
/// - Maximum 100 characters
///
/// ## Returns
/// The trimmed query string.
pub fn validate_search_query(query: &str) -> ValidationResult<String> {
    let query = query.trim();

    if query.chars().count() > 100 {
        return Err(ValidationError::TooLong {
            field: "query".to_string(),
            max: 100,
        });
    }

    Ok(query.to_string())
}

pub fn validate_username(username: &str) -> ValidationResult<String> {
    let username = username.trim();
    if username.chars().count() < MIN_CREDENTIAL_LENGTH {
        return Err(ValidationError::TooShort {
            field: "username".to_string(),
            min: MIN_CREDENTIAL_LENGTH,
        });
    }
    Ok(username.to_string())
}

/// Passwords are not trimmed.
pub fn validate_password(password: &str) -> ValidationResult<()> {
    if password.chars().count() < MIN_CREDENTIAL_LENGTH {
        return Err(ValidationError::TooShort {
            field: "password".to_string(),
            min: MIN_CREDENTIAL_LENGTH,
        });
    }
    Ok(())
}

pub fn validate_password_confirmation(password: &str, confirm: &str) -> ValidationResult<()> {
    if password != confirm {
        return Err(ValidationError::PasswordMismatch);
    }
    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Margin in basis points: 0% to 1000%.
pub fn validate_margin_bps(bps: u32) -> ValidationResult<()> {
    in_range("porcentaje_ganancia", bps as i64, 0, 100_000)
}

/// IVA in basis points: 0% to 100%.
pub fn validate_iva_bps(bps: u32) -> ValidationResult<()> {
    in_range("iva", bps as i64, 0, 10_000)
}

/// Rounding increment in whole pesos; `None` disables rounding.
pub fn validate_resto(resto: Option<i64>) -> ValidationResult<()> {
    match resto {
        None => Ok(()),
        Some(r) => in_range("resto", r, 1, 100_000),
    }
}

/// Stock level.
pub fn validate_cantidad(cantidad: i64) -> ValidationResult<()> {
    in_range("cantidad", cantidad, 0, 1_000_000)
}

/// Quantity of one cart line.
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }
    in_range("quantity", qty, 1, MAX_ITEM_QUANTITY)
}

pub fn validate_price_cents(field: &str, cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Composite Validators
// =============================================================================

/// Validates a product payload and returns it with trimmed strings.
///
/// ## Example
/// ```rust
/// use ecopila_core::types::ProductPayload;
/// use ecopila_core::validation::validate_product_payload;
///
/// let payload = ProductPayload {
///     codigo_producto: " AA-4 ".into(),
///     descripcion: "Pila AA x4".into(),
///     cantidad: 10,
///     proveedor_id: Some(1),
///     tipo_producto_id: Some(2),
///     porcentaje_ganancia_bps: 3000,
///     iva_bps: 2100,
///     resto: Some(10),
///     costo_fijo: false,
///     precio_sin_iva_cents: Some(250),
///     costo_pesos_cents: None,
/// };
/// let clean = validate_product_payload(payload).unwrap();
/// assert_eq!(clean.codigo_producto, "AA-4");
/// ```
pub fn validate_product_payload(mut payload: ProductPayload) -> ValidationResult<ProductPayload> {
    payload.codigo_producto = validate_codigo(&payload.codigo_producto)?;
    payload.descripcion = validate_descripcion(&payload.descripcion)?;
    validate_cantidad(payload.cantidad)?;
    validate_margin_bps(payload.porcentaje_ganancia_bps)?;
    validate_iva_bps(payload.iva_bps)?;
    validate_resto(payload.resto)?;

    if let Some(cents) = payload.precio_sin_iva_cents {
        validate_price_cents("precio_sin_iva", cents)?;
    }
    if let Some(cents) = payload.costo_pesos_cents {
        validate_price_cents("costo_pesos", cents)?;
    }
    if payload.costo_fijo && payload.costo_pesos_cents.is_none() {
        return Err(ValidationError::Required {
            field: "costo_pesos".to_string(),
        });
    }

    Ok(payload)
}

// =============================================================================
// Unit Tests
// =============================================================================

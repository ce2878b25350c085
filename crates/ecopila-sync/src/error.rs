//! # Sync Error Types
//!
//! Error types for requests to the Ecopila API and queue replay.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │   Transport     │  │     Server              │ │
//! │  │                 │  │  (retryable)    │  │  (never retried)        │ │
//! │  │  InvalidConfig  │  │  Network        │  │  Server { status }      │ │
//! │  │  InvalidUrl     │  │  Timeout        │  │  Unauthorized           │ │
//! │  │  ConfigLoad...  │  │  Offline        │  │  InvalidResponse        │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │    Database     │  │     Queue       │  │      Session            │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  DatabaseError  │  │  InvalidPayload │  │  InvalidToken           │ │
//! │  │                 │  │  ShuttingDown   │  │  NotAuthenticated       │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The split between the transport column and the server column is the
//! queue's retry policy: see [`SyncError::is_retryable`].

use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Everything that can go wrong talking to the server or replaying the
/// queue.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid API URL: {0}")]
    InvalidUrl(String),

    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// No response at all: refused connection, DNS failure, dropped socket.
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Offline mode is on; the request was not attempted.
    #[error("Sin conexión con el servidor")]
    Offline,

    // =========================================================================
    // Server Errors
    // =========================================================================
    /// The server answered with a 4xx/5xx other than 401/403.
    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    /// 401 or 403. The session is dropped by whoever listens for it.
    #[error("No autorizado ({status})")]
    Unauthorized { status: u16 },

    /// The body did not match what the endpoint should return.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// `/dolar/dolar` returned nothing usable.
    #[error("Valor del dólar no disponible")]
    DolarUnavailable,

    // =========================================================================
    // Session Errors
    // =========================================================================
    #[error("Invalid session token: {0}")]
    InvalidToken(String),

    #[error("Not logged in")]
    NotAuthenticated,

    // =========================================================================
    // Local Errors
    // =========================================================================
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// A queued payload could not be decoded.
    #[error("Invalid queued payload: {0}")]
    InvalidPayload(String),

    #[error("Sync agent is shutting down")]
    ShuttingDown,

    #[error("Channel error: {0}")]
    ChannelError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<ecopila_db::DbError> for SyncError {
    fn from(err: ecopila_db::DbError) -> Self {
        SyncError::DatabaseError(err.to_string())
    }
}

impl From<ecopila_core::PricingError> for SyncError {
    fn from(err: ecopila_core::PricingError) -> Self {
        SyncError::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::InvalidPayload(err.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SyncError::Timeout(0)
        } else if err.is_decode() {
            SyncError::InvalidResponse(err.to_string())
        } else if let Some(status) = err.status() {
            SyncError::Server {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else if err.is_builder() {
            SyncError::InvalidUrl(err.to_string())
        } else {
            // connect, request and body errors: the server never answered
            SyncError::Network(err.to_string())
        }
    }
}

impl From<jsonwebtoken::errors::Error> for SyncError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        SyncError::InvalidToken(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization (for retry logic)
// =============================================================================

impl SyncError {
    /// Returns true when the request never reached the server, so the
    /// queued mutation stays pending and is replayed later.
    ///
    /// ## Retryable Errors
    /// - Network failures (no response)
    /// - Timeouts
    /// - Offline mode
    ///
    /// ## Non-Retryable Errors
    /// - Any HTTP error status (400, 404, 409, 500...)
    /// - 401/403
    /// - Malformed responses
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::Network(_) | SyncError::Timeout(_) | SyncError::Offline
        )
    }

    /// Returns true for 401/403.
    pub fn is_auth_error(&self) -> bool {
        matches!(self, SyncError::Unauthorized { .. })
    }

    /// The HTTP status, when the server answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            SyncError::Server { status, .. } | SyncError::Unauthorized { status } => Some(*status),
            _ => None,
        }
    }

    /// Returns true for a 404 from the server.
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::InvalidUrl(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
        )
    }
}

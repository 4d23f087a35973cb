//! Error types for Stockroom operations

use thiserror::Error;

/// Malformed mutation intents or filter values.
///
/// Never retried and never reaches the cache: an intent that fails
/// validation is rejected before any snapshot or projection happens.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: &'static str },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Failures reported by the remote data service.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// Transport failure: the request may or may not have reached the server.
    #[error("Network error: {reason}")]
    Network { reason: String },

    /// The service answered and rejected the request (e.g. insufficient stock).
    #[error("Server rejected {operation}: {message}")]
    Server { operation: String, message: String },
}

impl RemoteError {
    pub fn network(reason: impl Into<String>) -> Self {
        Self::Network {
            reason: reason.into(),
        }
    }

    pub fn server(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Server {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Whether the view should offer a retry. Only transport failures qualify.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network { .. })
    }
}

/// Master error type for all Stockroom errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StockroomError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),
}

impl StockroomError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Validation(_) => false,
            Self::Remote(err) => err.is_retryable(),
        }
    }
}

/// Result type alias for Stockroom operations.
pub type StockroomResult<T> = Result<T, StockroomError>;

// =============================================================================
// TESTS
// =============================================================================

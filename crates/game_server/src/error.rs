//! Error types for the server layer.
//!
//! [`ServerError`] covers infrastructure failures (binding, sockets, task
//! plumbing). [`GatewayError`] covers everything that can reject a single
//! client request and knows how to present itself as an `error` event.

use gambit_rooms::{ErrorKind, RoomError};
use thiserror::Error;

/// Infrastructure failures.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Network-related errors (binding, connection issues, etc.)
    #[error("Network error: {0}")]
    Network(String),

    /// Invalid server configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server errors (task failures, invariant breaks, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failure of an external capability (balance oracle, token verifier,
/// settlement gateway).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExternalError {
    #[error("{0} timed out")]
    Timeout(String),

    #[error("rejected: {0}")]
    Rejected(String),

    #[error("service unavailable: {0}")]
    Unavailable(String),
}

impl ExternalError {
    /// Timeouts and outages may succeed on retry; rejections will not.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Rejected(_))
    }
}

/// Why a single inbound request was refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("unknown event '{0}'")]
    UnknownEvent(String),

    #[error("invalid payload: {0}")]
    Validation(String),

    #[error("authentication required")]
    Unauthenticated,

    #[error("wallet does not match the authenticated session")]
    WalletMismatch,

    #[error("session not found")]
    SessionNotFound,

    #[error("too many actions, slow down")]
    RateLimited,

    #[error("{0}")]
    Room(#[from] RoomError),

    #[error("{0}")]
    External(#[from] ExternalError),

    #[error("internal error")]
    Internal,
}

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Malformed(_) | Self::UnknownEvent(_) | Self::Validation(_) => {
                ErrorKind::ValidationError
            }
            Self::Unauthenticated | Self::WalletMismatch => ErrorKind::AuthorizationError,
            Self::SessionNotFound => ErrorKind::NotFoundError,
            Self::RateLimited => ErrorKind::RateLimitError,
            Self::Room(e) => e.kind(),
            Self::External(_) => ErrorKind::ExternalServiceError,
            Self::Internal => ErrorKind::InternalError,
        }
    }
}

impl From<validator::ValidationErrors> for GatewayError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let fields: Vec<String> = errors
            .field_errors()
            .keys()
            .map(|field| field.to_string())
            .collect();
        Self::Validation(format!("invalid field(s): {}", fields.join(", ")))
    }
}

//! Error taxonomy shared by the REST client and the RPC bridge.
//!
//! Callers cannot tell (and need not care) which backend produced an error.

use hivegate_auth::{AuthzError, SessionError};
use hivegate_core::DomainError;

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// No token, or the server answered 401. The caller should sign out and
    /// send the user to the login page.
    #[error("unauthorized")]
    Unauthorized,

    /// Any other non-success status.
    #[error("request failed ({status}): {message}")]
    RequestFailed { status: u16, message: String },

    /// A single-record read found nothing.
    #[error("not found")]
    NotFound,

    /// Network failure or an unparseable response body.
    #[error("transport error: {0}")]
    Transport(String),

    /// Rejected before any request was made.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A region-scoped record outside the user's grants (client-side check).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The session could not be persisted or cleared locally.
    #[error("session storage failed: {0}")]
    Session(String),
}

impl GatewayError {
    pub fn status(&self) -> Option<u16> {
        match self {
            GatewayError::Unauthorized => Some(401),
            GatewayError::RequestFailed { status, .. } => Some(*status),
            GatewayError::NotFound => Some(404),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            GatewayError::NotFound | GatewayError::RequestFailed { status: 404, .. }
        )
    }
}

impl From<DomainError> for GatewayError {
    fn from(value: DomainError) -> Self {
        GatewayError::Validation(value.to_string())
    }
}

impl From<AuthzError> for GatewayError {
    fn from(value: AuthzError) -> Self {
        GatewayError::Forbidden(value.to_string())
    }
}

impl From<SessionError> for GatewayError {
    fn from(value: SessionError) -> Self {
        GatewayError::Session(value.to_string())
    }
}

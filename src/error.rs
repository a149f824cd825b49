use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    status: u16,
}

/// Errors from hashing, token, CSRF and session operations.
///
/// Messages never carry secrets, raw passwords or signatures.  Everything
/// in the [`is_unauthorized`](Self::is_unauthorized) family renders to the
/// client as the same generic 401 body.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Malformed password hash: {0}")]
    MalformedHash(String),

    #[error("Malformed token: {0}")]
    MalformedToken(String),

    #[error("Token signature mismatch")]
    SignatureMismatch,

    #[error("Token has expired")]
    Expired,

    #[error("Token has been revoked")]
    Revoked,

    #[error("CSRF validation failed")]
    CsrfValidation,

    #[error("Authentication failed")]
    AuthenticationFailed,

    #[error("Credential store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Auth not configured: {0}")]
    ConfigError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Errors that reach the client as a plain "unauthorized".
    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            AuthError::MalformedHash(_)
                | AuthError::MalformedToken(_)
                | AuthError::SignatureMismatch
                | AuthError::Expired
                | AuthError::Revoked
                | AuthError::CsrfValidation
                | AuthError::AuthenticationFailed
        )
    }

    /// Dependency faults the caller may retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AuthError::StoreUnavailable(_))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AuthError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AuthError::ConfigError(_) | AuthError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Which check failed stays server-side.
        let error = match &self {
            AuthError::InvalidInput(_) => self.to_string(),
            AuthError::StoreUnavailable(_) => "service unavailable".to_string(),
            AuthError::ConfigError(_) | AuthError::Internal(_) => "internal error".to_string(),
            _ => "unauthorized".to_string(),
        };

        let body = ErrorBody {
            error,
            status: status.as_u16(),
        };

        (status, axum::Json(body)).into_response()
    }
}

//! Authentication errors.

use thiserror::Error;

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Neither an `Authorization` header nor a token query parameter.
    #[error("missing bearer token")]
    MissingToken,

    /// Invalid authorization header format.
    #[error("invalid authorization header format")]
    InvalidAuthHeader,

    /// Token expired.
    #[error("token expired")]
    TokenExpired,

    /// Invalid token.
    #[error("invalid token: {0}")]
    InvalidToken(String),

    /// Internal error.
    #[error("internal auth error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Stable machine-readable code for HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingToken => "missing_token",
            Self::InvalidAuthHeader => "invalid_auth_header",
            Self::TokenExpired => "token_expired",
            Self::InvalidToken(_) => "invalid_token",
            Self::Internal(_) => "internal_error",
        }
    }
}

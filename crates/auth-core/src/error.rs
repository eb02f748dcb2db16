//! Error types for authentication operations

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    /// An authorization header was present but was not a bearer credential.
    #[error("Malformed credential")]
    MalformedCredential,

    /// Signature, claim or algorithm check failed. The detail is for logs only.
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Token expired")]
    TokenExpired,

    /// No usable verification key set (fetch failed or timed out).
    #[error("Verification key set unavailable: {0}")]
    KeySetUnavailable(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    pub fn invalid_token(detail: impl Into<String>) -> Self {
        Self::InvalidToken(detail.into())
    }

    pub fn key_set_unavailable(detail: impl Into<String>) -> Self {
        Self::KeySetUnavailable(detail.into())
    }

    pub fn config(detail: impl Into<String>) -> Self {
        Self::Configuration(detail.into())
    }

    /// Errors that must be reported to a caller as an authentication failure.
    pub fn is_authentication(&self) -> bool {
        matches!(
            self,
            Self::MalformedCredential
                | Self::InvalidToken(_)
                | Self::TokenExpired
                | Self::KeySetUnavailable(_)
        )
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => Self::TokenExpired,
            _ => Self::InvalidToken(err.to_string()),
        }
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;

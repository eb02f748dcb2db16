//! Error types for the gateway

use syncgate_auth_core::AuthError;
use thiserror::Error;

/// Gateway-side failures. None of these carry detail to the HTTP caller;
/// handlers map them to fixed responses.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("No valid session")]
    NoSession,

    #[error("Auth service rejected the request with status {status}")]
    AuthServiceRejected { status: u16 },

    #[error("Auth service unavailable: {message}")]
    AuthServiceUnavailable { message: String },

    #[error("Auth service returned an unexpected response: {message}")]
    InvalidResponse { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GatewayError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::AuthServiceUnavailable {
            message: message.into(),
        }
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::invalid_response(err.to_string())
        } else {
            Self::unavailable(err.to_string())
        }
    }
}

impl From<config::ConfigError> for GatewayError {
    fn from(err: config::ConfigError) -> Self {
        Self::config(err.to_string())
    }
}

/// Outcome of a mutation processor that did not apply the batch.
#[derive(Debug, Error)]
pub enum ProcessorError {
    /// Business rejection; the reason is safe to show the client.
    #[error("Mutation rejected: {0}")]
    Rejected(String),

    /// Anything else. Logged, never shown.
    #[error("Mutation processing failed: {0}")]
    Failed(String),
}

impl From<reqwest::Error> for ProcessorError {
    fn from(err: reqwest::Error) -> Self {
        Self::Failed(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;

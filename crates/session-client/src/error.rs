//! Error types for the session client

use thiserror::Error;

/// Result type for session client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur in the session client
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport failure talking to the gateway
    #[error("Network error: {message}")]
    Network { message: String },

    /// The refresh endpoint refused to mint a new token
    #[error("Token refresh rejected with status {status}")]
    RefreshRejected { status: u16 },

    /// The gateway rejected the caller's credentials
    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    /// No token could be obtained; the session is gone
    #[error("Logged out")]
    LoggedOut,

    /// The sync engine refused a well-authorized mutation
    #[error("Mutation rejected ({status}): {message}")]
    MutationRejected { status: u16, message: String },

    /// Response body could not be decoded
    #[error("Decode error: {message}")]
    Decode { message: String },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl ClientError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Whether a refresh-and-retry could fix this.
    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode {
                message: err.to_string(),
            }
        } else {
            Self::network(err.to_string())
        }
    }
}

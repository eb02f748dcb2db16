//! Bearer credential extraction

use std::fmt;

use crate::{AuthError, Result};

const BEARER_PREFIX: &str = "Bearer ";

/// Raw token taken from an `Authorization: Bearer <token>` header.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerCredential(String);

impl BearerCredential {
    /// Absent header is `Ok(None)`; anything that is not a bearer credential
    /// is rejected.
    pub fn from_header(header: Option<&str>) -> Result<Option<Self>> {
        let Some(header) = header else {
            return Ok(None);
        };

        let token = header
            .strip_prefix(BEARER_PREFIX)
            .ok_or(AuthError::MalformedCredential)?
            .trim();

        if token.is_empty() {
            return Err(AuthError::MalformedCredential);
        }

        Ok(Some(Self(token.to_string())))
    }

    pub fn token(&self) -> &str {
        &self.0
    }

    pub fn into_token(self) -> String {
        self.0
    }
}

// Tokens stay out of logs.
impl fmt::Debug for BearerCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BearerCredential(..)")
    }
}

//! Refresh endpoint logic
//!
//! A refresh validates the caller's session with the auth service, asks it
//! for a fresh token, and only then assembles all three identity fields.
//! Any failure yields no fields at all, so the response sets no cookies and
//! the client keeps what it had.

use std::sync::Arc;

use axum::http::HeaderMap;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use cookie::time::Duration;
use syncgate_auth_core::IdentityFields;
use tracing::{debug, info};

use crate::auth_service::AuthService;
use crate::config::CookieConfig;
use crate::error::{GatewayError, Result};

/// Attributes shared by every identity cookie the gateway writes.
#[derive(Debug, Clone)]
pub struct CookiePolicy {
    max_age: Duration,
    secure: bool,
}

impl CookiePolicy {
    pub fn new(config: &CookieConfig) -> Self {
        Self {
            max_age: Duration::seconds(config.max_age_seconds),
            secure: config.secure,
        }
    }

    fn cookie(&self, name: &'static str, value: String, max_age: Duration) -> Cookie<'static> {
        // Not HttpOnly: the client reads these fields.
        Cookie::build((name, value))
            .path("/")
            .max_age(max_age)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .build()
    }

    /// All three fields, written together.
    pub fn identity_cookies(&self, fields: &IdentityFields) -> CookieJar {
        fields.entries().into_iter().fold(CookieJar::new(), |jar, (name, value)| {
            jar.add(self.cookie(name, value.to_string(), self.max_age))
        })
    }

    /// Removal cookies for all three fields.
    pub fn removal_cookies(&self) -> CookieJar {
        IdentityFields::cleared()
            .entries()
            .into_iter()
            .fold(CookieJar::new(), |jar, (name, value)| {
                jar.add(self.cookie(name, value.to_string(), Duration::ZERO))
            })
    }
}

pub struct RefreshService {
    auth: Arc<dyn AuthService>,
    cookies: CookiePolicy,
}

impl RefreshService {
    pub fn new(auth: Arc<dyn AuthService>, cookies: CookiePolicy) -> Self {
        Self { auth, cookies }
    }

    pub fn cookies(&self) -> &CookiePolicy {
        &self.cookies
    }

    /// Validate the session, then issue a token. Both must succeed.
    pub async fn refresh(&self, headers: &HeaderMap) -> Result<IdentityFields> {
        let session = self.auth.get_session(headers).await?.ok_or(GatewayError::NoSession)?;
        debug!(user_id = %session.user_id, "Session validated");

        let token = self.auth.issue_token(headers).await?;

        info!(user_id = %session.user_id, "Refreshed session token");
        Ok(IdentityFields::new(session.user_id, session.email, token))
    }
}

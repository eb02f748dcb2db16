//! Logout: end the auth service session, then clear all three fields.

use std::sync::Arc;

use axum::http::HeaderMap;
use axum_extra::extract::cookie::CookieJar;
use tracing::{info, warn};

use crate::auth_service::AuthService;
use crate::refresh::CookiePolicy;

pub struct LogoutService {
    auth: Arc<dyn AuthService>,
    cookies: CookiePolicy,
}

impl LogoutService {
    pub fn new(auth: Arc<dyn AuthService>, cookies: CookiePolicy) -> Self {
        Self { auth, cookies }
    }

    /// Best effort sign-out. The returned removal cookies are sent even when
    /// the auth service call fails.
    pub async fn logout(&self, headers: &HeaderMap) -> CookieJar {
        match self.auth.sign_out(headers).await {
            Ok(()) => info!("Signed out session"),
            Err(e) => warn!(error = %e, "Auth service sign-out failed, clearing fields anyway"),
        }
        self.cookies.removal_cookies()
    }
}

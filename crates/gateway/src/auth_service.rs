//! Client for the external auth service
//!
//! The gateway never owns sessions. It asks the auth service whether the
//! caller's cookies carry a valid session and, if so, to mint a token for it.

use std::time::Duration;

use async_trait::async_trait;
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::HeaderMap;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

use crate::config::AuthServiceConfig;
use crate::error::{GatewayError, Result};

/// A session as reported by the auth service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSession {
    pub user_id: String,
    pub email: String,
    pub active_organization_id: Option<String>,
}

#[async_trait]
pub trait AuthService: Send + Sync {
    /// `Ok(None)` when the caller has no valid session.
    async fn get_session(&self, headers: &HeaderMap) -> Result<Option<AuthSession>>;

    /// Mint a session token for the caller's session.
    async fn issue_token(&self, headers: &HeaderMap) -> Result<String>;

    async fn sign_out(&self, headers: &HeaderMap) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    user: SessionUser,
    #[serde(default)]
    session: Option<SessionDetail>,
}

#[derive(Debug, Deserialize)]
struct SessionUser {
    id: String,
    email: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionDetail {
    #[serde(default)]
    active_organization_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

/// [`AuthService`] over HTTP.
pub struct HttpAuthService {
    client: reqwest::Client,
    session_url: String,
    token_url: String,
    sign_out_url: String,
}

impl HttpAuthService {
    pub fn new(config: &AuthServiceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: reqwest::Client, config: &AuthServiceConfig) -> Self {
        let base = config.base_url.trim_end_matches('/');
        Self {
            client,
            session_url: format!("{}{}", base, config.session_path),
            token_url: format!("{}{}", base, config.token_path),
            sign_out_url: format!("{}{}", base, config.sign_out_path),
        }
    }

    /// Copy the caller's credentials onto an outgoing request.
    fn forward(&self, mut request: reqwest::RequestBuilder, headers: &HeaderMap) -> reqwest::RequestBuilder {
        for name in [COOKIE, AUTHORIZATION] {
            for value in headers.get_all(&name) {
                request = request.header(name.clone(), value.clone());
            }
        }
        request
    }
}

#[async_trait]
impl AuthService for HttpAuthService {
    async fn get_session(&self, headers: &HeaderMap) -> Result<Option<AuthSession>> {
        let response = self.forward(self.client.get(&self.session_url), headers).send().await?;
        let status = response.status();
        debug!(status = status.as_u16(), "Auth service session lookup");

        if status == StatusCode::UNAUTHORIZED {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(GatewayError::AuthServiceRejected {
                status: status.as_u16(),
            });
        }

        let Some(body) = response.json::<Option<SessionResponse>>().await? else {
            return Ok(None);
        };

        if body.user.id.trim().is_empty() || body.user.email.trim().is_empty() {
            return Err(GatewayError::invalid_response("session without user id or email"));
        }

        Ok(Some(AuthSession {
            user_id: body.user.id,
            email: body.user.email,
            active_organization_id: body
                .session
                .and_then(|s| s.active_organization_id)
                .filter(|org| !org.trim().is_empty()),
        }))
    }

    async fn issue_token(&self, headers: &HeaderMap) -> Result<String> {
        let response = self.forward(self.client.get(&self.token_url), headers).send().await?;
        let status = response.status();

        if !status.is_success() {
            return Err(GatewayError::AuthServiceRejected {
                status: status.as_u16(),
            });
        }

        let body: TokenResponse = response.json().await?;
        if body.token.trim().is_empty() {
            return Err(GatewayError::invalid_response("empty token"));
        }
        Ok(body.token)
    }

    async fn sign_out(&self, headers: &HeaderMap) -> Result<()> {
        let response = self
            .forward(self.client.post(&self.sign_out_url), headers)
            .send()
            .await?;
        let status = response.status();

        if !status.is_success() {
            return Err(GatewayError::AuthServiceRejected {
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

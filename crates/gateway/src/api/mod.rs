//! REST API for the gateway

pub mod security_headers;

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use syncgate_auth_core::{BearerVerifier, HttpKeySetSource, JwksVerifier, KeySetCache};
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::info;

use crate::auth_service::{AuthService, HttpAuthService};
use crate::config::GatewayConfig;
use crate::error::Result;
use crate::logout::LogoutService;
use crate::mutation::{HttpMutationProcessor, MutationGateway, MutationProcessor, Rejection};
use crate::refresh::{CookiePolicy, RefreshService};

pub use security_headers::security_headers_middleware;

/// Shared handler state
#[derive(Clone)]
pub struct ApiState {
    pub refresh: Arc<RefreshService>,
    pub logout: Arc<LogoutService>,
    pub mutations: Arc<MutationGateway>,
    pub body_limit: usize,
}

impl ApiState {
    pub fn new(
        auth: Arc<dyn AuthService>,
        verifier: Arc<dyn BearerVerifier>,
        processor: Arc<dyn MutationProcessor>,
        config: &GatewayConfig,
    ) -> Self {
        let cookies = CookiePolicy::new(&config.cookies);
        Self {
            refresh: Arc::new(RefreshService::new(auth.clone(), cookies.clone())),
            logout: Arc::new(LogoutService::new(auth, cookies)),
            mutations: Arc::new(MutationGateway::new(
                verifier,
                processor,
                config.mutations.anonymous_policy,
            )),
            body_limit: config.server.body_limit_bytes,
        }
    }

    /// Wire the HTTP collaborators named in the configuration.
    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        let auth = Arc::new(HttpAuthService::new(&config.auth_service)?);

        // Fetches are bounded by the key set cache's own timeout.
        let key_source = Arc::new(HttpKeySetSource::new(
            reqwest::Client::builder().build()?,
            config.verification.jwks_url.clone(),
        ));
        let keys = Arc::new(KeySetCache::new(key_source, config.key_set_settings()));
        let verifier = Arc::new(JwksVerifier::new(keys, config.verifier_settings()));

        let processor = Arc::new(HttpMutationProcessor::new(&config.mutations)?);

        Ok(Self::new(auth, verifier, processor, config))
    }
}

/// Create the REST API router
pub fn create_router(state: ApiState) -> Router {
    let body_limit = state.body_limit;

    Router::new()
        .route("/auth/refresh", get(refresh))
        .route("/auth/logout", post(logout))
        .route("/mutations", post(push_mutations))
        .route("/health", get(health))
        .with_state(state)
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(body_limit))
}

async fn refresh(State(state): State<ApiState>, headers: HeaderMap) -> Response {
    match state.refresh.refresh(&headers).await {
        Ok(fields) => (StatusCode::OK, state.refresh.cookies().identity_cookies(&fields)).into_response(),
        Err(e) => {
            // No cookies at all: the client keeps its current fields.
            info!(error = %e, "Refresh refused");
            StatusCode::UNAUTHORIZED.into_response()
        }
    }
}

async fn logout(State(state): State<ApiState>, headers: HeaderMap) -> Response {
    (StatusCode::OK, state.logout.logout(&headers).await).into_response()
}

async fn push_mutations(State(state): State<ApiState>, headers: HeaderMap, body: Bytes) -> Response {
    let header = match headers.get(AUTHORIZATION).map(|v| v.to_str()).transpose() {
        Ok(header) => header,
        Err(_) => return Rejection::MalformedCredential.into_response(),
    };

    match state.mutations.process(header, body).await {
        Ok(result) => Json(result).into_response(),
        Err(rejection) => rejection.into_response(),
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

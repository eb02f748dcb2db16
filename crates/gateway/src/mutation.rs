//! Mutation authorization gateway
//!
//! Every push request moves through
//! `Received -> TokenExtraction -> {Anonymous | VerificationPending} -> {Verified | Rejected}`
//! and, once authorized, `-> Forwarded -> {Applied | ProcessorRejected}`.
//! The processor only ever sees an authority produced by [`MutationGateway::authorize`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use serde_json::{json, Value};
use syncgate_auth_core::{AuthError, BearerCredential, BearerVerifier, MutationAuthority};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::MutationConfig;
use crate::error::{GatewayError, ProcessorError};

pub const SUBJECT_HEADER: &str = "x-mutation-subject";
pub const ORGANIZATION_HEADER: &str = "x-mutation-organization";

/// What to do with a push request that carries no credential at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnonymousPolicy {
    /// Hand the batch to the processor with an absent authority.
    #[default]
    Forward,
    /// Refuse it as unauthenticated.
    Reject,
}

/// Why a push request was not applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("Missing or invalid authorization header")]
    MalformedCredential,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Authentication required")]
    AnonymousRejected,

    #[error("{0}")]
    ProcessorRejected(String),

    #[error("Mutation processing failed")]
    ProcessorFailed,
}

impl Rejection {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MalformedCredential | Self::InvalidToken | Self::AnonymousRejected => StatusCode::UNAUTHORIZED,
            Self::ProcessorRejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::ProcessorFailed => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Applies an authorized batch. Implementations must treat the authority as
/// the only source of identity.
#[async_trait]
pub trait MutationProcessor: Send + Sync {
    async fn process(&self, authority: MutationAuthority, batch: Bytes) -> Result<Value, ProcessorError>;
}

pub struct MutationGateway {
    verifier: Arc<dyn BearerVerifier>,
    processor: Arc<dyn MutationProcessor>,
    anonymous: AnonymousPolicy,
}

impl MutationGateway {
    pub fn new(
        verifier: Arc<dyn BearerVerifier>,
        processor: Arc<dyn MutationProcessor>,
        anonymous: AnonymousPolicy,
    ) -> Self {
        Self {
            verifier,
            processor,
            anonymous,
        }
    }

    pub fn anonymous_policy(&self) -> AnonymousPolicy {
        self.anonymous
    }

    /// Turn an `Authorization` header into a mutation authority.
    ///
    /// No header means anonymous (subject to the policy). A header that is
    /// not a bearer credential is rejected without touching the verifier.
    pub async fn authorize(&self, header: Option<&str>) -> Result<MutationAuthority, Rejection> {
        let credential = BearerCredential::from_header(header).map_err(|_| {
            debug!("Rejecting non-bearer authorization header");
            Rejection::MalformedCredential
        })?;

        let Some(credential) = credential else {
            return match self.anonymous {
                AnonymousPolicy::Forward => {
                    debug!("Forwarding anonymous push");
                    Ok(None)
                }
                AnonymousPolicy::Reject => Err(Rejection::AnonymousRejected),
            };
        };

        match self.verifier.verify(credential.token()).await {
            Ok(verified) => {
                debug!(subject = %verified.subject, "Bearer token verified");
                Ok(Some(verified.into_context()))
            }
            Err(AuthError::KeySetUnavailable(detail)) => {
                warn!(%detail, "No verification keys available, rejecting push");
                Err(Rejection::InvalidToken)
            }
            Err(e) => {
                debug!(error = %e, "Bearer token rejected");
                Err(Rejection::InvalidToken)
            }
        }
    }

    /// Authorize, then hand the batch to the processor.
    pub async fn process(&self, header: Option<&str>, batch: Bytes) -> Result<Value, Rejection> {
        let authority = self.authorize(header).await?;

        match self.processor.process(authority, batch).await {
            Ok(result) => Ok(result),
            Err(ProcessorError::Rejected(reason)) => {
                info!(%reason, "Mutation batch rejected by processor");
                Err(Rejection::ProcessorRejected(reason))
            }
            Err(ProcessorError::Failed(detail)) => {
                error!(%detail, "Mutation processor failed");
                Err(Rejection::ProcessorFailed)
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProcessorErrorBody {
    error: String,
}

/// Forwards authorized batches to the sync engine's push endpoint.
///
/// The outgoing request is built from scratch, so identity headers sent by
/// the original caller never reach the sync engine.
pub struct HttpMutationProcessor {
    client: reqwest::Client,
    url: String,
}

impl HttpMutationProcessor {
    pub fn new(config: &MutationConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self::with_client(client, config.processor_url.clone()))
    }

    pub fn with_client(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl MutationProcessor for HttpMutationProcessor {
    async fn process(&self, authority: MutationAuthority, batch: Bytes) -> Result<Value, ProcessorError> {
        let mut request = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .body(batch);

        if let Some(context) = &authority {
            request = request.header(SUBJECT_HEADER, context.subject.as_str());
            if let Some(org) = &context.organization_id {
                request = request.header(ORGANIZATION_HEADER, org.as_str());
            }
        }

        let response = request.send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response.json::<Value>().await?);
        }

        if status.is_client_error() {
            if let Ok(body) = response.json::<ProcessorErrorBody>().await {
                return Err(ProcessorError::Rejected(body.error));
            }
        }

        Err(ProcessorError::Failed(format!("sync engine responded with {}", status)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use syncgate_auth_core::testing::{foreign_issuer, primary_issuer};
    use syncgate_auth_core::{
        AuthorizedMutationContext, JwksVerifier, KeySetCache, KeySetSettings, StaticKeySetSource, VerifiedToken,
        VerifierSettings,
    };

    /// Records every authority the processor was handed.
    #[derive(Default)]
    struct Recorded {
        calls: Mutex<Vec<MutationAuthority>>,
        outcome: Option<ProcessorError>,
    }

    #[async_trait]
    impl MutationProcessor for Recorded {
        async fn process(&self, authority: MutationAuthority, _batch: Bytes) -> Result<Value, ProcessorError> {
            self.calls.lock().unwrap().push(authority);
            match &self.outcome {
                None => Ok(json!({ "ok": true })),
                Some(ProcessorError::Rejected(r)) => Err(ProcessorError::Rejected(r.clone())),
                Some(ProcessorError::Failed(d)) => Err(ProcessorError::Failed(d.clone())),
            }
        }
    }

    struct CountingVerifier {
        inner: JwksVerifier,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl BearerVerifier for CountingVerifier {
        async fn verify(&self, token: &str) -> syncgate_auth_core::Result<VerifiedToken> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.verify(token).await
        }
    }

    fn verifier() -> Arc<CountingVerifier> {
        let source = Arc::new(StaticKeySetSource::new(primary_issuer().key_set()));
        let keys = Arc::new(KeySetCache::new(source, KeySetSettings::default()));
        Arc::new(CountingVerifier {
            inner: JwksVerifier::new(keys, VerifierSettings::default()),
            calls: AtomicUsize::new(0),
        })
    }

    fn build_gateway(
        policy: AnonymousPolicy,
        outcome: Option<ProcessorError>,
    ) -> (MutationGateway, Arc<CountingVerifier>, Arc<Recorded>) {
        let verifier = verifier();
        let processor = Arc::new(Recorded {
            outcome,
            ..Default::default()
        });
        let gateway = MutationGateway::new(verifier.clone(), processor.clone(), policy);
        (gateway, verifier, processor)
    }

    #[tokio::test]
    async fn test_valid_token_yields_context() {
        let (gateway, _, processor) = build_gateway(AnonymousPolicy::Forward, None);
        let token = primary_issuer().issue("u1", Some("a@b.com"), Some("org-1")).unwrap();
        let header = format!("Bearer {}", token);

        let result = gateway.process(Some(&header), Bytes::from_static(b"{}")).await.unwrap();

        assert_eq!(result, json!({ "ok": true }));
        assert_eq!(
            processor.calls.lock().unwrap().as_slice(),
            &[Some(AuthorizedMutationContext::new("u1", Some("org-1".into())))]
        );
    }

    #[tokio::test]
    async fn test_missing_header_forwards_without_verification() {
        let (gateway, verifier, processor) = build_gateway(AnonymousPolicy::Forward, None);

        gateway.process(None, Bytes::new()).await.unwrap();

        assert_eq!(verifier.calls.load(Ordering::SeqCst), 0);
        assert_eq!(processor.calls.lock().unwrap().as_slice(), &[None]);
    }

    #[tokio::test]
    async fn test_missing_header_rejected_by_policy() {
        let (gateway, _, processor) = build_gateway(AnonymousPolicy::Reject, None);

        let err = gateway.process(None, Bytes::new()).await.unwrap_err();

        assert_eq!(err, Rejection::AnonymousRejected);
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        assert!(processor.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_non_bearer_header_is_malformed() {
        let (gateway, verifier, processor) = build_gateway(AnonymousPolicy::Forward, None);

        for header in ["Basic dXNlcjpwYXNz", "bearer abc", "Bearer "] {
            let err = gateway.process(Some(header), Bytes::new()).await.unwrap_err();
            assert_eq!(err, Rejection::MalformedCredential, "header {:?}", header);
        }

        assert_eq!(verifier.calls.load(Ordering::SeqCst), 0);
        assert!(processor.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_bad_tokens_never_reach_processor() {
        let (gateway, _, processor) = build_gateway(AnonymousPolicy::Forward, None);
        let expired = primary_issuer().issue_expired("u1", None, None).unwrap();
        let forged = foreign_issuer().issue("u1", None, None).unwrap();

        for token in [expired.as_str(), forged.as_str(), "not.a.jwt"] {
            let header = format!("Bearer {}", token);
            let err = gateway.process(Some(&header), Bytes::new()).await.unwrap_err();
            assert_eq!(err, Rejection::InvalidToken);
        }

        assert!(processor.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_processor_outcomes_map_to_rejections() {
        let (gateway, _, _) = build_gateway(
            AnonymousPolicy::Forward,
            Some(ProcessorError::Rejected("cart is full".into())),
        );
        let err = gateway.process(None, Bytes::new()).await.unwrap_err();
        assert_eq!(err, Rejection::ProcessorRejected("cart is full".into()));
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let (gateway, _, _) = build_gateway(
            AnonymousPolicy::Forward,
            Some(ProcessorError::Failed("connection reset".into())),
        );
        let err = gateway.process(None, Bytes::new()).await.unwrap_err();
        assert_eq!(err, Rejection::ProcessorFailed);
        assert_eq!(err.to_string(), "Mutation processing failed");
    }

    #[test]
    fn test_policy_deserializes_lowercase() {
        let policy: AnonymousPolicy = serde_json::from_str("\"reject\"").unwrap();
        assert_eq!(policy, AnonymousPolicy::Reject);
        assert_eq!(AnonymousPolicy::default(), AnonymousPolicy::Forward);
    }
}

//! Shared fakes for gateway integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::http::HeaderMap;
use bytes::Bytes;
use serde_json::{json, Value};
use syncgate_auth_core::testing::primary_issuer;
use syncgate_auth_core::{
    BearerVerifier, JwksVerifier, KeySetCache, KeySetSettings, MutationAuthority, StaticKeySetSource,
    TokenIssuer, VerifiedToken, VerifierSettings,
};
use syncgate_gateway::{
    ApiState, AuthService, AuthSession, GatewayConfig, GatewayError, MutationProcessor, ProcessorError,
};

/// Auth service with a fixed session. Tokens are minted by `issuer` unless
/// issuance is switched off.
pub struct FakeAuthService {
    pub session: Option<AuthSession>,
    pub issuer: TokenIssuer,
    pub issue_fails: bool,
    pub sign_outs: AtomicUsize,
}

impl FakeAuthService {
    pub fn logged_in() -> Self {
        Self {
            session: Some(AuthSession {
                user_id: "u1".into(),
                email: "a@b.com".into(),
                active_organization_id: Some("org-1".into()),
            }),
            issuer: primary_issuer(),
            issue_fails: false,
            sign_outs: AtomicUsize::new(0),
        }
    }

    pub fn failing_issuance() -> Self {
        Self {
            issue_fails: true,
            ..Self::logged_in()
        }
    }

    pub fn signed_out() -> Self {
        Self {
            session: None,
            ..Self::logged_in()
        }
    }
}

#[async_trait]
impl AuthService for FakeAuthService {
    async fn get_session(&self, _headers: &HeaderMap) -> syncgate_gateway::Result<Option<AuthSession>> {
        Ok(self.session.clone())
    }

    async fn issue_token(&self, _headers: &HeaderMap) -> syncgate_gateway::Result<String> {
        if self.issue_fails {
            return Err(GatewayError::AuthServiceRejected { status: 500 });
        }
        let session = self.session.as_ref().ok_or(GatewayError::NoSession)?;
        Ok(self.issuer.issue(
            &session.user_id,
            Some(&session.email),
            session.active_organization_id.as_deref(),
        )?)
    }

    async fn sign_out(&self, _headers: &HeaderMap) -> syncgate_gateway::Result<()> {
        self.sign_outs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Records what the processor was handed and echoes the subject back.
#[derive(Default)]
pub struct RecordingProcessor {
    pub calls: Mutex<Vec<MutationAuthority>>,
    pub outcome: Option<ProcessorError>,
}

impl RecordingProcessor {
    pub fn failing_with(outcome: ProcessorError) -> Self {
        Self {
            outcome: Some(outcome),
            ..Default::default()
        }
    }

    pub fn authorities(&self) -> Vec<MutationAuthority> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl MutationProcessor for RecordingProcessor {
    async fn process(&self, authority: MutationAuthority, _batch: Bytes) -> Result<Value, ProcessorError> {
        let subject = authority.as_ref().map(|c| c.subject.clone());
        self.calls.lock().unwrap().push(authority);
        match &self.outcome {
            None => Ok(json!({ "applied": true, "subject": subject })),
            Some(ProcessorError::Rejected(reason)) => Err(ProcessorError::Rejected(reason.clone())),
            Some(ProcessorError::Failed(detail)) => Err(ProcessorError::Failed(detail.clone())),
        }
    }
}

/// Verifier over the primary fixture key that counts verification calls.
pub struct CountingVerifier {
    pub keys: Arc<KeySetCache>,
    inner: JwksVerifier,
    pub calls: AtomicUsize,
}

impl CountingVerifier {
    pub fn new() -> Self {
        let source = Arc::new(StaticKeySetSource::new(primary_issuer().key_set()));
        let keys = Arc::new(KeySetCache::new(source, KeySetSettings::default()));
        Self {
            inner: JwksVerifier::new(keys.clone(), VerifierSettings::default()),
            keys,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BearerVerifier for CountingVerifier {
    async fn verify(&self, token: &str) -> syncgate_auth_core::Result<VerifiedToken> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.verify(token).await
    }
}

pub struct Harness {
    pub auth: Arc<FakeAuthService>,
    pub verifier: Arc<CountingVerifier>,
    pub processor: Arc<RecordingProcessor>,
    pub state: ApiState,
}

impl Harness {
    pub fn new(auth: FakeAuthService, processor: RecordingProcessor, config: &GatewayConfig) -> Self {
        let auth = Arc::new(auth);
        let verifier = Arc::new(CountingVerifier::new());
        let processor = Arc::new(processor);
        let state = ApiState::new(auth.clone(), verifier.clone(), processor.clone(), config);
        Self {
            auth,
            verifier,
            processor,
            state,
        }
    }

    pub fn default_config() -> Self {
        Self::new(
            FakeAuthService::logged_in(),
            RecordingProcessor::default(),
            &GatewayConfig::default(),
        )
    }
}

//! Session token issuance
//!
//! The auth service mints the tokens the gateway verifies. This issuer
//! produces tokens of the same shape for local development and tests, and
//! publishes its public key as a JWK set the way the auth service does.

use std::sync::Arc;

use jsonwebtoken::jwk::{Jwk, JwkSet};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::Deserialize;
use uuid::Uuid;

use crate::claims::SessionClaims;
use crate::{AuthError, Result};

/// Issuer configuration
#[derive(Debug, Clone, Deserialize)]
pub struct IssuerConfig {
    pub issuer: Option<String>,
    pub audience: Vec<String>,
    pub token_ttl_seconds: u64,
    pub key_id: String,
    #[serde(skip)]
    pub signing_key: Option<String>, // PKCS#8 PEM
}

impl Default for IssuerConfig {
    fn default() -> Self {
        Self {
            issuer: None,
            audience: Vec::new(),
            token_ttl_seconds: 3600, // 1 hour
            key_id: "syncgate-local".to_string(),
            signing_key: None,
        }
    }
}

/// RS256 session token issuer
#[derive(Clone)]
pub struct TokenIssuer {
    config: IssuerConfig,
    encoding_key: Arc<EncodingKey>,
    header: Header,
    jwk: Jwk,
}

impl TokenIssuer {
    pub fn new(mut config: IssuerConfig) -> Result<Self> {
        let signing_key = config
            .signing_key
            .take()
            .ok_or_else(|| AuthError::config("Issuer needs a signing key"))?;

        let encoding_key = EncodingKey::from_rsa_pem(signing_key.as_bytes())
            .map_err(|e| AuthError::config(format!("Invalid RSA key: {}", e)))?;
        let jwk = Self::public_jwk(&signing_key, &config.key_id)?;

        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(config.key_id.clone());

        config.signing_key = Some(signing_key);

        Ok(Self {
            config,
            encoding_key: Arc::new(encoding_key),
            header,
            jwk,
        })
    }

    /// Issuer for an existing PKCS#8 PEM key.
    pub fn from_pem(pem: &str, key_id: impl Into<String>) -> Result<Self> {
        Self::new(IssuerConfig {
            key_id: key_id.into(),
            signing_key: Some(pem.to_string()),
            ..Default::default()
        })
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.config.issuer = Some(issuer.into());
        self
    }

    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.config.audience.push(audience.into());
        self
    }

    pub fn key_id(&self) -> &str {
        &self.config.key_id
    }

    /// Mint a token valid for the configured TTL.
    pub fn issue(&self, subject: &str, email: Option<&str>, organization_id: Option<&str>) -> Result<String> {
        self.issue_with_ttl(subject, email, organization_id, self.config.token_ttl_seconds as i64)
    }

    /// Mint a token whose expiry is already in the past.
    pub fn issue_expired(&self, subject: &str, email: Option<&str>, organization_id: Option<&str>) -> Result<String> {
        self.issue_with_ttl(subject, email, organization_id, -600)
    }

    pub fn issue_with_ttl(
        &self,
        subject: &str,
        email: Option<&str>,
        organization_id: Option<&str>,
        ttl_seconds: i64,
    ) -> Result<String> {
        let claims = self.claims(Some(subject), email, organization_id, ttl_seconds);
        self.sign(&claims)
    }

    /// Standard claims for this issuer, before any caller adjustments.
    pub fn claims(
        &self,
        subject: Option<&str>,
        email: Option<&str>,
        organization_id: Option<&str>,
        ttl_seconds: i64,
    ) -> SessionClaims {
        let now = chrono::Utc::now();
        let exp = now + chrono::Duration::seconds(ttl_seconds);

        SessionClaims {
            sub: subject.map(String::from),
            exp: exp.timestamp().max(0) as u64,
            iat: Some(now.timestamp() as u64),
            iss: self.config.issuer.clone(),
            aud: self.config.audience.clone(),
            jti: Some(Uuid::new_v4().to_string()),
            email: email.map(String::from),
            active_organization_id: organization_id.map(String::from),
        }
    }

    pub fn sign(&self, claims: &SessionClaims) -> Result<String> {
        encode(&self.header, claims, &self.encoding_key)
            .map_err(|e| AuthError::Internal(format!("Failed to sign token: {}", e)))
    }

    /// Public key in JWK form.
    pub fn jwk(&self) -> &Jwk {
        &self.jwk
    }

    /// Public key set as the auth service publishes it.
    pub fn key_set(&self) -> JwkSet {
        JwkSet {
            keys: vec![self.jwk.clone()],
        }
    }

    fn public_jwk(private_pem: &str, key_id: &str) -> Result<Jwk> {
        use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
        use rsa::pkcs8::DecodePrivateKey;
        use rsa::traits::PublicKeyParts;
        use rsa::{RsaPrivateKey, RsaPublicKey};

        let private_key = RsaPrivateKey::from_pkcs8_pem(private_pem)
            .map_err(|e| AuthError::config(format!("Failed to parse private key: {}", e)))?;
        let public_key = RsaPublicKey::from(&private_key);

        let jwk = serde_json::json!({
            "kty": "RSA",
            "use": "sig",
            "kid": key_id,
            "alg": "RS256",
            "n": URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be()),
            "e": URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be()),
        });

        serde_json::from_value(jwk).map_err(|e| AuthError::Internal(format!("Failed to build JWK: {}", e)))
    }
}

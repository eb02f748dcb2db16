//! Bearer token verification against the published key set

use std::sync::Arc;

use async_trait::async_trait;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use crate::claims::SessionClaims;
use crate::jwks::KeySetCache;
use crate::types::AuthorizedMutationContext;
use crate::{AuthError, Result};

/// Identity asserted by a token that passed every check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedToken {
    pub subject: String,
    pub organization_id: Option<String>,
    pub email: Option<String>,
    pub expires_at: u64,
}

impl VerifiedToken {
    pub fn into_context(self) -> AuthorizedMutationContext {
        AuthorizedMutationContext::new(self.subject, self.organization_id)
    }
}

/// Checks a raw bearer token.
#[async_trait]
pub trait BearerVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<VerifiedToken>;
}

/// Claim requirements beyond signature and expiry.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VerifierSettings {
    /// Expected `iss`, unchecked when `None`.
    pub issuer: Option<String>,
    /// Accepted `aud` values, unchecked when empty.
    pub audience: Vec<String>,
    /// Clock skew tolerance for `exp`.
    pub leeway_seconds: u64,
    /// Reject tokens without an `activeOrganizationId` claim.
    pub require_organization_claim: bool,
}

/// Verifies tokens with keys from a [`KeySetCache`].
pub struct JwksVerifier {
    keys: Arc<KeySetCache>,
    settings: VerifierSettings,
}

impl JwksVerifier {
    pub fn new(keys: Arc<KeySetCache>, settings: VerifierSettings) -> Self {
        Self { keys, settings }
    }

    pub fn key_set_cache(&self) -> &Arc<KeySetCache> {
        &self.keys
    }

    fn validation(&self, alg: Algorithm) -> Validation {
        let mut validation = Validation::new(alg);
        validation.leeway = self.settings.leeway_seconds;
        validation.set_required_spec_claims(&["exp", "sub"]);

        if let Some(issuer) = &self.settings.issuer {
            validation.set_issuer(&[issuer]);
        }

        if self.settings.audience.is_empty() {
            validation.validate_aud = false;
        } else {
            validation.set_audience(&self.settings.audience);
        }

        validation
    }
}

#[async_trait]
impl BearerVerifier for JwksVerifier {
    async fn verify(&self, token: &str) -> Result<VerifiedToken> {
        let header = decode_header(token).map_err(|e| AuthError::invalid_token(format!("bad header: {}", e)))?;

        if !is_asymmetric(header.alg) {
            return Err(AuthError::invalid_token(format!(
                "algorithm {:?} not accepted",
                header.alg
            )));
        }

        let keys = self.keys.resolve(header.kid.as_deref()).await?;
        let jwk = keys
            .find(header.kid.as_deref())
            .ok_or_else(|| AuthError::invalid_token("no matching verification key"))?;
        let key = DecodingKey::from_jwk(jwk)
            .map_err(|e| AuthError::invalid_token(format!("unusable verification key: {}", e)))?;

        let data = decode::<SessionClaims>(token, &key, &self.validation(header.alg))?;
        let claims = data.claims;

        let subject = claims
            .subject()
            .ok_or_else(|| AuthError::invalid_token("missing subject"))?
            .to_string();
        let organization_id = claims.organization().map(String::from);

        if self.settings.require_organization_claim && organization_id.is_none() {
            return Err(AuthError::invalid_token("missing organization claim"));
        }

        Ok(VerifiedToken {
            subject,
            organization_id,
            email: claims.email,
            expires_at: claims.exp,
        })
    }
}

fn is_asymmetric(alg: Algorithm) -> bool {
    matches!(
        alg,
        Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512
            | Algorithm::ES256
            | Algorithm::ES384
            | Algorithm::EdDSA
    )
}

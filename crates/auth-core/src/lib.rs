//! # Auth-Core - Session identity and token verification for syncgate
//!
//! This crate holds what the client and the gateway agree on:
//! - the three identity transport fields and the typed [`SessionIdentity`]
//!   parsed from them
//! - the [`AuthorizedMutationContext`] handed to the sync engine
//! - bearer credential extraction and token claims
//! - the lazily fetched, atomically swapped verification key set
//! - token verification against that key set
//! - a token issuer for local development and tests

pub mod bearer;
pub mod claims;
pub mod error;
pub mod issuer;
pub mod jwks;
pub mod types;
pub mod verifier;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use bearer::BearerCredential;
pub use claims::SessionClaims;
pub use error::{AuthError, Result};
pub use issuer::{IssuerConfig, TokenIssuer};
pub use jwks::{HttpKeySetSource, KeySetCache, KeySetSettings, KeySetSource, StaticKeySetSource, VerificationKeySet};
pub use types::{
    AuthorizedMutationContext, IdentityFields, MutationAuthority, SessionIdentity, TransportFields, EMAIL_FIELD,
    JWT_FIELD, USERID_FIELD,
};
pub use verifier::{BearerVerifier, JwksVerifier, VerifiedToken, VerifierSettings};

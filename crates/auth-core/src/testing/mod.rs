//! Fixture signing keys for tests
//!
//! Enabled for this crate's own tests and, through the `test-util` feature,
//! for dependent crates.

use std::sync::OnceLock;

use jsonwebtoken::jwk::JwkSet;

use crate::issuer::TokenIssuer;

const PRIMARY_PEM: &str = include_str!("primary.pem");
const ROTATED_PEM: &str = include_str!("rotated.pem");
const FOREIGN_PEM: &str = include_str!("foreign.pem");

fn fixture(cell: &'static OnceLock<TokenIssuer>, pem: &str, kid: &str) -> TokenIssuer {
    cell.get_or_init(|| TokenIssuer::from_pem(pem, kid).expect("fixture key is a valid PKCS#8 PEM"))
        .clone()
}

/// The auth service's current signing key.
pub fn primary_issuer() -> TokenIssuer {
    static CELL: OnceLock<TokenIssuer> = OnceLock::new();
    fixture(&CELL, PRIMARY_PEM, "primary-2024")
}

/// The key the auth service rotates to.
pub fn rotated_issuer() -> TokenIssuer {
    static CELL: OnceLock<TokenIssuer> = OnceLock::new();
    fixture(&CELL, ROTATED_PEM, "rotated-2025")
}

/// A key that is never published. Signs with `primary_issuer`'s key id so
/// only the signature check can catch it.
pub fn foreign_issuer() -> TokenIssuer {
    static CELL: OnceLock<TokenIssuer> = OnceLock::new();
    fixture(&CELL, FOREIGN_PEM, "primary-2024")
}

/// Union of the issuers' published keys.
pub fn combined_key_set(issuers: &[&TokenIssuer]) -> JwkSet {
    JwkSet {
        keys: issuers.iter().map(|i| i.jwk().clone()).collect(),
    }
}

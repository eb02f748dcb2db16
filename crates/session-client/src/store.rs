//! Client-side storage of the three identity transport fields
//!
//! This plays the role a browser cookie jar plays for the web client. Every
//! write replaces all three fields at once and bumps the watch channel's
//! version, which is what the session cache keys its re-derivation on.

use std::sync::Arc;

use cookie::Cookie;
use syncgate_auth_core::{IdentityFields, TransportFields, EMAIL_FIELD, JWT_FIELD, USERID_FIELD};
use tokio::sync::watch;
use tracing::{debug, warn};

/// Outcome of applying a response's `Set-Cookie` headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CookieUpdate {
    /// All three fields were replaced.
    Replaced,
    /// All three fields were removed.
    Cleared,
    /// The response carried no identity cookies.
    Unchanged,
    /// Only some identity cookies were present, or only some were removed;
    /// nothing was written.
    Ignored,
}

/// Shared handle to the transport fields.
#[derive(Clone)]
pub struct CredentialStore {
    fields: Arc<watch::Sender<TransportFields>>,
}

impl CredentialStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(TransportFields::default());
        Self { fields: Arc::new(tx) }
    }

    /// Store pre-populated with a logged-in identity.
    pub fn with_fields(fields: IdentityFields) -> Self {
        let store = Self::new();
        store.write(fields);
        store
    }

    /// Replace all three fields.
    pub fn write(&self, fields: IdentityFields) {
        self.fields.send_replace(fields.into());
    }

    /// Clear all three fields (logout).
    pub fn clear(&self) {
        self.write(IdentityFields::cleared());
    }

    pub fn snapshot(&self) -> TransportFields {
        self.fields.borrow().clone()
    }

    /// The current bearer token, if any.
    pub fn token(&self) -> Option<String> {
        self.fields.borrow().jwt.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<TransportFields> {
        self.fields.subscribe()
    }

    /// `Cookie` request header carrying whichever fields are set.
    pub fn cookie_header(&self) -> Option<String> {
        let fields = self.fields.borrow();
        let pairs: Vec<String> = [USERID_FIELD, EMAIL_FIELD, JWT_FIELD]
            .into_iter()
            .filter_map(|name| fields.get(name).map(|value| Cookie::new(name, value).encoded().to_string()))
            .collect();

        (!pairs.is_empty()).then(|| pairs.join("; "))
    }

    /// Apply `Set-Cookie` header values from a gateway response.
    ///
    /// The identity cookies are only committed when all three arrive
    /// together; a partial set is dropped so the fields never disagree.
    pub fn apply_set_cookies<'a, I>(&self, values: I) -> CookieUpdate
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut userid = None;
        let mut email = None;
        let mut jwt = None;

        for raw in values {
            let cookie = match Cookie::parse_encoded(raw) {
                Ok(cookie) => cookie,
                Err(e) => {
                    debug!(error = %e, "Skipping unparseable Set-Cookie header");
                    continue;
                }
            };

            let removed = cookie.value().is_empty()
                || cookie
                    .max_age()
                    .is_some_and(|age| age.is_zero() || age.is_negative());
            let value = if removed {
                String::new()
            } else {
                cookie.value().to_string()
            };

            match cookie.name() {
                USERID_FIELD => userid = Some(value),
                EMAIL_FIELD => email = Some(value),
                JWT_FIELD => jwt = Some(value),
                _ => {}
            }
        }

        match (userid, email, jwt) {
            (None, None, None) => CookieUpdate::Unchanged,
            (Some(userid), Some(email), Some(jwt)) => {
                let removed = [&userid, &email, &jwt].iter().filter(|v| v.is_empty()).count();
                match removed {
                    0 => {
                        self.write(IdentityFields::new(userid, email, jwt));
                        CookieUpdate::Replaced
                    }
                    3 => {
                        self.clear();
                        CookieUpdate::Cleared
                    }
                    _ => {
                        warn!(removed, "Ignoring identity cookie update that removes only some fields");
                        CookieUpdate::Ignored
                    }
                }
            }
            (userid, email, jwt) => {
                warn!(
                    userid = userid.is_some(),
                    email = email.is_some(),
                    jwt = jwt.is_some(),
                    "Ignoring partial identity cookie update"
                );
                CookieUpdate::Ignored
            }
        }
    }
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

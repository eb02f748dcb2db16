//! Identity types shared by the client and the gateway

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Transport field carrying the user id.
pub const USERID_FIELD: &str = "userid";
/// Transport field carrying the user's email.
pub const EMAIL_FIELD: &str = "email";
/// Transport field carrying the bearer token.
pub const JWT_FIELD: &str = "jwt";

/// The three identity fields exactly as held by the transport.
///
/// Nothing here is trusted; [`SessionIdentity::from_fields`] is the only way
/// to turn it into an identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportFields {
    pub userid: Option<String>,
    pub email: Option<String>,
    pub jwt: Option<String>,
}

impl TransportFields {
    /// Look up a field by its transport name.
    pub fn get(&self, name: &str) -> Option<&str> {
        match name {
            USERID_FIELD => self.userid.as_deref(),
            EMAIL_FIELD => self.email.as_deref(),
            JWT_FIELD => self.jwt.as_deref(),
            _ => None,
        }
    }
}

impl From<IdentityFields> for TransportFields {
    fn from(fields: IdentityFields) -> Self {
        let keep = |value: String| (!value.is_empty()).then_some(value);
        Self {
            userid: keep(fields.userid),
            email: keep(fields.email),
            jwt: keep(fields.jwt),
        }
    }
}

/// A complete write of the three transport fields.
///
/// Writers can only express "set all three" or "clear all three"; there is
/// no way to build a partial update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityFields {
    userid: String,
    email: String,
    jwt: String,
}

impl IdentityFields {
    pub fn new(userid: impl Into<String>, email: impl Into<String>, jwt: impl Into<String>) -> Self {
        Self {
            userid: userid.into(),
            email: email.into(),
            jwt: jwt.into(),
        }
    }

    /// The logout write.
    pub fn cleared() -> Self {
        Self::new("", "", "")
    }

    pub fn is_cleared(&self) -> bool {
        self.userid.is_empty() && self.email.is_empty() && self.jwt.is_empty()
    }

    pub fn userid(&self) -> &str {
        &self.userid
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn jwt(&self) -> &str {
        &self.jwt
    }

    /// `(name, value)` pairs in transport order.
    pub fn entries(&self) -> [(&'static str, &str); 3] {
        [
            (USERID_FIELD, self.userid.as_str()),
            (EMAIL_FIELD, self.email.as_str()),
            (JWT_FIELD, self.jwt.as_str()),
        ]
    }
}

/// Identity derived from the transport fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionIdentity {
    #[serde(rename = "userID")]
    pub user_id: String,
    pub email: String,
    /// Empty when the active organization is unknown.
    #[serde(default, rename = "organizationID")]
    pub organization_id: String,
    /// May be stale or empty; the token is refreshed on demand.
    #[serde(default)]
    pub raw_token: String,
}

impl SessionIdentity {
    /// Parse the transport fields into an identity.
    ///
    /// Returns `None` when logged out (neither user id nor email set) and
    /// also when the fields are inconsistent or malformed. The organization
    /// id is taken only from `organization_id`, never invented.
    pub fn from_fields(fields: &TransportFields, organization_id: Option<&str>) -> Option<Self> {
        let user_id = non_empty(fields.userid.as_deref());
        let email = non_empty(fields.email.as_deref());

        let (user_id, email) = match (user_id, email) {
            (None, None) => return None,
            (Some(user_id), Some(email)) => (user_id, email),
            (user_id, email) => {
                warn!(
                    has_userid = user_id.is_some(),
                    has_email = email.is_some(),
                    "Partial identity fields, treating session as absent"
                );
                return None;
            }
        };

        if !is_clean(user_id) || !is_clean(email) || !email.contains('@') {
            warn!("Malformed identity fields, treating session as absent");
            return None;
        }

        let raw_token = match non_empty(fields.jwt.as_deref()) {
            Some(token) if is_clean(token) => token.to_string(),
            Some(_) => {
                warn!("Malformed token field, treating session as absent");
                return None;
            }
            None => String::new(),
        };

        Some(Self {
            user_id: user_id.to_string(),
            email: email.to_string(),
            organization_id: non_empty(organization_id).unwrap_or_default().to_string(),
            raw_token,
        })
    }

    pub fn is_present(&self) -> bool {
        !self.user_id.is_empty() && !self.email.is_empty()
    }

    pub fn has_token(&self) -> bool {
        !self.raw_token.is_empty()
    }
}

/// Verified caller context handed to the mutation processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizedMutationContext {
    pub subject: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
}

impl AuthorizedMutationContext {
    pub fn new(subject: impl Into<String>, organization_id: Option<String>) -> Self {
        Self {
            subject: subject.into(),
            organization_id,
        }
    }
}

/// `None` is the anonymous caller.
pub type MutationAuthority = Option<AuthorizedMutationContext>;

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn is_clean(value: &str) -> bool {
    !value.chars().any(char::is_control)
}

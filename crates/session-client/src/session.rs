//! Session cache
//!
//! Derives the typed [`SessionIdentity`] from the credential store. The
//! derived value is memoised and thrown away whenever the store publishes a
//! new version or the active organization changes, so a read never returns
//! an identity built from fields that have since been replaced.

use parking_lot::Mutex;
use syncgate_auth_core::{SessionIdentity, TransportFields};
use tokio::sync::watch;

use crate::store::CredentialStore;

struct CacheState {
    fields: watch::Receiver<TransportFields>,
    organization_id: Option<String>,
    derived: Option<SessionIdentity>,
    stale: bool,
}

/// Current identity as seen by the client.
pub struct SessionCache {
    store: CredentialStore,
    state: Mutex<CacheState>,
}

impl SessionCache {
    pub fn new(store: CredentialStore) -> Self {
        let fields = store.subscribe();
        Self {
            store,
            state: Mutex::new(CacheState {
                fields,
                organization_id: None,
                derived: None,
                stale: true,
            }),
        }
    }

    /// The current identity, or `None` when logged out.
    pub fn read(&self) -> Option<SessionIdentity> {
        let mut state = self.state.lock();

        // The sender lives in the store we hold, so `has_changed` cannot fail.
        if state.stale || state.fields.has_changed().unwrap_or(true) {
            let fields = state.fields.borrow_and_update().clone();
            state.derived = SessionIdentity::from_fields(&fields, state.organization_id.as_deref());
            state.stale = false;
        }

        state.derived.clone()
    }

    /// Active organization reported by the auth session. Not part of the
    /// transport fields, so it has to be supplied separately.
    pub fn set_active_organization(&self, organization_id: Option<String>) {
        let mut state = self.state.lock();
        if state.organization_id != organization_id {
            state.organization_id = organization_id;
            state.stale = true;
        }
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }
}

//! # Session-Client
//!
//! Client-resident half of syncgate:
//! - [`CredentialStore`] holds the three identity transport fields
//! - [`SessionCache`] derives the typed identity from them
//! - [`RefreshCoordinator`] hands tokens to the sync engine client and
//!   coalesces concurrent refreshes into one call
//! - [`MutationClient`] pushes mutations with a single refresh-and-retry

pub mod config;
pub mod coordinator;
pub mod error;
pub mod mutations;
pub mod refresher;
pub mod session;
pub mod store;

pub use config::ClientConfig;
pub use coordinator::{InvalidationHint, RefreshCoordinator, Refresher, TokenProvider};
pub use error::{ClientError, Result};
pub use mutations::MutationClient;
pub use refresher::HttpRefresher;
pub use session::SessionCache;
pub use store::{CookieUpdate, CredentialStore};

use std::sync::Arc;

/// Wire the client components against one gateway.
pub struct SessionClient {
    pub store: CredentialStore,
    pub session: Arc<SessionCache>,
    pub tokens: Arc<RefreshCoordinator>,
    pub mutations: MutationClient,
}

impl SessionClient {
    pub fn new(config: &ClientConfig, store: CredentialStore) -> Result<Self> {
        let refresher = Arc::new(HttpRefresher::new(config, store.clone())?);
        let tokens = Arc::new(RefreshCoordinator::new(refresher, store.clone()));
        let mutations = MutationClient::new(config, tokens.clone())?;

        Ok(Self {
            session: Arc::new(SessionCache::new(store.clone())),
            store,
            tokens,
            mutations,
        })
    }
}

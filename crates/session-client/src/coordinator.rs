//! Token refresh coordinator
//!
//! Supplies the sync engine client with a bearer token. A plain request is
//! answered from the credential store without any I/O. A request carrying
//! the invalid-token hint triggers a refresh, and every caller that asks
//! while that refresh is running awaits the same shared future instead of
//! starting another one. The slot is cleared once the refresh settles so the
//! next invalidation starts fresh.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::store::CredentialStore;
use crate::{ClientError, Result};

/// Why the caller wants a new token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvalidationHint {
    /// The server rejected the current token.
    InvalidToken,
}

impl InvalidationHint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidToken => "invalid-token",
        }
    }
}

impl fmt::Display for InvalidationHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvalidationHint {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "invalid-token" => Ok(Self::InvalidToken),
            other => Err(ClientError::config(format!("unknown invalidation hint: {}", other))),
        }
    }
}

/// Token callback consumed by the sync engine client.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn get_token(&self, hint: Option<InvalidationHint>) -> Option<String>;
}

/// Performs one refresh round trip. The refreshed fields land in the
/// credential store through the transport, not through the coordinator.
#[async_trait]
pub trait Refresher: Send + Sync {
    async fn refresh(&self) -> Result<()>;
}

type SharedRefresh = Shared<BoxFuture<'static, Option<String>>>;
type RefreshSlot = Arc<Mutex<Option<(u64, SharedRefresh)>>>;

/// Single-flight token refresh.
///
/// The refresh runs on its own task, so it completes and clears its slot
/// even when every caller waiting on it has been dropped.
pub struct RefreshCoordinator {
    refresher: Arc<dyn Refresher>,
    store: CredentialStore,
    in_flight: RefreshSlot,
    generation: AtomicU64,
    refreshes: Arc<AtomicU64>,
}

impl RefreshCoordinator {
    pub fn new(refresher: Arc<dyn Refresher>, store: CredentialStore) -> Self {
        Self {
            refresher,
            store,
            in_flight: Arc::new(Mutex::new(None)),
            generation: AtomicU64::new(0),
            refreshes: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Number of refresh calls actually issued.
    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::SeqCst)
    }

    pub fn is_refreshing(&self) -> bool {
        self.in_flight.lock().is_some()
    }

    async fn refresh_shared(&self) -> Option<String> {
        let refresh = {
            let mut slot = self.in_flight.lock();
            match slot.as_ref() {
                Some((_, refresh)) => {
                    debug!("Joining in-flight token refresh");
                    refresh.clone()
                }
                None => {
                    let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
                    let refresh = self.spawn_refresh(generation);
                    *slot = Some((generation, refresh.clone()));
                    refresh
                }
            }
        };

        refresh.await
    }

    /// Start a refresh task. The caller must hold the slot lock and store the
    /// returned handle under `generation` before releasing it.
    fn spawn_refresh(&self, generation: u64) -> SharedRefresh {
        let refresher = self.refresher.clone();
        let store = self.store.clone();
        let refreshes = self.refreshes.clone();
        let slot = self.in_flight.clone();

        let task = tokio::spawn(async move {
            let token = Self::run_refresh(refresher, store, refreshes).await;

            let mut slot = slot.lock();
            if matches!(slot.as_ref(), Some((current, _)) if *current == generation) {
                *slot = None;
            }

            token
        });

        task.map(|joined| {
            joined.unwrap_or_else(|e| {
                warn!(error = %e, "Token refresh task did not complete");
                None
            })
        })
        .boxed()
        .shared()
    }

    async fn run_refresh(
        refresher: Arc<dyn Refresher>,
        store: CredentialStore,
        refreshes: Arc<AtomicU64>,
    ) -> Option<String> {
        refreshes.fetch_add(1, Ordering::SeqCst);

        match refresher.refresh().await {
            Ok(()) => {
                let token = store.token();
                if token.is_some() {
                    info!("Refreshed session token");
                } else {
                    warn!("Refresh succeeded but no token is stored");
                }
                token
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed");
                None
            }
        }
    }
}

#[async_trait]
impl TokenProvider for RefreshCoordinator {
    async fn get_token(&self, hint: Option<InvalidationHint>) -> Option<String> {
        match hint {
            None => self.store.token(),
            Some(InvalidationHint::InvalidToken) => self.refresh_shared().await,
        }
    }
}

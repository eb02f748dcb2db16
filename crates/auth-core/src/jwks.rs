//! Verification key set fetching and caching
//!
//! The cache is lazy: nothing is fetched until the first token needs
//! checking. Readers always work on an immutable snapshot; a refresh builds
//! a new [`VerificationKeySet`] and swaps the reference, so a verification
//! that is already running keeps the keys it started with.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use jsonwebtoken::jwk::{Jwk, JwkSet};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{AuthError, Result};

/// Published public keys used to check token signatures.
#[derive(Debug, Clone)]
pub struct VerificationKeySet {
    set: JwkSet,
}

impl VerificationKeySet {
    pub fn new(set: JwkSet) -> Self {
        Self { set }
    }

    /// Key for a token header's `kid`. A token without a `kid` is only
    /// accepted when the set holds exactly one key.
    pub fn find(&self, kid: Option<&str>) -> Option<&Jwk> {
        match kid {
            Some(kid) => self.set.find(kid),
            None if self.set.keys.len() == 1 => self.set.keys.first(),
            None => None,
        }
    }

    pub fn contains(&self, kid: &str) -> bool {
        self.set.find(kid).is_some()
    }

    pub fn key_ids(&self) -> Vec<&str> {
        self.set
            .keys
            .iter()
            .filter_map(|k| k.common.key_id.as_deref())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.set.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.keys.is_empty()
    }
}

/// Where key sets come from.
#[async_trait]
pub trait KeySetSource: Send + Sync {
    async fn fetch(&self) -> Result<JwkSet>;
}

/// Fetches the key set the auth service publishes.
pub struct HttpKeySetSource {
    client: reqwest::Client,
    url: String,
}

impl HttpKeySetSource {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl KeySetSource for HttpKeySetSource {
    async fn fetch(&self) -> Result<JwkSet> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?;

        response
            .json::<JwkSet>()
            .await
            .map_err(|e| AuthError::key_set_unavailable(format!("undecodable key set: {}", e)))
    }
}

/// A fixed key set, for local development and tests.
pub struct StaticKeySetSource {
    set: JwkSet,
}

impl StaticKeySetSource {
    pub fn new(set: JwkSet) -> Self {
        Self { set }
    }
}

#[async_trait]
impl KeySetSource for StaticKeySetSource {
    async fn fetch(&self) -> Result<JwkSet> {
        Ok(self.set.clone())
    }
}

/// Key set cache tuning.
#[derive(Debug, Clone)]
pub struct KeySetSettings {
    /// Age after which the next request refetches.
    pub ttl: Duration,
    /// Upper bound on a single fetch.
    pub fetch_timeout: Duration,
    /// Minimum spacing between fetch attempts (unknown `kid`, failures).
    pub min_refetch_interval: Duration,
}

impl Default for KeySetSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            fetch_timeout: Duration::from_secs(5),
            min_refetch_interval: Duration::from_secs(30),
        }
    }
}

struct CachedKeySet {
    keys: Arc<VerificationKeySet>,
    fetched_at: Instant,
    attempted_at: Instant,
}

/// Lazily fetched, atomically swapped key set.
///
/// With no set cached, a failed fetch is shared by every request that was
/// queued behind it, and the next attempt waits out `min_refetch_interval`.
pub struct KeySetCache {
    source: Arc<dyn KeySetSource>,
    settings: KeySetSettings,
    current: ArcSwapOption<CachedKeySet>,
    refresh_lock: Mutex<()>,
    fetches: AtomicU64,
    failures: AtomicU64,
    failed_at: ArcSwapOption<Instant>,
}

impl KeySetCache {
    pub fn new(source: Arc<dyn KeySetSource>, settings: KeySetSettings) -> Self {
        Self {
            source,
            settings,
            current: ArcSwapOption::empty(),
            refresh_lock: Mutex::new(()),
            fetches: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            failed_at: ArcSwapOption::empty(),
        }
    }

    /// Key set to verify a token with the given `kid`.
    ///
    /// An unknown `kid` triggers one refetch (rate limited) so rotated keys
    /// are picked up without waiting for the TTL.
    pub async fn resolve(&self, kid: Option<&str>) -> Result<Arc<VerificationKeySet>> {
        let snapshot = self.current.load_full();

        let cached = match &snapshot {
            Some(cached) if self.is_usable(cached) => cached.clone(),
            _ => self.refresh(snapshot).await?,
        };

        match kid {
            Some(kid) if !cached.keys.contains(kid) && self.may_attempt(&cached) => {
                debug!(kid, "Unknown key id, refetching verification key set");
                Ok(self.refresh(Some(cached)).await?.keys.clone())
            }
            _ => Ok(cached.keys.clone()),
        }
    }

    /// Number of fetch attempts made against the source.
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }

    /// Drop the cached set; the next request refetches.
    pub fn invalidate(&self) {
        self.current.store(None);
    }

    fn is_usable(&self, cached: &CachedKeySet) -> bool {
        cached.fetched_at.elapsed() < self.settings.ttl || !self.may_attempt(cached)
    }

    fn may_attempt(&self, cached: &CachedKeySet) -> bool {
        cached.attempted_at.elapsed() >= self.settings.min_refetch_interval
    }

    async fn refresh(&self, seen: Option<Arc<CachedKeySet>>) -> Result<Arc<CachedKeySet>> {
        let failures_seen = self.failures.load(Ordering::SeqCst);
        let _guard = self.refresh_lock.lock().await;

        // Another task swapped the set while we waited for the lock.
        let current = self.current.load_full();
        match (&seen, &current) {
            (None, Some(current)) => return Ok(current.clone()),
            (Some(seen), Some(current)) if !Arc::ptr_eq(seen, current) => return Ok(current.clone()),
            _ => {}
        }

        if current.is_none() {
            if self.failures.load(Ordering::SeqCst) != failures_seen {
                return Err(AuthError::key_set_unavailable("key set fetch failed"));
            }
            if let Some(failed_at) = self.failed_at.load_full() {
                if failed_at.elapsed() < self.settings.min_refetch_interval {
                    debug!("Key set fetch failed recently, not retrying yet");
                    return Err(AuthError::key_set_unavailable("key set fetch failed recently"));
                }
            }
        }

        self.fetches.fetch_add(1, Ordering::Relaxed);
        let outcome = tokio::time::timeout(self.settings.fetch_timeout, self.source.fetch()).await;
        let now = Instant::now();

        let failure = match outcome {
            Ok(Ok(set)) => {
                let keys = Arc::new(VerificationKeySet::new(set));
                info!(keys = keys.len(), "Verification key set refreshed");
                let fresh = Arc::new(CachedKeySet {
                    keys,
                    fetched_at: now,
                    attempted_at: now,
                });
                self.current.store(Some(fresh.clone()));
                self.failed_at.store(None);
                return Ok(fresh);
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("fetch timed out after {:?}", self.settings.fetch_timeout),
        };

        match current {
            // Keep verifying with the last good set, but hold off the next attempt.
            Some(stale) => {
                warn!(error = %failure, "Key set refresh failed, keeping previous set");
                let kept = Arc::new(CachedKeySet {
                    keys: stale.keys.clone(),
                    fetched_at: stale.fetched_at,
                    attempted_at: now,
                });
                self.current.store(Some(kept.clone()));
                Ok(kept)
            }
            None => {
                warn!(error = %failure, "Key set unavailable");
                self.failed_at.store(Some(Arc::new(now)));
                self.failures.fetch_add(1, Ordering::SeqCst);
                Err(AuthError::key_set_unavailable(failure))
            }
        }
    }
}

use std::{
    collections::{HashMap, HashSet},
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
};

use arc_swap::ArcSwap;
use authgate_jose::{
    error::KeyConversionError,
    jwa::{self, rsa::PublicKey},
    jwk::{KeyId, KeyIdRef},
    Jwks,
};
use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::time::Instant;

use crate::{
    config::KeyCacheConfig,
    error::{JwksFetchError, KeyLookupError},
    JwksFetcher,
};

/// A public key converted from the authority's key set
///
/// Shared read-only between the cache and its callers and never mutated.
#[derive(Debug, PartialEq, Eq)]
pub struct ResolvedKey {
    kid: KeyId,
    algorithm: Option<jwa::Algorithm>,
    key: PublicKey,
}

impl ResolvedKey {
    /// The key ID the authority published this key under
    #[must_use]
    pub fn kid(&self) -> &KeyIdRef {
        &self.kid
    }

    /// The algorithm the key is restricted to, if it declares one
    #[must_use]
    pub fn algorithm(&self) -> Option<jwa::Algorithm> {
        self.algorithm
    }

    /// The RSA public key
    #[must_use]
    pub fn public_key(&self) -> &PublicKey {
        &self.key
    }
}

/// Counters describing the cache's behavior since creation or the last
/// [`clear()`](JwksKeyCache::clear)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from the cache
    pub hits: u64,
    /// Lookups that found no live key and triggered a refresh
    pub misses: u64,
    /// Fetches started
    pub refreshes: u64,
    /// Fetches that failed or timed out
    pub refresh_failures: u64,
    /// Published keys refused during conversion
    pub rejected_keys: u64,
    /// Converted keys dropped to respect the size bound
    pub evictions: u64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    refreshes: AtomicU64,
    refresh_failures: AtomicU64,
    rejected_keys: AtomicU64,
    evictions: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            refreshes: self.refreshes.load(Ordering::Relaxed),
            refresh_failures: self.refresh_failures.load(Ordering::Relaxed),
            rejected_keys: self.rejected_keys.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        for counter in [
            &self.hits,
            &self.misses,
            &self.refreshes,
            &self.refresh_failures,
            &self.rejected_keys,
            &self.evictions,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

#[derive(Debug)]
struct Entry {
    key: Arc<ResolvedKey>,
    last_used: AtomicU64,
}

/// One complete, immutable generation of the cache
#[derive(Debug, Default)]
struct KeySet {
    entries: HashMap<KeyId, Entry>,
    rejected: HashMap<KeyId, KeyConversionError>,
    fetched_at: Option<Instant>,
}

impl KeySet {
    fn is_live(&self, config: &KeyCacheConfig, now: Instant) -> bool {
        self.fetched_at
            .map_or(false, |at| now.saturating_duration_since(at) < config.ttl())
    }

    fn touch(&self, kid: &KeyIdRef, tick: u64) -> Option<Arc<ResolvedKey>> {
        self.entries.get(kid).map(|entry| {
            entry.last_used.store(tick, Ordering::Relaxed);
            Arc::clone(&entry.key)
        })
    }

    /// Converts every published key, carrying usage over from `previous`
    ///
    /// Keys in `wanted` outrank every other key when the set must be
    /// trimmed to `max_keys`; after them, the most recently used win, and
    /// never-used keys keep document order.
    fn build(
        jwks: &Jwks,
        previous: &KeySet,
        wanted: &HashSet<KeyId>,
        max_keys: usize,
        fetched_at: Instant,
    ) -> (Self, usize) {
        let mut candidates = Vec::with_capacity(jwks.len());
        let mut rejected = HashMap::new();
        let mut seen = HashSet::new();

        for (index, jwk) in jwks.keys().iter().enumerate() {
            let kid = match jwk.key_id() {
                Some(kid) => kid.to_owned(),
                None => {
                    tracing::warn!(jwks.idx = index, "skipping JWK without a key ID");
                    continue;
                }
            };

            if !seen.insert(kid.clone()) {
                tracing::warn!(jwk.kid = %kid, "skipping JWK with a duplicate key ID");
                continue;
            }

            let converted = jwk
                .signing_algorithm()
                .and_then(|alg| PublicKey::from_jwk(jwk).map(|key| (alg, key)));

            match converted {
                Ok((algorithm, key)) => {
                    let last_used = previous
                        .entries
                        .get(&kid)
                        .map_or(0, |e| e.last_used.load(Ordering::Relaxed));
                    let rank = if wanted.contains(&kid) {
                        u64::MAX
                    } else {
                        last_used
                    };

                    candidates.push((rank, index, last_used, ResolvedKey { kid, algorithm, key }));
                }
                Err(err) => {
                    let error: &(dyn std::error::Error + 'static) = &err;
                    tracing::warn!(jwk.kid = %kid, error, "skipping unusable JWK");
                    rejected.insert(kid, err);
                }
            }
        }

        let mut evicted = 0;
        if candidates.len() > max_keys {
            candidates.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
            evicted = candidates.len() - max_keys;
            for (_, _, _, key) in candidates.drain(max_keys..) {
                tracing::debug!(jwk.kid = %key.kid, "evicting least recently used key");
            }
        }

        let entries = candidates
            .into_iter()
            .map(|(_, _, last_used, key)| {
                (
                    key.kid.clone(),
                    Entry {
                        key: Arc::new(key),
                        last_used: AtomicU64::new(last_used),
                    },
                )
            })
            .collect();

        let set = Self {
            entries,
            rejected,
            fetched_at: Some(fetched_at),
        };

        (set, evicted)
    }
}

type RefreshFuture = Shared<BoxFuture<'static, Result<Arc<KeySet>, JwksFetchError>>>;

struct Inner {
    fetcher: Box<dyn JwksFetcher>,
    config: KeyCacheConfig,
    data: ArcSwap<KeySet>,
    in_flight: Mutex<Option<(u64, RefreshFuture)>>,
    flights: AtomicU64,
    wanted: Mutex<HashSet<KeyId>>,
    ticks: AtomicU64,
    counters: Counters,
}

impl fmt::Debug for Inner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Inner")
            .field("fetcher", &self.fetcher)
            .field("config", &self.config)
            .field("keys", &self.data.load().entries.len())
            .field("counters", &self.counters)
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Inner {
    async fn fetch_and_swap(&self) -> Result<Arc<KeySet>, JwksFetchError> {
        self.counters.refreshes.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("refreshing JWKS");

        let timeout = self.config.fetch_timeout();
        let fetched = tokio::time::timeout(timeout, self.fetcher.fetch()).await;

        // Lookups waiting on this flight are settled by it, whatever the outcome
        let wanted = std::mem::take(&mut *lock(&self.wanted));

        let jwks = match fetched {
            Ok(Ok(jwks)) => jwks,
            Ok(Err(err)) => {
                self.counters.refresh_failures.fetch_add(1, Ordering::Relaxed);
                let error: &(dyn std::error::Error + 'static) = &err;
                tracing::warn!(error, "JWKS refresh failed; keeping current keys");
                return Err(err);
            }
            Err(_) => {
                self.counters.refresh_failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(?timeout, "JWKS refresh timed out; keeping current keys");
                return Err(JwksFetchError::Timeout { after: timeout });
            }
        };

        let previous = self.data.load();
        let (set, evicted) = KeySet::build(
            &jwks,
            &previous,
            &wanted,
            self.config.max_keys(),
            Instant::now(),
        );

        self.counters
            .rejected_keys
            .fetch_add(set.rejected.len() as u64, Ordering::Relaxed);
        self.counters
            .evictions
            .fetch_add(evicted as u64, Ordering::Relaxed);

        let set = Arc::new(set);
        self.data.store(Arc::clone(&set));

        tracing::info!(
            jwks.keys = set.entries.len(),
            jwks.rejected = set.rejected.len(),
            jwks.evicted = evicted,
            "JWKS refreshed"
        );

        Ok(set)
    }
}

/// A cache of the authorization server's signing keys
///
/// Keys from one refresh live for the configured TTL. A lookup for an
/// absent or expired key triggers one refresh and is retried once. All
/// concurrent refreshes share a single fetch, and readers only ever see a
/// complete key set.
///
/// Cloning is cheap; clones share the same keys.
#[derive(Clone, Debug)]
#[must_use]
pub struct JwksKeyCache {
    inner: Arc<Inner>,
}

impl JwksKeyCache {
    /// Constructs an empty cache over `fetcher`
    pub fn new(fetcher: impl JwksFetcher + 'static, config: KeyCacheConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                fetcher: Box::new(fetcher),
                config,
                data: ArcSwap::from_pointee(KeySet::default()),
                in_flight: Mutex::new(None),
                flights: AtomicU64::new(0),
                wanted: Mutex::new(HashSet::new()),
                ticks: AtomicU64::new(0),
                counters: Counters::default(),
            }),
        }
    }

    /// Constructs an empty cache fetching from `{base_url}/.well-known/jwks.json`
    ///
    /// # Errors
    ///
    /// The HTTP client could not be constructed.
    #[cfg(feature = "reqwest")]
    #[cfg_attr(docsrs, doc(cfg(feature = "reqwest")))]
    pub fn from_base_url(base_url: &str, config: KeyCacheConfig) -> Result<Self, reqwest::Error> {
        Ok(Self::new(
            crate::HttpJwksFetcher::from_base_url(base_url)?,
            config,
        ))
    }

    /// The configuration in effect
    pub fn config(&self) -> &KeyCacheConfig {
        &self.inner.config
    }

    /// Gets the live key published as `kid`, refreshing once if necessary
    ///
    /// # Errors
    ///
    /// The refresh failed, the key is still not published after it, or the
    /// published key could not be converted.
    pub async fn get_public_key(&self, kid: &KeyIdRef) -> Result<Arc<ResolvedKey>, KeyLookupError> {
        if let Some(key) = self.lookup(kid) {
            self.inner.counters.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(key);
        }

        self.inner.counters.misses.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(jwt.kid = %kid, "signing key not cached");

        {
            let mut wanted = lock(&self.inner.wanted);
            if wanted.len() < self.inner.config.max_keys() {
                wanted.insert(kid.to_owned());
            }
        }
        let set = self.refresh_shared().await?;

        if let Some(key) = set.touch(kid, self.next_tick()) {
            return Ok(key);
        }

        match set.rejected.get(kid) {
            Some(source) => Err(KeyLookupError::KeyConversion {
                kid: kid.to_owned(),
                source: source.clone(),
            }),
            None => Err(KeyLookupError::KeyNotFound(kid.to_owned())),
        }
    }

    /// Fetches the key set and replaces the cached keys with it
    ///
    /// The result always reflects a fetch started after this call. A fetch
    /// already underway is waited out first, since it may predate a key
    /// rotation the caller knows about. Callers refreshing at the same time
    /// share the new fetch. On failure the cached keys are left untouched.
    ///
    /// # Errors
    ///
    /// The key set could not be fetched in time.
    pub async fn refresh(&self) -> Result<(), JwksFetchError> {
        let earlier = lock(&self.inner.in_flight)
            .as_ref()
            .map(|(_, flight)| flight.clone());
        if let Some(flight) = earlier {
            let _ = flight.await;
        }

        self.refresh_shared().await.map(|_| ())
    }

    /// Drops every cached key
    pub fn invalidate(&self) {
        self.inner.data.store(Arc::new(KeySet::default()));
        tracing::debug!("JWKS cache invalidated");
    }

    /// Drops every cached key and resets [`stats()`](Self::stats)
    pub fn clear(&self) {
        self.invalidate();
        self.inner.counters.reset();
    }

    /// Number of keys currently usable without a refresh
    #[must_use]
    pub fn size(&self) -> usize {
        let set = self.inner.data.load();
        if set.is_live(&self.inner.config, Instant::now()) {
            set.entries.len()
        } else {
            0
        }
    }

    /// Counters since creation or the last [`clear()`](Self::clear)
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.inner.counters.snapshot()
    }

    #[cfg(test)]
    fn awaited_kids(&self) -> usize {
        lock(&self.inner.wanted).len()
    }

    fn next_tick(&self) -> u64 {
        self.inner.ticks.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn lookup(&self, kid: &KeyIdRef) -> Option<Arc<ResolvedKey>> {
        let set = self.inner.data.load();
        if !set.is_live(&self.inner.config, Instant::now()) {
            return None;
        }
        set.touch(kid, self.next_tick())
    }

    fn refresh_shared(&self) -> RefreshFuture {
        let mut slot = lock(&self.inner.in_flight);
        if let Some((_, flight)) = &*slot {
            return flight.clone();
        }

        let id = self.inner.flights.fetch_add(1, Ordering::Relaxed);
        let inner = Arc::clone(&self.inner);
        let flight = async move {
            let result = inner.fetch_and_swap().await;

            let mut slot = lock(&inner.in_flight);
            if matches!(&*slot, Some((current, _)) if *current == id) {
                *slot = None;
            }

            result
        }
        .boxed()
        .shared();

        *slot = Some((id, flight.clone()));
        flight
    }
}

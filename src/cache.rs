//! Two-tier cache with bounded staleness and stampede protection
//!
//! A [`Cache`] is one logical namespace over a process-wide [`LocalTier`]
//! and a shared [`SharedStore`]. Reads consult the local tier first, then
//! the store; only when a value must be (re)computed does the cache drive
//! the refresh protocol:
//!
//! - Past the cooling point (the last 15% of the TTL) a caller that supplies
//!   a recompute closure attempts an *opportunistic* refresh: one lease
//!   attempt, never waiting, every failure silently falling back to the
//!   still-fresh value.
//! - On a miss or hard expiry the refresh is *mandatory*: the caller retries
//!   lease acquisition until the lease is free or `get_timeout` elapses, and
//!   recompute failures propagate.
//!
//! The lease is a short-TTL marker in the shared store, created by atomic
//! add and never deleted; a crashed holder self-heals when it expires. Its
//! TTL is the inverse of the recompute rate, so the lease doubles as the
//! recomputation throttle.

use crate::clock::{Clock, SystemClock};
use crate::config::CacheConfig;
use crate::error::{BoxError, CacheError};
use crate::key::CompoundKey;
use crate::local::LocalTier;
use crate::store::SharedStore;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Trait for types that can be cached
pub trait Cacheable: Serialize + DeserializeOwned + Send + Sync + 'static {}
impl<T> Cacheable for T where T: Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Fraction of the TTL before hard expiry at which a fresh entry counts as
/// cooling and opportunistic refresh starts.
const COOLING_FRACTION: f64 = 0.15;

/// Interval between lease-acquisition attempts on the mandatory path.
const LEASE_RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// Shared-store envelope. The logical expiry travels with the value; the
/// store-level TTL is twice the logical TTL, so a hard-expired entry stays
/// structurally available as the stale fallback of the mandatory path.
#[derive(Deserialize)]
struct StoredEntry<V> {
    expires_at_ms: u64,
    value: V,
}

#[derive(Serialize)]
struct StoredEntryRef<'a, V> {
    expires_at_ms: u64,
    value: &'a V,
}

/// Two-tier cache for one namespace.
pub struct Cache<V: Cacheable> {
    namespace: String,
    config: CacheConfig,
    store: Arc<dyn SharedStore>,
    local: Arc<LocalTier>,
    clock: Arc<dyn Clock>,
    _value: PhantomData<fn() -> V>,
}

impl<V: Cacheable> Clone for Cache<V> {
    fn clone(&self) -> Self {
        Self {
            namespace: self.namespace.clone(),
            config: self.config.clone(),
            store: Arc::clone(&self.store),
            local: Arc::clone(&self.local),
            clock: Arc::clone(&self.clock),
            _value: PhantomData,
        }
    }
}

impl<V: Cacheable> Cache<V> {
    /// Create a cache over the given store and local tier. The local tier
    /// is shared by every cache in the process; keys are namespaced, so the
    /// same compound key in two namespaces never collides.
    pub fn new(
        namespace: impl Into<String>,
        config: CacheConfig,
        store: Arc<dyn SharedStore>,
        local: Arc<LocalTier>,
    ) -> Self {
        Self::with_clock(namespace, config, store, local, Arc::new(SystemClock))
    }

    /// Like [`Cache::new`] with an explicit time source.
    pub fn with_clock(
        namespace: impl Into<String>,
        config: CacheConfig,
        store: Arc<dyn SharedStore>,
        local: Arc<LocalTier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            config,
            store,
            local,
            clock,
            _value: PhantomData,
        }
    }

    /// The fully qualified shared-store key for a compound key, for callers
    /// that correlate cache contents with direct store inspection.
    pub fn encoded_key(&self, key: &CompoundKey) -> String {
        self.store_key(&key.encode())
    }

    fn store_key(&self, encoded: &str) -> String {
        format!("cache:{}:{}", self.namespace, encoded)
    }

    fn lease_key(&self, encoded: &str) -> String {
        format!("lease:{}:{}", self.namespace, encoded)
    }

    fn physical_ttl(&self) -> Duration {
        self.config.ttl * 2
    }

    /// Look up a value. Returns `None` when nothing unexpired is cached.
    pub async fn get(&self, key: &CompoundKey) -> Result<Option<V>, CacheError> {
        let encoded = key.encode();
        let now = self.clock.now();

        if let Some(bytes) = self.local.get(&self.namespace, &encoded, now) {
            debug!(namespace = %self.namespace, key = %encoded, "local tier hit");
            return Ok(Some(serde_json::from_slice(&bytes)?));
        }

        match self.fetch_remote(&encoded).await {
            Some(entry) if now < Duration::from_millis(entry.expires_at_ms) => {
                let expiry = Duration::from_millis(entry.expires_at_ms);
                self.populate_local(&encoded, &entry.value, expiry, now)?;
                debug!(namespace = %self.namespace, key = %encoded, "shared store hit");
                Ok(Some(entry.value))
            }
            _ => {
                debug!(namespace = %self.namespace, key = %encoded, "cache miss");
                Ok(None)
            }
        }
    }

    /// Look up a value, recomputing it with `make` when it is missing or
    /// about to expire.
    ///
    /// While the cached value is fresh but cooling, a failed or contended
    /// refresh silently serves the cached value. Once the value is missing
    /// or hard-expired, recompute errors surface as
    /// [`CacheError::Recompute`], and lease contention makes the caller
    /// wait up to `get_timeout` before it degrades to whatever is still
    /// structurally present in the store (possibly nothing).
    pub async fn get_or_compute<F, Fut>(
        &self,
        key: &CompoundKey,
        make: F,
    ) -> Result<Option<V>, CacheError>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<V, BoxError>> + Send,
    {
        let encoded = key.encode();
        let now = self.clock.now();

        if let Some(bytes) = self.local.get(&self.namespace, &encoded, now) {
            debug!(namespace = %self.namespace, key = %encoded, "local tier hit");
            return Ok(Some(serde_json::from_slice(&bytes)?));
        }

        if let Some(entry) = self.fetch_remote(&encoded).await {
            let expiry = Duration::from_millis(entry.expires_at_ms);
            if now < expiry {
                self.populate_local(&encoded, &entry.value, expiry, now)?;

                let cooling_point = expiry.saturating_sub(self.config.ttl.mul_f64(COOLING_FRACTION));
                if now >= cooling_point {
                    // Opportunistic refresh: one lease attempt, no waiting,
                    // and every failure serves the still-fresh value.
                    if self.try_acquire_lease(&encoded).await {
                        match make().await {
                            Ok(value) => match self.write(&encoded, &value).await {
                                Ok(()) => return Ok(Some(value)),
                                Err(e) => {
                                    warn!(
                                        namespace = %self.namespace, key = %encoded, error = %e,
                                        "opportunistic refresh write failed, serving cached value"
                                    );
                                }
                            },
                            Err(e) => {
                                debug!(
                                    namespace = %self.namespace, key = %encoded, error = %e,
                                    "opportunistic recompute failed, serving cached value"
                                );
                            }
                        }
                    } else {
                        debug!(namespace = %self.namespace, key = %encoded, "refresh lease busy, serving cached value");
                    }
                }
                return Ok(Some(entry.value));
            }
        }

        // Mandatory refresh: nothing fresh anywhere. Retry the lease until
        // it is free or the timeout elapses; whoever acquires it runs its
        // own recomputation rather than adopting another holder's result.
        let deadline = now + self.config.get_timeout;
        loop {
            if self.try_acquire_lease(&encoded).await {
                debug!(namespace = %self.namespace, key = %encoded, "recomputing after miss or expiry");
                let value = make().await.map_err(CacheError::Recompute)?;
                self.write(&encoded, &value).await?;
                return Ok(Some(value));
            }
            if self.clock.now() >= deadline {
                break;
            }
            tokio::time::sleep(LEASE_RETRY_INTERVAL).await;
        }

        // Timed out waiting for the lease: degrade to whatever the store
        // still holds, even past its logical expiry.
        match self.fetch_remote(&encoded).await {
            Some(entry) => {
                debug!(namespace = %self.namespace, key = %encoded, "lease wait timed out, serving stale value");
                let expiry = Duration::from_millis(entry.expires_at_ms);
                let now = self.clock.now();
                if now < expiry {
                    self.populate_local(&encoded, &entry.value, expiry, now)?;
                }
                Ok(Some(entry.value))
            }
            None => {
                debug!(namespace = %self.namespace, key = %encoded, "lease wait timed out with nothing cached");
                Ok(None)
            }
        }
    }

    /// Unconditionally store `value` under `key`.
    pub async fn set(&self, key: &CompoundKey, value: &V) -> Result<(), CacheError> {
        self.write(&key.encode(), value).await
    }

    /// Store `value` only if nothing is stored under `key` yet. Returns
    /// whether this call inserted the value.
    pub async fn add(&self, key: &CompoundKey, value: &V) -> Result<bool, CacheError> {
        let encoded = key.encode();
        let now = self.clock.now();
        let expiry = now + self.config.ttl;
        let bytes = serde_json::to_vec(&StoredEntryRef {
            expires_at_ms: expiry.as_millis() as u64,
            value,
        })?;

        let inserted = self
            .store
            .add(&self.store_key(&encoded), &bytes, self.physical_ttl())
            .await
            .map_err(CacheError::Store)?;
        if inserted {
            self.populate_local(&encoded, value, expiry, now)?;
        }
        Ok(inserted)
    }

    /// Remove `key` from the shared store. The local shadow is not forced
    /// out; it ages away within the usual staleness bound.
    pub async fn delete(&self, key: &CompoundKey) -> Result<(), CacheError> {
        self.store
            .delete(&self.encoded_key(key))
            .await
            .map_err(CacheError::Store)
    }

    /// Write an envelope to the shared store and refresh the local tier.
    async fn write(&self, encoded: &str, value: &V) -> Result<(), CacheError> {
        let now = self.clock.now();
        let expiry = now + self.config.ttl;
        let bytes = serde_json::to_vec(&StoredEntryRef {
            expires_at_ms: expiry.as_millis() as u64,
            value,
        })?;

        self.store
            .set(&self.store_key(encoded), &bytes, self.physical_ttl())
            .await
            .map_err(CacheError::Store)?;
        self.populate_local(encoded, value, expiry, now)?;
        Ok(())
    }

    /// Read and decode the store entry for `encoded`. Transient store
    /// failures and undecodable payloads both count as a miss; corrupt
    /// payloads are deleted best-effort.
    async fn fetch_remote(&self, encoded: &str) -> Option<StoredEntry<V>> {
        let store_key = self.store_key(encoded);
        let bytes = match self.store.get(&store_key).await {
            Ok(bytes) => bytes?,
            Err(e) => {
                warn!(key = %store_key, error = %e, "shared store read failed, treating as absent");
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(key = %store_key, error = %e, "corrupt shared-store entry, deleting");
                if let Err(e) = self.store.delete(&store_key).await {
                    warn!(key = %store_key, error = %e, "failed to delete corrupt entry");
                }
                None
            }
        }
    }

    /// One atomic attempt at the refresh lease. A store failure counts as
    /// "held": the opportunistic path then serves stale, the mandatory path
    /// retries.
    async fn try_acquire_lease(&self, encoded: &str) -> bool {
        let lease_key = self.lease_key(encoded);
        match self
            .store
            .add(&lease_key, b"1", self.config.lease_ttl())
            .await
        {
            Ok(acquired) => acquired,
            Err(e) => {
                warn!(key = %lease_key, error = %e, "lease acquisition failed, treating as held");
                false
            }
        }
    }

    /// Hand an independent serialized copy of `value` to the local tier.
    fn populate_local(
        &self,
        encoded: &str,
        value: &V,
        remote_expiry: Duration,
        now: Duration,
    ) -> Result<(), CacheError> {
        let bytes: Arc<[u8]> = serde_json::to_vec(value)?.into();
        self.local
            .put(&self.namespace, encoded, bytes, remote_expiry, self.config.ull, now);
        Ok(())
    }
}

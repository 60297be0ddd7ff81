//! Shared-store collaborator interface
//!
//! The shared store is an external distributed key/value service with TTL
//! and atomic-insert semantics. Values are opaque byte blobs to the store;
//! the cache layer owns serialization. [`MemoryStore`] is the in-process
//! implementation used by the test suite and by single-process deployments
//! that have no external store.

use crate::clock::Clock;
use crate::error::BoxError;
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use std::time::Duration;

/// Interface consumed from the distributed key/value collaborator.
#[async_trait]
pub trait SharedStore: Send + Sync + 'static {
    /// Fetch the raw value for `key`, or `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BoxError>;

    /// Unconditionally store `value` under `key` for `ttl`.
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), BoxError>;

    /// Store `value` only if `key` is absent. Returns whether this call
    /// inserted the value.
    async fn add(&self, key: &str, value: &[u8], ttl: Duration) -> Result<bool, BoxError>;

    /// Remove `key` if present.
    async fn delete(&self, key: &str) -> Result<(), BoxError>;
}

/// In-process [`SharedStore`] honoring TTLs against an injected clock.
pub struct MemoryStore {
    clock: Arc<dyn Clock>,
    entries: DashMap<String, (Vec<u8>, Duration)>,
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            entries: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl SharedStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BoxError> {
        let now = self.clock.now();
        if let Some(entry) = self.entries.get(key) {
            let (value, expiry) = entry.value();
            if now < *expiry {
                return Ok(Some(value.clone()));
            }
        }
        // Evict lazily so an expired entry does not block a later add.
        self.entries.remove_if(key, |_, (_, expiry)| now >= *expiry);
        Ok(None)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), BoxError> {
        let expiry = self.clock.now() + ttl;
        self.entries.insert(key.to_owned(), (value.to_vec(), expiry));
        Ok(())
    }

    async fn add(&self, key: &str, value: &[u8], ttl: Duration) -> Result<bool, BoxError> {
        let now = self.clock.now();
        match self.entries.entry(key.to_owned()) {
            Entry::Occupied(mut occupied) => {
                if now < occupied.get().1 {
                    Ok(false)
                } else {
                    occupied.insert((value.to_vec(), now + ttl));
                    Ok(true)
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert((value.to_vec(), now + ttl));
                Ok(true)
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<(), BoxError> {
        self.entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn setup() -> (Arc<ManualClock>, MemoryStore) {
        let clock = Arc::new(ManualClock::new());
        let store = MemoryStore::new(Arc::clone(&clock) as Arc<dyn Clock>);
        (clock, store)
    }

    #[tokio::test]
    async fn set_then_get_until_ttl() {
        let (clock, store) = setup();
        store.set("k", b"v", Duration::from_secs(10)).await.unwrap();

        assert_eq!(store.get("k").await.unwrap(), Some(b"v".to_vec()));

        clock.advance(Duration::from_secs(10));
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn add_is_insert_if_absent() {
        let (clock, store) = setup();
        assert!(store.add("k", b"first", Duration::from_secs(10)).await.unwrap());
        assert!(!store.add("k", b"second", Duration::from_secs(10)).await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some(b"first".to_vec()));

        // After expiry the slot opens up again.
        clock.advance(Duration::from_secs(11));
        assert!(store.add("k", b"third", Duration::from_secs(10)).await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some(b"third".to_vec()));
    }

    #[tokio::test]
    async fn delete_removes_entry() {
        let (_clock, store) = setup();
        store.set("k", b"v", Duration::from_secs(10)).await.unwrap();
        store.delete("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
        // Deleting an absent key is not an error.
        store.delete("k").await.unwrap();
    }
}

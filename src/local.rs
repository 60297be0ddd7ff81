//! Process-wide local cache tier
//!
//! One [`LocalTier`] is shared by every `Cache` instance in the process.
//! Entries are keyed by `(namespace, encoded key)` and hold the serialized
//! value, so the tier itself is value-type agnostic. An entry stays usable
//! until its local expiry: the remote entry's expiry, capped at the
//! population time plus the namespace's update latency limit. Expired
//! entries are swept out at most once per [`SWEEP_INTERVAL`].

use dashmap::DashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

/// Minimum time between two sweeps of the local tier.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
struct LocalEntry {
    bytes: Arc<[u8]>,
    local_expiry: Duration,
}

/// In-memory tier shared across all cache namespaces in the process.
#[derive(Debug, Default)]
pub struct LocalTier {
    entries: DashMap<(String, String), LocalEntry>,
    // Claim-to-sweep state. Only the claim check runs under the lock; the
    // sweep itself walks the map shard by shard without blocking readers.
    next_sweep: Mutex<Duration>,
}

impl LocalTier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialized value for `key`, if a locally fresh copy exists.
    pub fn get(&self, namespace: &str, key: &str, now: Duration) -> Option<Arc<[u8]>> {
        self.maybe_sweep(now);
        let entry = self.entries.get(&(namespace.to_owned(), key.to_owned()))?;
        if now < entry.local_expiry {
            Some(Arc::clone(&entry.bytes))
        } else {
            None
        }
    }

    /// Store a serialized value. `ull` of zero yields an already-expired
    /// local entry, so every read goes back to the shared store.
    pub fn put(
        &self,
        namespace: &str,
        key: &str,
        bytes: Arc<[u8]>,
        remote_expiry: Duration,
        ull: Duration,
        now: Duration,
    ) {
        let local_expiry = remote_expiry.min(now + ull);
        self.entries.insert(
            (namespace.to_owned(), key.to_owned()),
            LocalEntry { bytes, local_expiry },
        );
        self.maybe_sweep(now);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry. Intended for tests and process-level resets.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Remove expired entries if a sweep is due. At most one sweep runs at
    /// a time; callers that lose the claim skip it rather than wait.
    fn maybe_sweep(&self, now: Duration) {
        {
            let mut next = match self.next_sweep.try_lock() {
                Ok(guard) => guard,
                Err(_) => return,
            };
            if now < *next {
                return;
            }
            *next = now + SWEEP_INTERVAL;
        }

        let mut removed = 0usize;
        self.entries.retain(|_, entry| {
            let keep = now < entry.local_expiry;
            if !keep {
                removed += 1;
            }
            keep
        });
        if removed > 0 {
            debug!(removed, "swept expired local cache entries");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEC: Duration = Duration::from_secs(1);

    fn bytes(s: &str) -> Arc<[u8]> {
        Arc::from(s.as_bytes().to_vec().into_boxed_slice())
    }

    #[test]
    fn local_expiry_is_capped_by_ull() {
        let tier = LocalTier::new();
        // Remote entry lives until t=60, ULL is 30.
        tier.put("ns", "k", bytes("v"), 60 * SEC, 30 * SEC, Duration::ZERO);

        assert!(tier.get("ns", "k", 29 * SEC).is_some());
        assert!(tier.get("ns", "k", 30 * SEC).is_none());
    }

    #[test]
    fn local_expiry_is_capped_by_remote_expiry() {
        let tier = LocalTier::new();
        // Remote entry expires before the ULL window would.
        tier.put("ns", "k", bytes("v"), 10 * SEC, 30 * SEC, Duration::ZERO);

        assert!(tier.get("ns", "k", 9 * SEC).is_some());
        assert!(tier.get("ns", "k", 10 * SEC).is_none());
    }

    #[test]
    fn zero_ull_never_serves_locally() {
        let tier = LocalTier::new();
        tier.put("ns", "k", bytes("v"), 60 * SEC, Duration::ZERO, Duration::ZERO);
        assert!(tier.get("ns", "k", Duration::ZERO).is_none());
    }

    #[test]
    fn namespaces_do_not_collide() {
        let tier = LocalTier::new();
        tier.put("a", "k", bytes("va"), 60 * SEC, 60 * SEC, Duration::ZERO);
        tier.put("b", "k", bytes("vb"), 60 * SEC, 60 * SEC, Duration::ZERO);

        let a = tier.get("a", "k", SEC).unwrap();
        let b = tier.get("b", "k", SEC).unwrap();
        assert_eq!(&*a, b"va");
        assert_eq!(&*b, b"vb");
    }

    #[test]
    fn sweep_removes_exactly_the_expired_entries() {
        let tier = LocalTier::new();
        // First put claims the initial sweep and schedules the next one.
        tier.put("ns", "short", bytes("s"), 5 * SEC, 60 * SEC, Duration::ZERO);
        tier.put("ns", "long", bytes("l"), 600 * SEC, 600 * SEC, Duration::ZERO);
        assert_eq!(tier.len(), 2);

        // Past the sweep interval and past "short"'s expiry: the next write
        // triggers a sweep.
        let later = SWEEP_INTERVAL + 5 * SEC;
        tier.put("ns", "other", bytes("o"), later + 600 * SEC, 600 * SEC, later);

        assert_eq!(tier.len(), 2);
        assert!(tier.get("ns", "short", later).is_none());
        assert!(tier.get("ns", "long", later).is_some());
        assert!(tier.get("ns", "other", later).is_some());
    }

    #[test]
    fn sweep_does_not_rerun_within_interval() {
        let tier = LocalTier::new();
        tier.put("ns", "a", bytes("a"), 5 * SEC, 60 * SEC, Duration::ZERO);

        // "a" is expired at t=10, but the sweep already ran at t=0 and the
        // next one is not due yet; the entry lingers (reads still miss).
        tier.put("ns", "b", bytes("b"), 600 * SEC, 600 * SEC, 10 * SEC);
        assert_eq!(tier.len(), 2);
        assert!(tier.get("ns", "a", 10 * SEC).is_none());
    }
}

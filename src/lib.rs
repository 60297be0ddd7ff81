//! tiercache - Two-tier caching library with bounded staleness
//!
//! This library shields an application from the latency and load of an
//! expensive value-producing operation (a network fetch, a datastore read)
//! by caching its result under a compound key:
//! - Local tier: one process-wide in-memory map, shared by all namespaces
//! - Shared tier: a distributed key/value store (Redis, or in-process)
//!
//! The cache supports:
//! - An update latency limit (ULL) bounding how long the local tier may
//!   shadow changes made by other processes
//! - Stampede protection: a rate-limited, TTL-expiring lease serializes
//!   recomputation across processes, and stale values are served while a
//!   refresh is pending or failing
//! - Compound keys with collision-free encoding
//! - Copy isolation: callers can freely mutate values they pass in or get
//!   back without affecting what is cached
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tiercache::{BoxError, Cache, CacheConfig, CompoundKey, LocalTier, RedisStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), BoxError> {
//!     let client = redis::Client::open("redis://127.0.0.1:6379")?;
//!     let store = Arc::new(RedisStore::connect(client).await?);
//!     let local = Arc::new(LocalTier::new());
//!
//!     let config = CacheConfig::new(Duration::from_secs(60))
//!         .with_ull(Duration::from_secs(30));
//!     let maps: Cache<String> = Cache::new("maps", config, store, local);
//!
//!     let key = CompoundKey::new().part("map").part(42u64);
//!     let value = maps
//!         .get_or_compute(&key, || async {
//!             // Expensive fetch goes here.
//!             Ok::<_, BoxError>("rendered map".to_owned())
//!         })
//!         .await?;
//!     println!("{value:?}");
//!     Ok(())
//! }
//! ```

mod cache;
mod clock;
mod config;
mod error;
mod key;
mod local;
mod redis_store;
mod store;

pub use cache::{Cache, Cacheable};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::CacheConfig;
pub use error::{BoxError, CacheError};
pub use key::{CompoundKey, KeyElement};
pub use local::{LocalTier, SWEEP_INTERVAL};
pub use redis_store::RedisStore;
pub use store::{MemoryStore, SharedStore};

// Re-export async_trait for implementors of SharedStore
pub use async_trait::async_trait;

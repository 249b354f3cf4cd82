//! Key-Value Store Abstraction
//!
//! Shared state for replay detection and request throttling. Every operation
//! must be atomic per key so concurrent requests on several workers cannot
//! both observe "absent" for the same key.
//!
//! Implementations:
//! - [`MemoryKvStore`] - process-local, backed by a sharded concurrent map
//! - a Postgres-backed store lives in the `auth` crate's infra layer

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use thiserror::Error;

/// Backing store failures
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Atomic key-value operations required by the authentication pipeline
#[trait_variant::make(KvStore: Send)]
pub trait LocalKvStore {
    /// Insert `key` if it is absent (or expired).
    ///
    /// Returns `true` when this call created the key, `false` when the key
    /// was already present. `ttl = None` keeps the key until purged manually.
    async fn insert_if_absent(&self, key: &str, ttl: Option<Duration>) -> StoreResult<bool>;

    /// Atomically increment the counter at `key`, creating it at 1.
    ///
    /// The TTL is applied only when the key is created.
    async fn increment(&self, key: &str, ttl: Option<Duration>) -> StoreResult<u64>;

    /// Current counter value, `None` if absent or expired
    async fn get(&self, key: &str) -> StoreResult<Option<u64>>;

    /// Remove expired keys; returns the number removed
    async fn purge_expired(&self) -> StoreResult<u64>;
}

/// Run a store operation with an upper bound on latency
///
/// Elapsed deadlines surface as [`StoreError::Timeout`] so callers can apply
/// the same failure policy as for a broken connection.
pub async fn bounded<T, F>(limit: Duration, op: F) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    match tokio::time::timeout(limit, op).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(limit)),
    }
}

/// Spawn a background task that purges expired keys every `interval`
///
/// The first purge runs immediately. Failures are logged and retried on the
/// next tick; the task runs until the handle is aborted or the runtime stops.
pub fn spawn_purge_task<K>(store: Arc<K>, interval: Duration) -> tokio::task::JoinHandle<()>
where
    K: KvStore + Sync + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match store.purge_expired().await {
                Ok(0) => {}
                Ok(removed) => tracing::debug!(removed, "Purged expired keys"),
                Err(e) => tracing::warn!(error = %e, "Key purge failed, retrying next interval"),
            }
        }
    })
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    value: u64,
    expires_at: Option<Instant>,
}

impl Slot {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-memory store
///
/// Atomicity is per shard: the `entry` API holds the shard lock for the
/// duration of the check-and-write.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: DashMap<String, Slot>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently held (including not yet purged expired keys)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn purge_expired_sync(&self) -> u64 {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len()) as u64
    }
}

impl KvStore for MemoryKvStore {
    async fn insert_if_absent(&self, key: &str, ttl: Option<Duration>) -> StoreResult<bool> {
        let now = Instant::now();
        let fresh = Slot {
            value: 1,
            expires_at: ttl.map(|ttl| now + ttl),
        };

        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(now) {
                    occupied.insert(fresh);
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(fresh);
                Ok(true)
            }
        }
    }

    async fn increment(&self, key: &str, ttl: Option<Duration>) -> StoreResult<u64> {
        let now = Instant::now();
        let fresh = Slot {
            value: 1,
            expires_at: ttl.map(|ttl| now + ttl),
        };

        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if entry.is_expired(now) {
                    *entry = fresh;
                } else {
                    entry.value = entry.value.saturating_add(1);
                }
                Ok(entry.value)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(fresh);
                Ok(1)
            }
        }
    }

    async fn get(&self, key: &str) -> StoreResult<Option<u64>> {
        let now = Instant::now();
        Ok(self
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value))
    }

    async fn purge_expired(&self) -> StoreResult<u64> {
        Ok(self.purge_expired_sync())
    }
}

#[cfg(test)]
mod tests {
    use super::{KvStore, MemoryKvStore, StoreError, bounded, spawn_purge_task};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_insert_if_absent_only_once() {
        let store = MemoryKvStore::new();
        assert!(store.insert_if_absent("replay:a", None).await.unwrap());
        assert!(!store.insert_if_absent("replay:a", None).await.unwrap());
        assert!(store.insert_if_absent("replay:b", None).await.unwrap());
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_insert_if_absent_after_expiry() {
        let store = MemoryKvStore::new();
        let ttl = Some(Duration::from_millis(20));
        assert!(store.insert_if_absent("k", ttl).await.unwrap());
        assert!(!store.insert_if_absent("k", ttl).await.unwrap());

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(store.insert_if_absent("k", ttl).await.unwrap());
    }

    #[tokio::test]
    async fn test_increment_counts() {
        let store = MemoryKvStore::new();
        for expected in 1..=5 {
            assert_eq!(store.increment("c", None).await.unwrap(), expected);
        }
        assert_eq!(store.get("c").await.unwrap(), Some(5));
        assert_eq!(store.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = MemoryKvStore::new();
        store
            .increment("short", Some(Duration::from_millis(10)))
            .await
            .unwrap();
        store.increment("forever", None).await.unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.get("short").await.unwrap(), None);
        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_purge_task_removes_expired_keys() {
        let store = Arc::new(MemoryKvStore::new());
        store
            .insert_if_absent("replay:old", Some(Duration::from_millis(10)))
            .await
            .unwrap();
        store.insert_if_absent("replay:kept", None).await.unwrap();

        let task = spawn_purge_task(Arc::clone(&store), Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(100)).await;
        task.abort();

        assert_eq!(store.len(), 1);
        assert!(!store.insert_if_absent("replay:kept", None).await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_insert_if_absent_has_single_winner() {
        let store = Arc::new(MemoryKvStore::new());
        let mut handles = Vec::new();
        for _ in 0..32 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.insert_if_absent("replay:race", None).await.unwrap()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_bounded_maps_elapsed_deadline() {
        let result: Result<u64, StoreError> = bounded(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(1)
        })
        .await;
        assert!(matches!(result, Err(StoreError::Timeout(_))));

        let result = bounded(Duration::from_millis(100), async { Ok::<_, StoreError>(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}

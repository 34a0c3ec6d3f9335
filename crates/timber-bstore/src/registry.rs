use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::{Mutex, OwnedMutexGuard};

use timber_types::StreamId;

/// Held write lock for one stream. Dropping it releases the lock; there is no
/// explicit release call, so every exit path (commit, abort, task panic)
/// releases exactly once.
pub type StreamWriteGuard = OwnedMutexGuard<()>;

/// Per-stream exclusive write locks.
///
/// The map itself is guarded by a shared/exclusive lock: lookups for
/// different streams proceed concurrently, and only inserting a lock for a
/// never-seen stream takes the map exclusively. Creation goes through the
/// entry API under that exclusive lock, so when two tasks race to create the
/// lock for one stream, exactly one lock object wins and both tasks contend
/// on it.
///
/// Locks are never removed: the registry grows by one `Arc<Mutex>` per
/// distinct stream ever written. The keyspace is the set of live streams, so
/// this is a known, bounded leak.
pub struct WriteLockRegistry {
    locks: RwLock<HashMap<StreamId, Arc<Mutex<()>>>>,
}

impl WriteLockRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            locks: RwLock::new(HashMap::new()),
        }
    }

    /// Block the calling task until it holds the exclusive write lock for
    /// `stream`, creating the lock entry on first use.
    pub async fn acquire(&self, stream: StreamId) -> StreamWriteGuard {
        let lock = {
            let locks = self.locks.read().expect("registry lock poisoned");
            locks.get(&stream).cloned()
        };
        let lock = match lock {
            Some(lock) => lock,
            None => {
                let mut locks = self.locks.write().expect("registry lock poisoned");
                Arc::clone(locks.entry(stream).or_default())
            }
        };
        // Await outside the structural lock: a blocked writer must not stall
        // lookups for other streams.
        lock.lock_owned().await
    }

    /// Number of streams that have ever been locked.
    pub fn stream_count(&self) -> usize {
        self.locks.read().expect("registry lock poisoned").len()
    }
}

impl Default for WriteLockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    const TICK: Duration = Duration::from_millis(50);

    #[tokio::test]
    async fn second_acquire_blocks_until_release() {
        let registry = WriteLockRegistry::new();
        let stream = StreamId::new();

        let guard = registry.acquire(stream).await;
        assert!(
            timeout(TICK, registry.acquire(stream)).await.is_err(),
            "lock should be held"
        );

        drop(guard);
        assert!(timeout(TICK, registry.acquire(stream)).await.is_ok());
    }

    #[tokio::test]
    async fn distinct_streams_do_not_contend() {
        let registry = WriteLockRegistry::new();
        let _a = registry.acquire(StreamId::new()).await;
        assert!(timeout(TICK, registry.acquire(StreamId::new())).await.is_ok());
    }

    #[tokio::test]
    async fn racing_creators_share_one_lock() {
        let registry = Arc::new(WriteLockRegistry::new());
        let stream = StreamId::new();

        // All tasks race to create the lock entry for a never-seen stream;
        // mutual exclusion only holds if a single lock object wins.
        let counter = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..16 {
            let registry = Arc::clone(&registry);
            let counter = Arc::clone(&counter);
            handles.push(tokio::spawn(async move {
                let _guard = registry.acquire(stream).await;
                let inside = counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
                assert_eq!(inside, 1, "two tasks inside one stream's lock");
                tokio::task::yield_now().await;
                counter.fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(registry.stream_count(), 1);
    }

    #[tokio::test]
    async fn registry_grows_per_distinct_stream() {
        let registry = WriteLockRegistry::new();
        for _ in 0..5 {
            let _guard = registry.acquire(StreamId::new()).await;
        }
        assert_eq!(registry.stream_count(), 5);

        // Re-locking an existing stream does not grow the map.
        let stream = StreamId::new();
        let _g1 = registry.acquire(stream).await;
        drop(_g1);
        let _g2 = registry.acquire(stream).await;
        assert_eq!(registry.stream_count(), 6);
    }
}

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::trace;

use timber_types::Datablock;

/// One cached block plus its recency-list links. Links are block addresses
/// into the same map, not pointers; the cache owns every item exclusively.
struct CacheItem {
    block: Datablock,
    newer: Option<u64>,
    older: Option<u64>,
}

struct CacheInner {
    map: HashMap<u64, CacheItem>,
    /// Most recently touched entry.
    newest: Option<u64>,
    /// Least recently touched entry; evicted first.
    oldest: Option<u64>,
}

/// Bounded cache of decoded blocks with strict least-recently-used eviction.
///
/// One mutex guards the map and the recency list together. Every operation
/// under the lock is O(1) map and link work; I/O never happens while the
/// lock is held. Entries are decoded, typed blocks; raw bytes never enter
/// the cache.
pub struct BlockCache {
    inner: Mutex<CacheInner>,
    max: usize,
}

impl BlockCache {
    /// A cache holding at most `max` decoded blocks.
    pub fn new(max: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                map: HashMap::with_capacity(max.min(4096)),
                newest: None,
                oldest: None,
            }),
            max,
        }
    }

    /// Look up a block and mark it most recently used.
    pub fn get(&self, addr: u64) -> Option<Datablock> {
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        if !inner.map.contains_key(&addr) {
            return None;
        }
        inner.unlink(addr);
        inner.push_newest(addr);
        inner.map.get(&addr).map(|item| item.block.clone())
    }

    /// Insert a block at the most-recent position, evicting from the
    /// least-recent end if the capacity is exceeded. Re-inserting an existing
    /// address replaces the block and refreshes its recency.
    pub fn put(&self, addr: u64, block: Datablock) {
        if self.max == 0 {
            return;
        }
        let mut inner = self.inner.lock().expect("cache lock poisoned");

        if let Some(item) = inner.map.get_mut(&addr) {
            item.block = block;
            inner.unlink(addr);
            inner.push_newest(addr);
            return;
        }

        inner.map.insert(
            addr,
            CacheItem {
                block,
                newer: None,
                older: None,
            },
        );
        inner.push_newest(addr);

        while inner.map.len() > self.max {
            let Some(victim) = inner.evict_oldest() else {
                break;
            };
            trace!(addr = victim, "cache eviction");
        }
    }

    /// Whether an address is cached, without touching its recency.
    pub fn contains(&self, addr: u64) -> bool {
        self.inner
            .lock()
            .expect("cache lock poisoned")
            .map
            .contains_key(&addr)
    }

    /// Number of cached blocks.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("cache lock poisoned").map.len()
    }

    /// Returns `true` if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of cached blocks.
    pub fn capacity(&self) -> usize {
        self.max
    }
}

impl CacheInner {
    /// Detach an entry from the recency list, fixing its neighbors and the
    /// list ends. The entry stays in the map.
    fn unlink(&mut self, addr: u64) {
        let (newer, older) = {
            let item = self.map.get(&addr).expect("cache recency list corrupted");
            (item.newer, item.older)
        };
        match newer {
            Some(n) => {
                self.map
                    .get_mut(&n)
                    .expect("cache recency list corrupted")
                    .older = older
            }
            None => self.newest = older,
        }
        match older {
            Some(o) => {
                self.map
                    .get_mut(&o)
                    .expect("cache recency list corrupted")
                    .newer = newer
            }
            None => self.oldest = newer,
        }
    }

    /// Attach a detached (or freshly inserted) entry at the most-recent end.
    fn push_newest(&mut self, addr: u64) {
        let prev_newest = self.newest;
        {
            let item = self
                .map
                .get_mut(&addr)
                .expect("cache recency list corrupted");
            item.newer = None;
            item.older = prev_newest;
        }
        if let Some(n) = prev_newest {
            self.map
                .get_mut(&n)
                .expect("cache recency list corrupted")
                .newer = Some(addr);
        }
        self.newest = Some(addr);
        if self.oldest.is_none() {
            self.oldest = Some(addr);
        }
    }

    /// Remove and return the least recently used address.
    fn evict_oldest(&mut self) -> Option<u64> {
        let victim = self.oldest?;
        self.unlink(victim);
        self.map.remove(&victim);
        Some(victim)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use timber_types::Vectorblock;

    fn block(marker: i64) -> Datablock {
        let mut vb = Vectorblock::new();
        vb.push_point(marker, marker as f64);
        Datablock::Vector(vb)
    }

    fn marker(block: &Datablock) -> i64 {
        match block {
            Datablock::Vector(vb) => vb.times[0],
            Datablock::Core(_) => panic!("unexpected core block"),
        }
    }

    #[test]
    fn get_miss_returns_none() {
        let cache = BlockCache::new(4);
        assert!(cache.get(1).is_none());
    }

    #[test]
    fn put_then_get_roundtrip() {
        let cache = BlockCache::new(4);
        cache.put(1, block(11));
        let hit = cache.get(1).unwrap();
        assert_eq!(marker(&hit), 11);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn evicts_least_recently_used_first() {
        let cache = BlockCache::new(3);
        cache.put(1, block(1));
        cache.put(2, block(2));
        cache.put(3, block(3));

        cache.put(4, block(4));
        assert!(!cache.contains(1));
        assert!(cache.contains(2));
        assert!(cache.contains(3));
        assert!(cache.contains(4));
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn eviction_follows_strict_insert_order() {
        let cache = BlockCache::new(5);
        for addr in 1..=5 {
            cache.put(addr, block(addr as i64));
        }
        // Each new insert must displace exactly the oldest survivor.
        for addr in 6..=10 {
            cache.put(addr, block(addr as i64));
            assert!(!cache.contains(addr - 5));
            assert!(cache.contains(addr - 4));
        }
    }

    #[test]
    fn get_protects_entry_from_eviction() {
        let cache = BlockCache::new(3);
        cache.put(1, block(1));
        cache.put(2, block(2));
        cache.put(3, block(3));

        // Touch the oldest entry, then add pressure: the just-accessed entry
        // must outlive strictly older ones.
        cache.get(1).unwrap();
        cache.put(4, block(4));
        assert!(cache.contains(1));
        assert!(!cache.contains(2));

        cache.put(5, block(5));
        assert!(cache.contains(1));
        assert!(!cache.contains(3));
    }

    #[test]
    fn reinsert_replaces_block_and_refreshes_recency() {
        let cache = BlockCache::new(2);
        cache.put(1, block(10));
        cache.put(2, block(20));

        cache.put(1, block(99));
        assert_eq!(cache.len(), 2);

        // Address 2 is now the oldest.
        cache.put(3, block(30));
        assert!(!cache.contains(2));
        assert_eq!(marker(&cache.get(1).unwrap()), 99);
    }

    #[test]
    fn capacity_is_never_exceeded() {
        let cache = BlockCache::new(4);
        for addr in 0..100 {
            cache.put(addr, block(addr as i64));
        }
        assert_eq!(cache.len(), 4);
        assert_eq!(cache.capacity(), 4);
    }

    #[test]
    fn single_slot_cache() {
        let cache = BlockCache::new(1);
        cache.put(1, block(1));
        cache.put(2, block(2));
        assert!(!cache.contains(1));
        assert_eq!(marker(&cache.get(2).unwrap()), 2);
    }

    #[test]
    fn zero_capacity_stores_nothing() {
        let cache = BlockCache::new(0);
        cache.put(1, block(1));
        assert!(cache.is_empty());
        assert!(cache.get(1).is_none());
    }

    #[test]
    fn contains_does_not_refresh_recency() {
        let cache = BlockCache::new(2);
        cache.put(1, block(1));
        cache.put(2, block(2));

        // Peeking at 1 must not save it from eviction.
        assert!(cache.contains(1));
        cache.put(3, block(3));
        assert!(!cache.contains(1));
    }
}

use std::sync::Arc;

use tracing::{debug, info};

use timber_meta::{JournalMetaStore, MetaStore};
use timber_provider::{BufferPool, FileStorageProvider, StorageProvider};
use timber_types::{Datablock, StreamId, Superblock};

use crate::alloc::AddressAllocator;
use crate::cache::BlockCache;
use crate::config::BlockStoreConfig;
use crate::error::BstoreResult;
use crate::generation::Generation;
use crate::linker::{Linker, WriteThroughLinker};
use crate::registry::WriteLockRegistry;

/// Which superblock version to load.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VersionQuery {
    /// The highest committed version.
    Latest,
    /// One exact version.
    Exact(u64),
}

/// Components shared between the store and its live generations.
pub(crate) struct Shared {
    pub(crate) provider: Arc<dyn StorageProvider>,
    pub(crate) meta: Arc<dyn MetaStore>,
    pub(crate) cache: BlockCache,
    pub(crate) pool: BufferPool,
    pub(crate) alloc: AddressAllocator,
    pub(crate) linker: Box<dyn Linker>,
}

/// The process-wide block store: one per deployment.
///
/// Composes the write-lock registry, the block cache, the address allocator,
/// and handles to the storage provider and superblock metadata store, and
/// exposes the read/write surface the tree layer drives.
pub struct BlockStore {
    registry: WriteLockRegistry,
    shared: Arc<Shared>,
}

impl BlockStore {
    /// Open a store on local storage: a slotted block file under
    /// `config.db_path` and the superblock journal at `config.meta_path`.
    ///
    /// Must be called from within a tokio runtime (the address generator
    /// task is spawned here).
    pub fn open(config: BlockStoreConfig) -> BstoreResult<Self> {
        let provider = FileStorageProvider::open(&config.db_path)?;
        let meta = JournalMetaStore::open(&config.meta_path)?;
        info!(
            db_path = %config.db_path.display(),
            cache_max = config.cache_max,
            "block store opened"
        );
        Ok(Self::with_components(
            Arc::new(provider),
            Arc::new(meta),
            config.cache_max,
        ))
    }

    /// Assemble a store from injected collaborators, with the default
    /// write-through linker. Must be called from within a tokio runtime.
    pub fn with_components(
        provider: Arc<dyn StorageProvider>,
        meta: Arc<dyn MetaStore>,
        cache_max: usize,
    ) -> Self {
        Self::with_linker(provider, meta, cache_max, Box::new(WriteThroughLinker))
    }

    /// Assemble a store with an explicit linking algorithm.
    pub fn with_linker(
        provider: Arc<dyn StorageProvider>,
        meta: Arc<dyn MetaStore>,
        cache_max: usize,
        linker: Box<dyn Linker>,
    ) -> Self {
        Self {
            registry: WriteLockRegistry::new(),
            shared: Arc::new(Shared {
                provider,
                meta,
                cache: BlockCache::new(cache_max),
                pool: BufferPool::default(),
                alloc: AddressAllocator::standard(),
                linker,
            }),
        }
    }

    /// Obtain the write generation for a stream, blocking until the stream's
    /// write lock is free.
    ///
    /// If the stream has no committed superblock yet, the generation starts
    /// from a fresh version-0 superblock with no root; otherwise from the
    /// latest committed record.
    pub async fn obtain_generation(&self, stream: StreamId) -> BstoreResult<Generation> {
        let guard = self.registry.acquire(stream).await;

        let cur_sb = match self.shared.meta.latest(stream).await? {
            Some(record) => {
                debug!(
                    stream = %stream.short(),
                    version = record.version,
                    "superblock loaded for generation"
                );
                record.to_superblock()
            }
            None => {
                info!(stream = %stream.short(), "no superblock for stream, starting fresh");
                Superblock::fresh(stream)
            }
        };

        Ok(Generation::new(Arc::clone(&self.shared), guard, cur_sb))
    }

    /// Load a stream's superblock. `Ok(None)` means the stream (or exact
    /// version) was never committed, a normal outcome rather than an error.
    pub async fn load_superblock(
        &self,
        stream: StreamId,
        query: VersionQuery,
    ) -> BstoreResult<Option<Superblock>> {
        let record = match query {
            VersionQuery::Latest => self.shared.meta.latest(stream).await?,
            VersionQuery::Exact(version) => self.shared.meta.at(stream, version).await?,
        };
        Ok(record.map(|r| r.to_superblock()))
    }

    /// Read the block at `addr`, restamping it with the addressing context
    /// supplied by tree navigation (the stored payload is not
    /// self-describing).
    ///
    /// Checks the cache first; on a miss the block is read through the
    /// provider into a pooled scratch buffer, decoded by type tag, cached,
    /// and returned. An unrecognized tag is a fatal decode error.
    pub fn read_datablock(
        &self,
        addr: u64,
        version: u64,
        point_width: u8,
        start_time: i64,
    ) -> BstoreResult<Datablock> {
        if let Some(block) = self.shared.cache.get(addr) {
            return Ok(block);
        }

        let mut scratch = self.shared.pool.acquire();
        let n = match self.shared.provider.read(addr, &mut scratch) {
            Ok(n) => n,
            Err(e) => {
                self.shared.pool.release(scratch);
                return Err(e.into());
            }
        };
        let decoded = Datablock::decode(&scratch[..n]);
        self.shared.pool.release(scratch);

        let mut block = decoded?;
        block.stamp(addr, version, point_width, start_time);
        self.shared.cache.put(addr, block.clone());
        Ok(block)
    }

    /// Mark superblock versions in `[start, end)` as unlinked for a later
    /// offline reclamation pass. The records stay loadable by exact version.
    /// Returns how many were newly marked.
    pub async fn unlink_generations(
        &self,
        stream: StreamId,
        start: u64,
        end: u64,
    ) -> BstoreResult<u64> {
        let marked = self.shared.meta.mark_unlinked(stream, start, end).await?;
        info!(stream = %stream.short(), start, end, marked, "generations unlinked");
        Ok(marked)
    }

    /// Remove every superblock record for a stream. Administrative/debug
    /// operation; block data is untouched. Returns how many records were
    /// removed.
    pub async fn purge_stream(&self, stream: StreamId) -> BstoreResult<u64> {
        let removed = self.shared.meta.remove_stream(stream).await?;
        info!(stream = %stream.short(), removed, "stream superblocks purged");
        Ok(removed)
    }

    /// Number of blocks currently cached.
    pub fn cache_len(&self) -> usize {
        self.shared.cache.len()
    }

    /// Cache capacity, in blocks.
    pub fn cache_capacity(&self) -> usize {
        self.shared.cache.capacity()
    }

    /// Number of streams with a registered write lock.
    pub fn stream_count(&self) -> usize {
        self.registry.stream_count()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::timeout;

    use timber_meta::InMemoryMetaStore;
    use timber_provider::MemoryStorageProvider;
    use timber_types::{BlockType, RELOCATION_BASE};

    use crate::error::BstoreError;

    fn memory_store() -> BlockStore {
        BlockStore::with_components(
            Arc::new(MemoryStorageProvider::new()),
            Arc::new(InMemoryMetaStore::new()),
            64,
        )
    }

    /// One full write pass: allocate a vector block, point the root at it,
    /// commit. Returns the root's final address.
    async fn commit_one(store: &BlockStore, stream: StreamId, marker: i64) -> u64 {
        let mut generation = store.obtain_generation(stream).await.unwrap();
        let vaddr = {
            let vblock = generation.allocate_vectorblock().await;
            vblock.push_point(marker, marker as f64);
            vblock.address
        };
        generation.update_root_addr(vaddr);
        let address_map = generation.commit().await.unwrap();
        address_map[&vaddr]
    }

    #[tokio::test]
    async fn fresh_stream_starts_at_version_zero() {
        let store = memory_store();
        let stream = StreamId::new();

        let generation = store.obtain_generation(stream).await.unwrap();
        assert_eq!(generation.current_superblock().version, 0);
        assert!(!generation.current_superblock().has_root());
        assert_eq!(generation.pending_superblock().version, 1);
    }

    #[tokio::test]
    async fn first_commit_establishes_version_one() {
        let store = memory_store();
        let stream = StreamId::new();

        let root = commit_one(&store, stream, 7).await;

        let latest = store
            .load_superblock(stream, VersionQuery::Latest)
            .await
            .unwrap()
            .expect("superblock should exist");
        assert_eq!(latest.version, 1);
        assert_eq!(latest.root, root);

        // The root resolves to a readable block.
        let block = store.read_datablock(root, 1, 36, 0).unwrap();
        let Datablock::Vector(vblock) = block else {
            panic!("root should be a vector block");
        };
        assert_eq!(vblock.times, vec![7]);
    }

    #[tokio::test]
    async fn sequential_commits_are_contiguous() {
        let store = memory_store();
        let stream = StreamId::new();

        for expected in 1..=5u64 {
            commit_one(&store, stream, expected as i64).await;
            let latest = store
                .load_superblock(stream, VersionQuery::Latest)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(latest.version, expected);
        }

        // Every version is loadable exactly once; no gaps, no duplicates.
        for version in 1..=5u64 {
            let sb = store
                .load_superblock(stream, VersionQuery::Exact(version))
                .await
                .unwrap()
                .unwrap();
            assert_eq!(sb.version, version);
        }
        assert!(store
            .load_superblock(stream, VersionQuery::Exact(6))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn double_commit_is_rejected_without_new_record() {
        let store = memory_store();
        let stream = StreamId::new();

        let mut generation = store.obtain_generation(stream).await.unwrap();
        let vaddr = generation.allocate_vectorblock().await.address;
        generation.update_root_addr(vaddr);
        generation.commit().await.unwrap();

        let err = generation.commit().await.unwrap_err();
        assert!(matches!(err, BstoreError::AlreadyCommitted));

        let latest = store
            .load_superblock(stream, VersionQuery::Latest)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.version, 1);
    }

    #[tokio::test]
    async fn commit_without_linked_root_is_a_protocol_error() {
        let store = memory_store();
        let stream = StreamId::new();

        // Allocate a block but never point the root at it: the pending root
        // stays unresolvable and the commit must fail loudly.
        let mut generation = store.obtain_generation(stream).await.unwrap();
        generation.allocate_vectorblock().await;
        let err = generation.commit().await.unwrap_err();
        assert!(matches!(err, BstoreError::RootUnresolved(_)));

        // Nothing became visible.
        assert!(store
            .load_superblock(stream, VersionQuery::Latest)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn concurrent_writers_to_one_stream_serialize() {
        let store = Arc::new(memory_store());
        let stream = StreamId::new();
        let open = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for i in 0..8i64 {
            let store = Arc::clone(&store);
            let open = Arc::clone(&open);
            handles.push(tokio::spawn(async move {
                let mut generation = store.obtain_generation(stream).await.unwrap();
                let inside = open.fetch_add(1, Ordering::SeqCst) + 1;
                assert_eq!(inside, 1, "two generations open for one stream");

                let vaddr = {
                    let vblock = generation.allocate_vectorblock().await;
                    vblock.push_point(i, i as f64);
                    vblock.address
                };
                generation.update_root_addr(vaddr);
                tokio::task::yield_now().await;

                open.fetch_sub(1, Ordering::SeqCst);
                generation.commit().await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // Eight fully serialized commits: versions 1..=8, no gaps.
        let latest = store
            .load_superblock(stream, VersionQuery::Latest)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.version, 8);
        for version in 1..=8 {
            assert!(store
                .load_superblock(stream, VersionQuery::Exact(version))
                .await
                .unwrap()
                .is_some());
        }
    }

    #[tokio::test]
    async fn writers_to_different_streams_run_in_parallel() {
        let store = memory_store();
        let held = store.obtain_generation(StreamId::new()).await.unwrap();

        // A second stream's generation must not wait on the first.
        let other = timeout(
            Duration::from_millis(100),
            store.obtain_generation(StreamId::new()),
        )
        .await
        .expect("independent stream should not block")
        .unwrap();

        drop(held);
        drop(other);
        assert_eq!(store.stream_count(), 2);
    }

    #[tokio::test]
    async fn dropping_uncommitted_generation_aborts_and_releases_lock() {
        let store = memory_store();
        let stream = StreamId::new();

        {
            let mut generation = store.obtain_generation(stream).await.unwrap();
            let vaddr = generation.allocate_vectorblock().await.address;
            generation.update_root_addr(vaddr);
            // Dropped without commit.
        }

        // The lock is free again and nothing was recorded.
        let generation = timeout(
            Duration::from_millis(100),
            store.obtain_generation(stream),
        )
        .await
        .expect("abort must release the write lock")
        .unwrap();
        assert_eq!(generation.current_superblock().version, 0);
    }

    #[tokio::test]
    async fn core_block_round_trip_with_restamping() {
        let store = memory_store();
        let stream = StreamId::new();

        let mut generation = store.obtain_generation(stream).await.unwrap();
        let vaddr = {
            let cblock = generation.allocate_coreblock().await;
            cblock.child_addrs[0] = 1234;
            cblock.child_counts[0] = 99;
            cblock.child_addrs[63] = 5678;
            cblock.address
        };
        generation.update_root_addr(vaddr);
        let address_map = generation.commit().await.unwrap();
        let root = address_map[&vaddr];

        let block = store.read_datablock(root, 1, 46, 1_700_000_000).unwrap();
        assert_eq!(block.block_type(), BlockType::Core);
        let Datablock::Core(cblock) = block else {
            unreachable!()
        };
        // Payload survives the trip; context fields come from the caller.
        assert_eq!(cblock.child_addrs[0], 1234);
        assert_eq!(cblock.child_counts[0], 99);
        assert_eq!(cblock.child_addrs[63], 5678);
        assert_eq!(cblock.address, root);
        assert_eq!(cblock.version, 1);
        assert_eq!(cblock.point_width, 46);
        assert_eq!(cblock.start_time, 1_700_000_000);
    }

    #[tokio::test]
    async fn virtual_and_final_addresses_are_disjoint() {
        let store = memory_store();
        let stream = StreamId::new();

        let mut generation = store.obtain_generation(stream).await.unwrap();
        let va = generation.allocate_vectorblock().await.address;
        let vb = generation.allocate_coreblock().await.address;
        assert!(va >= RELOCATION_BASE);
        assert!(vb >= RELOCATION_BASE);
        assert_ne!(va, vb);

        generation.update_root_addr(va);
        let address_map = generation.commit().await.unwrap();
        for (&vaddr, &addr) in &address_map {
            assert!(vaddr >= RELOCATION_BASE);
            assert!(addr < RELOCATION_BASE);
        }
    }

    #[tokio::test]
    async fn read_path_populates_cache() {
        let store = memory_store();
        let stream = StreamId::new();
        let root = commit_one(&store, stream, 3).await;
        assert_eq!(store.cache_len(), 0);

        let first = store.read_datablock(root, 1, 36, 0).unwrap();
        assert_eq!(store.cache_len(), 1);

        // The second read is served from cache and returns the same block.
        let second = store.read_datablock(root, 1, 36, 0).unwrap();
        assert_eq!(first, second);
        assert_eq!(store.cache_len(), 1);
    }

    #[tokio::test]
    async fn unknown_type_tag_is_fatal() {
        let provider = Arc::new(MemoryStorageProvider::new());
        let store = BlockStore::with_components(
            Arc::clone(&provider) as Arc<dyn StorageProvider>,
            Arc::new(InMemoryMetaStore::new()),
            64,
        );

        // Plant a payload with a tag no build understands.
        let addr = provider.allocate().unwrap();
        provider.write(addr, &[0xEE, 1, 2, 3]).unwrap();

        let err = store.read_datablock(addr, 1, 36, 0).unwrap_err();
        assert!(matches!(
            err,
            BstoreError::Type(timber_types::TypeError::UnknownBlockType(0xEE))
        ));
    }

    #[tokio::test]
    async fn unlink_marks_half_open_range() {
        let store = memory_store();
        let stream = StreamId::new();
        for marker in 1..=5i64 {
            commit_one(&store, stream, marker).await;
        }

        let marked = store.unlink_generations(stream, 2, 5).await.unwrap();
        assert_eq!(marked, 3);

        for version in 1..=5u64 {
            let sb = store
                .load_superblock(stream, VersionQuery::Exact(version))
                .await
                .unwrap()
                .expect("unlinked records stay loadable");
            assert_eq!(sb.unlinked, (2..5).contains(&version), "version {version}");
        }
    }

    #[tokio::test]
    async fn unreferenced_addresses_reach_the_record() {
        let meta = Arc::new(InMemoryMetaStore::new());
        let store = BlockStore::with_components(
            Arc::new(MemoryStorageProvider::new()),
            Arc::clone(&meta) as Arc<dyn MetaStore>,
            64,
        );
        let stream = StreamId::new();

        let mut generation = store.obtain_generation(stream).await.unwrap();
        let vaddr = generation.allocate_vectorblock().await.address;
        generation.update_root_addr(vaddr);
        generation.unreference_block(4242);
        generation.unreference_block(4243);
        generation.commit().await.unwrap();

        let record = meta.at(stream, 1).await.unwrap().unwrap();
        assert_eq!(record.unreferenced, vec![4242, 4243]);
    }

    #[tokio::test]
    async fn purge_stream_removes_all_records() {
        let store = memory_store();
        let stream = StreamId::new();
        for marker in 1..=3i64 {
            commit_one(&store, stream, marker).await;
        }

        assert_eq!(store.purge_stream(stream).await.unwrap(), 3);
        assert!(store
            .load_superblock(stream, VersionQuery::Latest)
            .await
            .unwrap()
            .is_none());

        // The stream can start over from version 0.
        let generation = store.obtain_generation(stream).await.unwrap();
        assert_eq!(generation.current_superblock().version, 0);
    }

    #[tokio::test]
    async fn open_on_disk_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let config = BlockStoreConfig::new(dir.path()).with_cache_max(16);
        let stream = StreamId::new();

        let root = {
            let store = BlockStore::open(config.clone()).unwrap();
            commit_one(&store, stream, 21).await
        };

        let store = BlockStore::open(config).unwrap();
        let latest = store
            .load_superblock(stream, VersionQuery::Latest)
            .await
            .unwrap()
            .expect("superblock must survive restart");
        assert_eq!(latest.version, 1);
        assert_eq!(latest.root, root);

        let block = store.read_datablock(root, latest.version, 36, 0).unwrap();
        let Datablock::Vector(vblock) = block else {
            panic!("root should be a vector block");
        };
        assert_eq!(vblock.times, vec![21]);

        // And the stream keeps counting from where it left off.
        let next = commit_one(&store, stream, 22).await;
        assert_ne!(next, root);
        let latest = store
            .load_superblock(stream, VersionQuery::Latest)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.version, 2);
    }
}

use std::collections::HashMap;
use std::mem;
use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use timber_meta::SuperblockRecord;
use timber_types::{Coreblock, StreamId, Superblock, Vectorblock};

use crate::error::{BstoreError, BstoreResult};
use crate::registry::StreamWriteGuard;
use crate::store::Shared;

/// One write transaction for a stream, bound to exactly one version
/// transition.
///
/// A generation owns the stream's write lock from
/// [`obtain_generation`](crate::BlockStore::obtain_generation) until
/// [`commit`](Generation::commit). Dropping it uncommitted aborts the
/// transaction: the lock is released (exactly once, on any exit path
/// including panics) and nothing becomes visible to readers.
pub struct Generation {
    cur_sb: Superblock,
    new_sb: Superblock,
    cblocks: Vec<Coreblock>,
    vblocks: Vec<Vectorblock>,
    unref_addrs: Vec<u64>,
    committed: bool,
    guard: Option<StreamWriteGuard>,
    shared: Arc<Shared>,
}

impl Generation {
    pub(crate) fn new(shared: Arc<Shared>, guard: StreamWriteGuard, cur_sb: Superblock) -> Self {
        let new_sb = cur_sb.next();
        Self {
            cur_sb,
            new_sb,
            cblocks: Vec::new(),
            vblocks: Vec::new(),
            unref_addrs: Vec::new(),
            committed: false,
            guard: Some(guard),
            shared,
        }
    }

    /// The stream this generation writes to.
    pub fn stream(&self) -> StreamId {
        self.cur_sb.stream
    }

    /// The version this generation will establish when committed.
    pub fn version(&self) -> u64 {
        self.new_sb.version
    }

    /// The superblock this generation started from.
    pub fn current_superblock(&self) -> &Superblock {
        &self.cur_sb
    }

    /// The pending successor superblock. Its version is always
    /// `current_superblock().version + 1`.
    pub fn pending_superblock(&self) -> &Superblock {
        &self.new_sb
    }

    /// Allocate a fresh core block, stamped with a virtual address and the
    /// pending version, and hand it to the caller for population. The block
    /// stays owned by this generation until commit.
    pub async fn allocate_coreblock(&mut self) -> &mut Coreblock {
        let addr = self.shared.alloc.next().await;
        let mut cblock = Coreblock::new();
        cblock.address = addr;
        cblock.version = self.new_sb.version;
        let slot = self.cblocks.len();
        self.cblocks.push(cblock);
        &mut self.cblocks[slot]
    }

    /// Allocate a fresh vector block; see [`allocate_coreblock`](Self::allocate_coreblock).
    pub async fn allocate_vectorblock(&mut self) -> &mut Vectorblock {
        let addr = self.shared.alloc.next().await;
        let mut vblock = Vectorblock::new();
        vblock.address = addr;
        vblock.version = self.new_sb.version;
        let slot = self.vblocks.len();
        self.vblocks.push(vblock);
        &mut self.vblocks[slot]
    }

    /// Record the (still-virtual) root pointer on the pending superblock.
    /// Commit resolves it to a final address through the linker's map.
    pub fn update_root_addr(&mut self, addr: u64) {
        self.new_sb.root = addr;
    }

    /// Record an address this generation stopped referencing. The list is
    /// persisted with the superblock record for a later offline reclamation
    /// pass; nothing is freed here.
    pub fn unreference_block(&mut self, addr: u64) {
        self.unref_addrs.push(addr);
    }

    /// Commit this generation: link and persist the pending blocks, durably
    /// record the new superblock, and release the stream's write lock.
    ///
    /// This is the sole point at which the new version becomes visible to
    /// readers. Returns the virtual-to-final address map from the linking pass
    /// (primarily valuable for verification and testing).
    pub async fn commit(&mut self) -> BstoreResult<HashMap<u64, u64>> {
        if self.committed {
            return Err(BstoreError::AlreadyCommitted);
        }

        let started = Instant::now();
        let address_map = self.shared.linker.link_and_store(
            self.shared.provider.as_ref(),
            &self.vblocks,
            &self.cblocks,
        )?;
        let linked = self.vblocks.len() + self.cblocks.len();
        self.vblocks = Vec::new();
        self.cblocks = Vec::new();

        let root = *address_map
            .get(&self.new_sb.root)
            .ok_or(BstoreError::RootUnresolved(self.new_sb.root))?;
        self.new_sb.root = root;

        let record = SuperblockRecord::new(&self.new_sb, mem::take(&mut self.unref_addrs));
        self.shared.meta.append(&record).await?;

        self.committed = true;
        self.guard.take();

        info!(
            elapsed_us = started.elapsed().as_micros() as u64,
            blocks = linked,
            stream = %self.new_sb.stream.short(),
            version = self.new_sb.version,
            root = self.new_sb.root,
            "generation committed"
        );
        Ok(address_map)
    }
}

#[cfg(test)]
mod tests {
    // The generation lifecycle is exercised end-to-end through `BlockStore`
    // in `store.rs`; these tests cover the invariants of the value itself.
    use super::*;
    use crate::store::test_support::test_shared;
    use crate::WriteLockRegistry;
    use timber_types::RELOCATION_BASE;

    async fn open_generation(shared: &Arc<Shared>) -> Generation {
        // The guard owns its mutex, so the registry itself need not outlive
        // the generation.
        let registry = WriteLockRegistry::new();
        let stream = StreamId::new();
        let guard = registry.acquire(stream).await;
        Generation::new(Arc::clone(shared), guard, Superblock::fresh(stream))
    }

    #[tokio::test]
    async fn pending_version_is_current_plus_one() {
        let shared = test_shared();
        let generation = open_generation(&shared).await;
        assert_eq!(generation.current_superblock().version, 0);
        assert_eq!(generation.pending_superblock().version, 1);
        assert_eq!(generation.version(), 1);
    }

    #[tokio::test]
    async fn allocated_blocks_carry_virtual_address_and_pending_version() {
        let shared = test_shared();
        let mut generation = open_generation(&shared).await;

        let first = generation.allocate_vectorblock().await.address;
        let second = generation.allocate_coreblock().await.address;
        assert!(first >= RELOCATION_BASE);
        assert!(second > first);

        let cb = generation.allocate_coreblock().await;
        assert_eq!(cb.version, 1);
    }

    #[tokio::test]
    async fn unreferenced_addresses_accumulate() {
        let shared = test_shared();
        let mut generation = open_generation(&shared).await;
        generation.unreference_block(10);
        generation.unreference_block(11);
        assert_eq!(generation.unref_addrs, vec![10, 11]);
    }
}

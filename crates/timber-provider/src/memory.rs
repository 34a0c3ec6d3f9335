use std::collections::HashMap;
use std::sync::RwLock;

use timber_types::DBSIZE;

use crate::error::{ProviderError, ProviderResult};
use crate::traits::StorageProvider;

/// In-memory, HashMap-based storage provider.
///
/// Intended for tests and embedding. Payloads are held behind a `RwLock`;
/// writes to the same address are idempotent overwrites (blocks are immutable
/// by contract, so a rewrite only happens on a retried commit).
pub struct MemoryStorageProvider {
    inner: RwLock<MemoryState>,
}

struct MemoryState {
    blocks: HashMap<u64, Vec<u8>>,
    next_addr: u64,
}

impl MemoryStorageProvider {
    /// Create a new empty provider. The first allocated address is 1.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryState {
                blocks: HashMap::new(),
                next_addr: 1,
            }),
        }
    }

    /// Number of blocks currently stored.
    pub fn len(&self) -> usize {
        self.inner.read().expect("provider lock poisoned").blocks.len()
    }

    /// Returns `true` if no blocks are stored.
    pub fn is_empty(&self) -> bool {
        self.inner
            .read()
            .expect("provider lock poisoned")
            .blocks
            .is_empty()
    }
}

impl Default for MemoryStorageProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageProvider for MemoryStorageProvider {
    fn allocate(&self) -> ProviderResult<u64> {
        let mut state = self.inner.write().expect("provider lock poisoned");
        let addr = state.next_addr;
        state.next_addr += 1;
        Ok(addr)
    }

    fn write(&self, addr: u64, payload: &[u8]) -> ProviderResult<()> {
        if payload.len() > DBSIZE - 4 {
            return Err(ProviderError::BlockTooLarge {
                len: payload.len(),
                max: DBSIZE - 4,
            });
        }
        let mut state = self.inner.write().expect("provider lock poisoned");
        if addr == 0 || addr >= state.next_addr {
            return Err(ProviderError::UnallocatedAddress(addr));
        }
        state.blocks.insert(addr, payload.to_vec());
        Ok(())
    }

    fn read(&self, addr: u64, scratch: &mut [u8]) -> ProviderResult<usize> {
        let state = self.inner.read().expect("provider lock poisoned");
        let payload = state
            .blocks
            .get(&addr)
            .ok_or(ProviderError::BlockNotFound(addr))?;
        if payload.len() > scratch.len() {
            return Err(ProviderError::ScratchTooSmall {
                scratch: scratch.len(),
                needed: payload.len(),
            });
        }
        scratch[..payload.len()].copy_from_slice(payload);
        Ok(payload.len())
    }
}

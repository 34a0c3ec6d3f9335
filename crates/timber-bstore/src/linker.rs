use std::collections::HashMap;

use timber_provider::StorageProvider;
use timber_types::{Coreblock, Vectorblock, DBSIZE};

use crate::error::BstoreResult;

/// The block-linking algorithm invoked at commit.
///
/// Linking assigns each pending block its final address, persists the
/// encoded blocks through the provider, and returns the map from the
/// virtual relocation address each block was allocated under to the final
/// address it landed at. The commit protocol resolves the pending root
/// through that map; the tree layer uses it to resolve everything else.
pub trait Linker: Send + Sync {
    fn link_and_store(
        &self,
        provider: &dyn StorageProvider,
        vblocks: &[Vectorblock],
        cblocks: &[Coreblock],
    ) -> BstoreResult<HashMap<u64, u64>>;
}

/// Default linker: allocate, encode, write through, in allocation order.
///
/// Leaves go first so interior nodes always land after their children.
/// Rewriting the child pointers inside core blocks to final addresses is the
/// real linking algorithm's concern (the tree layer supplies it); this
/// default only places blocks and reports where they went.
pub struct WriteThroughLinker;

impl Linker for WriteThroughLinker {
    fn link_and_store(
        &self,
        provider: &dyn StorageProvider,
        vblocks: &[Vectorblock],
        cblocks: &[Coreblock],
    ) -> BstoreResult<HashMap<u64, u64>> {
        let mut address_map = HashMap::with_capacity(vblocks.len() + cblocks.len());
        let mut buf = Vec::with_capacity(DBSIZE);

        for vblock in vblocks {
            let final_addr = provider.allocate()?;
            vblock.encode_into(&mut buf)?;
            provider.write(final_addr, &buf)?;
            address_map.insert(vblock.address, final_addr);
        }
        for cblock in cblocks {
            let final_addr = provider.allocate()?;
            cblock.encode_into(&mut buf)?;
            provider.write(final_addr, &buf)?;
            address_map.insert(cblock.address, final_addr);
        }

        Ok(address_map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use timber_provider::MemoryStorageProvider;
    use timber_types::{Datablock, RELOCATION_BASE};

    #[test]
    fn every_pending_block_gets_a_final_address() {
        let provider = MemoryStorageProvider::new();

        let mut vb = Vectorblock::new();
        vb.address = RELOCATION_BASE;
        vb.push_point(1, 1.0);

        let mut cb = Coreblock::new();
        cb.address = RELOCATION_BASE + 1;
        cb.child_addrs[0] = RELOCATION_BASE;

        let map = WriteThroughLinker
            .link_and_store(&provider, &[vb], &[cb])
            .unwrap();

        assert_eq!(map.len(), 2);
        for (&vaddr, &addr) in &map {
            assert!(vaddr >= RELOCATION_BASE, "key must be virtual");
            assert!(addr < RELOCATION_BASE, "value must be final");
        }
    }

    #[test]
    fn stored_blocks_decode_back() {
        let provider = MemoryStorageProvider::new();

        let mut vb = Vectorblock::new();
        vb.address = RELOCATION_BASE + 7;
        vb.push_point(42, 4.2);

        let map = WriteThroughLinker
            .link_and_store(&provider, &[vb.clone()], &[])
            .unwrap();
        let final_addr = map[&(RELOCATION_BASE + 7)];

        let mut scratch = vec![0u8; DBSIZE];
        let n = provider.read(final_addr, &mut scratch).unwrap();
        let decoded = Datablock::decode(&scratch[..n]).unwrap();
        let Datablock::Vector(out) = decoded else {
            panic!("wrong block kind");
        };
        assert_eq!(out.times, vb.times);
        assert_eq!(out.values, vb.values);
    }

    #[test]
    fn empty_link_pass_is_empty() {
        let provider = MemoryStorageProvider::new();
        let map = WriteThroughLinker
            .link_and_store(&provider, &[], &[])
            .unwrap();
        assert!(map.is_empty());
        assert!(provider.is_empty());
    }
}

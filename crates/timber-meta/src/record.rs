use serde::{Deserialize, Serialize};

use timber_types::{StreamId, Superblock};

/// The durable document appended once per commit.
///
/// Besides the superblock fields, the record carries the addresses the
/// committing generation stopped referencing, so an offline sweeper can
/// reclaim them later without rescanning the tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuperblockRecord {
    /// The stream this record belongs to.
    pub stream: StreamId,
    /// Stream version this record establishes.
    pub version: u64,
    /// Final address of the tree root as of this version.
    pub root: u64,
    /// Logically removed, pending reclamation.
    pub unlinked: bool,
    /// Addresses no longer referenced as of this version.
    #[serde(default)]
    pub unreferenced: Vec<u64>,
}

impl SuperblockRecord {
    /// Build the record for a committed superblock.
    pub fn new(superblock: &Superblock, unreferenced: Vec<u64>) -> Self {
        Self {
            stream: superblock.stream,
            version: superblock.version,
            root: superblock.root,
            unlinked: superblock.unlinked,
            unreferenced,
        }
    }

    /// The superblock view of this record.
    pub fn to_superblock(&self) -> Superblock {
        Superblock {
            stream: self.stream,
            version: self.version,
            root: self.root,
            unlinked: self.unlinked,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_mirrors_superblock() {
        let mut sb = Superblock::fresh(StreamId::new());
        sb.version = 4;
        sb.root = 17;

        let record = SuperblockRecord::new(&sb, vec![9, 10]);
        assert_eq!(record.version, 4);
        assert_eq!(record.root, 17);
        assert_eq!(record.unreferenced, vec![9, 10]);
        assert_eq!(record.to_superblock(), sb);
    }
}

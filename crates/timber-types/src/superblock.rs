use serde::{Deserialize, Serialize};

use crate::stream::StreamId;

/// Root address of a superblock whose stream has never committed a tree.
/// Storage address 0 is reserved and never allocated to a block.
pub const NO_ROOT: u64 = 0;

/// Versioned pointer from a stream to the root of its block tree.
///
/// A superblock is an immutable value: "the tree root for stream S as of
/// version G". A new one is derived from the latest via [`Superblock::next`]
/// and becomes visible to readers only once its record is durably appended at
/// commit time. Superblocks are never mutated after being recorded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Superblock {
    /// The stream this superblock belongs to.
    pub stream: StreamId,
    /// Version of the stream this superblock represents.
    pub version: u64,
    /// Address of the tree root, or [`NO_ROOT`] for a fresh stream.
    pub root: u64,
    /// Logically removed, pending reclamation by an external sweeper.
    pub unlinked: bool,
}

impl Superblock {
    /// The initial superblock for a stream with no history: version 0, no root.
    pub fn fresh(stream: StreamId) -> Self {
        Self {
            stream,
            version: 0,
            root: NO_ROOT,
            unlinked: false,
        }
    }

    /// Derive the successor superblock: same stream and root, version + 1.
    ///
    /// The commit protocol replaces the root before the successor is recorded.
    pub fn next(&self) -> Self {
        Self {
            stream: self.stream,
            version: self.version + 1,
            root: self.root,
            unlinked: false,
        }
    }

    /// Returns `true` once a committed tree root exists.
    pub fn has_root(&self) -> bool {
        self.root != NO_ROOT
    }
}

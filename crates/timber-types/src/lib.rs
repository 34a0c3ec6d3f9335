//! Foundation types for the Timberline block store.
//!
//! Timberline stores each logical time series (a *stream*) as an immutable,
//! copy-on-write tree of data blocks. This crate provides the types shared by
//! every other Timberline crate.
//!
//! # Key Types
//!
//! - [`StreamId`] — stable identifier of a logical time series
//! - [`Superblock`] — versioned pointer from a stream to its tree root
//! - [`Coreblock`] / [`Vectorblock`] — the two physical block kinds
//! - [`Datablock`] — decoded block of either kind, as returned by the read path
//! - [`BlockType`] — the one-byte wire tag distinguishing the kinds
//!
//! # Wire format
//!
//! A stored block is a single tag byte followed by the bincode encoding of the
//! block's payload fields. The addressing context (`address`, `version`,
//! `point_width`, `start_time`) is *not* part of the stored payload: the same
//! physical block can be reached from different logical positions in the tree,
//! so the read path restamps those fields from the navigation context.

pub mod block;
pub mod error;
pub mod stream;
pub mod superblock;

pub use block::{BlockType, Coreblock, Datablock, Vectorblock};
pub use error::TypeError;
pub use stream::StreamId;
pub use superblock::{Superblock, NO_ROOT};

/// Size in bytes of one storage slot, and of the pooled scratch buffers the
/// read path decodes from. An encoded block never exceeds this: a fully
/// populated vector block is just over 16 KiB on the wire.
pub const DBSIZE: usize = 32768;

/// First address handed out by the allocator. The high bit distinguishes
/// these still-virtual relocation addresses from the final addresses blocks
/// receive when the linking algorithm stores them.
pub const RELOCATION_BASE: u64 = 1 << 63;

/// Child-pointer fanout of a core block.
pub const CORE_KFACTOR: usize = 64;

/// Maximum number of points held by one vector block.
pub const VECTOR_CAPACITY: usize = 1024;

//! Block-storage core of the Timberline time-series tree database.
//!
//! Timberline stores each stream as an immutable, copy-on-write tree of data
//! blocks. This crate is the storage core beneath the tree layer: it manages
//! block addresses, caches decoded blocks, and exposes the versioned
//! per-stream write transaction (the *generation*) that makes every stream
//! single-writer, multi-reader across versions.
//!
//! # Write path
//!
//! A writer calls [`BlockStore::obtain_generation`], which acquires the
//! stream's exclusive write lock and loads (or synthesizes) the latest
//! [`Superblock`](timber_types::Superblock). The generation hands out freshly
//! allocated blocks stamped with still-virtual relocation addresses; at
//! [`Generation::commit`] the linking algorithm assigns final addresses and
//! persists the blocks, a new superblock record is durably appended, and the
//! write lock is released. Version N+1 is never visible before version N.
//!
//! Dropping an uncommitted generation aborts it: the write lock is released
//! and no record is written.
//!
//! # Read path
//!
//! [`BlockStore::read_datablock`] consults the LRU [`BlockCache`], falls
//! through to the storage provider on a miss, decodes by wire tag, restamps
//! the addressing context supplied by tree navigation, and refills the cache.
//!
//! # Concurrency model
//!
//! Writers to different streams proceed fully in parallel; writers to the
//! same stream are totally ordered by the [`WriteLockRegistry`]. The only
//! dedicated background task is the [`AddressAllocator`]'s generator loop.
//! Internal cache and registry locks guard O(1) map/pointer work and are
//! never held across I/O.

pub mod alloc;
pub mod cache;
pub mod config;
pub mod error;
pub mod generation;
pub mod linker;
pub mod registry;
pub mod store;

pub use alloc::AddressAllocator;
pub use cache::BlockCache;
pub use config::BlockStoreConfig;
pub use error::{BstoreError, BstoreResult};
pub use generation::Generation;
pub use linker::{Linker, WriteThroughLinker};
pub use registry::{StreamWriteGuard, WriteLockRegistry};
pub use store::{BlockStore, VersionQuery};

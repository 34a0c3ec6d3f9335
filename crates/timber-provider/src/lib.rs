//! Physical block storage backends for the Timberline block store.
//!
//! The block-storage core never touches the storage medium directly; it goes
//! through the [`StorageProvider`] trait. A provider hands out final block
//! addresses, persists encoded payloads, and reads them back into
//! caller-supplied scratch buffers.
//!
//! # Backends
//!
//! - [`MemoryStorageProvider`] — `HashMap`-based, for tests and embedding
//! - [`FileStorageProvider`] — one slotted data file, block `addr` at byte
//!   offset `addr * DBSIZE`
//!
//! # Design Rules
//!
//! 1. Blocks are immutable once written; providers never interpret payloads.
//! 2. Address 0 is reserved ("no root") and is never allocated.
//! 3. Allocation is strictly increasing; addresses are never recycled by the
//!    provider (reclamation is an external, offline concern).
//! 4. All I/O errors are propagated, never silently ignored.
//!
//! Decode scratch buffers are drawn from a [`BufferPool`] so the read path
//! does not allocate per block.

pub mod error;
pub mod file;
pub mod memory;
pub mod pool;
pub mod traits;

pub use error::{ProviderError, ProviderResult};
pub use file::FileStorageProvider;
pub use memory::MemoryStorageProvider;
pub use pool::BufferPool;
pub use traits::StorageProvider;

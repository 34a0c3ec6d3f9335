use async_trait::async_trait;

use timber_types::StreamId;

use crate::error::MetaResult;
use crate::record::SuperblockRecord;

/// Durable storage boundary for superblock records.
///
/// Implementations must satisfy these invariants:
/// - Records are append-only: `append` never overwrites an existing
///   `(stream, version)` pair. A retried append of an identical record is
///   accepted (idempotent); anything else is a
///   [`Duplicate`](crate::MetaError::Duplicate) error.
/// - A missing stream or version is a normal outcome (`Ok(None)`), never an
///   error; I/O failures are propagated, never retried internally.
/// - Unlinking marks records without deleting them; unlinked versions stay
///   loadable by exact version.
#[async_trait]
pub trait MetaStore: Send + Sync {
    /// The highest-version record for a stream, if any.
    async fn latest(&self, stream: StreamId) -> MetaResult<Option<SuperblockRecord>>;

    /// The record at an exact `(stream, version)`, if any.
    async fn at(&self, stream: StreamId, version: u64) -> MetaResult<Option<SuperblockRecord>>;

    /// Durably append one record.
    async fn append(&self, record: &SuperblockRecord) -> MetaResult<()>;

    /// Mark versions in `[from, until)` as unlinked. Returns how many records
    /// were newly marked.
    async fn mark_unlinked(&self, stream: StreamId, from: u64, until: u64) -> MetaResult<u64>;

    /// Remove every record for a stream. Administrative/debug operation;
    /// returns how many records were removed.
    async fn remove_stream(&self, stream: StreamId) -> MetaResult<u64>;
}

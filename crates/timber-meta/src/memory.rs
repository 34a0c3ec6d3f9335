use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;

use timber_types::StreamId;

use crate::error::{MetaError, MetaResult};
use crate::record::SuperblockRecord;
use crate::traits::MetaStore;

/// Per-stream record index keyed by version, ordered so "latest" is the
/// last entry.
pub(crate) type StreamIndex = HashMap<StreamId, BTreeMap<u64, SuperblockRecord>>;

/// In-memory superblock store for tests and embedding.
pub struct InMemoryMetaStore {
    inner: RwLock<StreamIndex>,
}

impl InMemoryMetaStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Number of records across all streams.
    pub fn len(&self) -> usize {
        self.inner
            .read()
            .expect("meta lock poisoned")
            .values()
            .map(BTreeMap::len)
            .sum()
    }

    /// Returns `true` if no records are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryMetaStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared index operations, used by both the memory and journal backends.
pub(crate) mod index_ops {
    use super::*;

    pub fn latest(index: &StreamIndex, stream: StreamId) -> Option<SuperblockRecord> {
        index
            .get(&stream)
            .and_then(|versions| versions.last_key_value())
            .map(|(_, record)| record.clone())
    }

    pub fn at(index: &StreamIndex, stream: StreamId, version: u64) -> Option<SuperblockRecord> {
        index
            .get(&stream)
            .and_then(|versions| versions.get(&version))
            .cloned()
    }

    /// Insert one record, refusing to overwrite. An identical record is an
    /// idempotent retry and is accepted.
    pub fn append(index: &mut StreamIndex, record: &SuperblockRecord) -> MetaResult<()> {
        let versions = index.entry(record.stream).or_default();
        if let Some(existing) = versions.get(&record.version) {
            if existing == record {
                return Ok(());
            }
            return Err(MetaError::Duplicate {
                stream: record.stream,
                version: record.version,
            });
        }
        versions.insert(record.version, record.clone());
        Ok(())
    }

    /// Mark `[from, until)` unlinked; returns how many were newly marked.
    pub fn mark_unlinked(index: &mut StreamIndex, stream: StreamId, from: u64, until: u64) -> u64 {
        let Some(versions) = index.get_mut(&stream) else {
            return 0;
        };
        let mut marked = 0;
        for (_, record) in versions.range_mut(from..until) {
            if !record.unlinked {
                record.unlinked = true;
                marked += 1;
            }
        }
        marked
    }

    pub fn remove_stream(index: &mut StreamIndex, stream: StreamId) -> u64 {
        index
            .remove(&stream)
            .map(|versions| versions.len() as u64)
            .unwrap_or(0)
    }
}

#[async_trait]
impl MetaStore for InMemoryMetaStore {
    async fn latest(&self, stream: StreamId) -> MetaResult<Option<SuperblockRecord>> {
        let index = self.inner.read().expect("meta lock poisoned");
        Ok(index_ops::latest(&index, stream))
    }

    async fn at(&self, stream: StreamId, version: u64) -> MetaResult<Option<SuperblockRecord>> {
        let index = self.inner.read().expect("meta lock poisoned");
        Ok(index_ops::at(&index, stream, version))
    }

    async fn append(&self, record: &SuperblockRecord) -> MetaResult<()> {
        let mut index = self.inner.write().expect("meta lock poisoned");
        index_ops::append(&mut index, record)
    }

    async fn mark_unlinked(&self, stream: StreamId, from: u64, until: u64) -> MetaResult<u64> {
        let mut index = self.inner.write().expect("meta lock poisoned");
        Ok(index_ops::mark_unlinked(&mut index, stream, from, until))
    }

    async fn remove_stream(&self, stream: StreamId) -> MetaResult<u64> {
        let mut index = self.inner.write().expect("meta lock poisoned");
        Ok(index_ops::remove_stream(&mut index, stream))
    }
}

use timber_types::StreamId;

/// Errors from superblock metadata operations.
#[derive(Debug, thiserror::Error)]
pub enum MetaError {
    /// A record for this `(stream, version)` pair already exists with
    /// different contents. Superblock records are never overwritten.
    #[error("superblock record for stream {stream} version {version} already exists")]
    Duplicate { stream: StreamId, version: u64 },

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error from the underlying backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for metadata operations.
pub type MetaResult<T> = Result<T, MetaError>;

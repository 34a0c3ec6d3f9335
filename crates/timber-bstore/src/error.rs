use timber_meta::MetaError;
use timber_provider::ProviderError;
use timber_types::TypeError;

/// Errors from block-store operations.
///
/// `AlreadyCommitted` and `RootUnresolved` are protocol violations: they
/// indicate a bug in the calling layer or in the linking algorithm, and the
/// operation that hit them must be abandoned, never patched up.
#[derive(Debug, thiserror::Error)]
pub enum BstoreError {
    /// `commit` was called on a generation that already committed.
    #[error("generation already committed")]
    AlreadyCommitted,

    /// The pending root address was absent from the linker's address map.
    #[error("root address {0:#x} not resolved by the linking pass")]
    RootUnresolved(u64),

    /// Block encode/decode failure (includes unrecognized type tags).
    #[error("block type error: {0}")]
    Type(#[from] TypeError),

    /// Storage provider failure.
    #[error("storage error: {0}")]
    Provider(#[from] ProviderError),

    /// Superblock metadata failure.
    #[error("metadata error: {0}")]
    Meta(#[from] MetaError),
}

/// Result alias for block-store operations.
pub type BstoreResult<T> = Result<T, BstoreError>;

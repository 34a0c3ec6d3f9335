/// Errors from storage provider operations.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// I/O error from the underlying medium.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The payload does not fit in one storage slot.
    #[error("block of {len} bytes exceeds slot payload capacity {max}")]
    BlockTooLarge { len: usize, max: usize },

    /// The address was never handed out by `allocate` (or is the reserved
    /// address 0).
    #[error("address {0:#x} was never allocated")]
    UnallocatedAddress(u64),

    /// The address is allocated but nothing was ever written there.
    #[error("no block stored at address {0:#x}")]
    BlockNotFound(u64),

    /// The slot contents are structurally invalid.
    #[error("corrupt slot at address {addr:#x}: {reason}")]
    CorruptSlot { addr: u64, reason: String },

    /// The caller's scratch buffer is smaller than the stored payload.
    #[error("scratch buffer of {scratch} bytes cannot hold {needed}-byte payload")]
    ScratchTooSmall { scratch: usize, needed: usize },
}

/// Result alias for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

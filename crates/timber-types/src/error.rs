/// Errors from type-level encoding and decoding.
#[derive(Debug, thiserror::Error)]
pub enum TypeError {
    /// The stored payload carried a type tag this build does not know.
    /// Stored data is either corrupt or from an incompatible format version.
    #[error("unrecognized block type tag {0:#04x}")]
    UnknownBlockType(u8),

    /// The payload was empty (not even a type tag).
    #[error("empty block payload")]
    EmptyPayload,

    /// Bincode failed to encode or decode a block payload.
    #[error("block codec error: {0}")]
    Codec(String),

    /// A stream identifier failed to parse.
    #[error("invalid stream id: {0}")]
    InvalidStreamId(String),
}

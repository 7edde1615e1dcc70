//! Codec error types

use thiserror::Error;

/// Chunk decompression error
#[derive(Debug, Error)]
pub enum CodecError {
    /// Codec id outside the known range
    #[error("unknown codec id: {0}")]
    UnknownCodec(u32),

    /// Codec id is reserved by the format but has no decoder
    #[error("unsupported codec id: {0}")]
    UnsupportedCodec(u8),

    /// Zlib chunk using a framing variant that is not implemented
    #[error("unsupported zlib framing (lead byte 0x{0:02X})")]
    UnsupportedFraming(u8),

    /// Zlib stream is malformed
    #[error("zlib inflate failed: {0}")]
    Zlib(String),

    /// LZ4 block is malformed
    #[error("LZ4 decode failed: {0}")]
    Lz4(String),

    /// LZ4 chunk shorter than its 4-byte length prefix
    #[error("LZ4 chunk is missing its length prefix ({0} bytes)")]
    MissingLengthPrefix(usize),

    /// Decoded length differs from the expected length
    #[error("decompressed length mismatch: expected {expected}, got {actual}")]
    LengthMismatch {
        /// Length announced by the chunk or required by the volume
        expected: usize,
        /// Length actually produced
        actual: usize,
    },

    /// Output buffer cannot hold the decoded chunk
    #[error("chunk needs {needed} bytes but the output buffer holds {available}")]
    OutputTooSmall {
        /// Bytes the chunk decodes to
        needed: usize,
        /// Bytes available in the output buffer
        available: usize,
    },
}

/// Result type for codec operations
pub type CodecResult<T> = Result<T, CodecError>;

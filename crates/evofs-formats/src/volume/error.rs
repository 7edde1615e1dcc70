//! Error types for volume parsing

use crate::catalog::FormatVersion;
use thiserror::Error;

/// Errors that can occur when parsing a volume header or chunk table
#[derive(Debug, Error)]
pub enum VolumeError {
    /// Magic is not `DATF`
    #[error("Invalid volume magic: 0x{0:08X}")]
    InvalidMagic(u32),

    /// Format version other than 3100 or 4300
    #[error("Unsupported volume version: {0}")]
    UnsupportedVersion(u32),

    /// Volume generation differs from the catalog's
    #[error("Volume version {volume} does not match catalog version {catalog}")]
    VersionMismatch {
        /// Volume generation
        volume: FormatVersion,
        /// Catalog generation
        catalog: FormatVersion,
    },

    /// Volume chunk size differs from the catalog's
    #[error("Volume chunk size 0x{volume:X} does not match catalog chunk size 0x{catalog:X}")]
    ChunkSizeMismatch {
        /// Chunk size in the volume header
        volume: u32,
        /// Chunk size in the catalog header
        catalog: u32,
    },

    /// Chunk size of zero
    #[error("Invalid volume chunk size 0x{0:X}")]
    InvalidChunkSize(u32),

    /// `CHNK` or `DATA` marker missing
    #[error("Missing {context} marker: found 0x{found:08X}")]
    MissingMarker {
        /// Which marker was being checked
        context: &'static str,
        /// Value read instead
        found: u32,
    },

    /// On-disk chunk larger than a logical chunk
    #[error("Chunk {index} is {size} bytes on disk, larger than the 0x{chunk_size:X} chunk size")]
    OversizedChunk {
        /// Chunk index
        index: usize,
        /// Stored size
        size: u32,
        /// Logical chunk size
        chunk_size: u32,
    },

    /// Chunk size table shorter than the declared chunk count
    #[error("Truncated chunk table: expected {expected} bytes, got {actual}")]
    TruncatedChunkTable {
        /// Bytes required for the declared chunk count
        expected: u64,
        /// Bytes available
        actual: u64,
    },

    /// Chunk index beyond the table
    #[error("Chunk index {index} out of range ({count} chunks)")]
    ChunkOutOfRange {
        /// Requested chunk
        index: usize,
        /// Chunks in the volume
        count: usize,
    },

    /// Binary parsing error
    #[error("Binary parsing error: {0}")]
    BinRw(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl VolumeError {
    /// Whether this error means the file is not a supported volume at all
    pub fn is_format_mismatch(&self) -> bool {
        matches!(
            self,
            Self::InvalidMagic(_) | Self::UnsupportedVersion(_) | Self::VersionMismatch { .. }
        )
    }
}

impl From<binrw::Error> for VolumeError {
    fn from(e: binrw::Error) -> Self {
        match e {
            binrw::Error::Io(io) => Self::Io(io),
            binrw::Error::Backtrace(bt) => Self::from(*bt.error),
            other => Self::BinRw(other.to_string()),
        }
    }
}

/// Result type alias for volume operations
pub type VolumeResult<T> = Result<T, VolumeError>;

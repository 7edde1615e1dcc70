//! Error types for catalog parsing

use thiserror::Error;

/// Errors that can occur when parsing a catalog
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Magic is neither `DATN` nor `DATX`
    #[error("Invalid catalog magic: 0x{0:08X}")]
    InvalidMagic(u32),

    /// Format version other than 3100 or 4300
    #[error("Unsupported catalog version: {0}")]
    UnsupportedVersion(u32),

    /// Codec id above the highest known id
    #[error("Invalid codec id {0} in catalog header")]
    InvalidCodec(u32),

    /// Chunk size is zero or not below the 256 KiB limit
    #[error("Invalid chunk size 0x{0:X} in catalog header")]
    InvalidChunkSize(u32),

    /// Entry count at or above the format limit
    #[error("Too many catalog entries: {0}")]
    TooManyEntries(u32),

    /// Volume count beyond what a 16-bit volume index can address
    #[error("Too many volumes: {0}")]
    TooManyVolumes(u32),

    /// Name dictionary larger than 0x80 pairs
    #[error("Name dictionary too large: {0} pairs")]
    DictionaryTooLarge(u8),

    /// Dictionary table length does not match the declared pair count
    #[error("Name dictionary holds {actual} bytes, expected {expected}")]
    DictionaryLength {
        /// `2 * dict_size`
        expected: usize,
        /// Bytes supplied
        actual: usize,
    },

    /// A fixed marker value was not found where the layout requires it
    #[error("Missing {context} marker: found 0x{found:08X}")]
    MissingMarker {
        /// Which marker was being checked
        context: &'static str,
        /// Value read instead
        found: u32,
    },

    /// Stream ended before a declared length was satisfied
    #[error("Truncated {context}: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Which section was being read
        context: &'static str,
        /// Declared length
        expected: u64,
        /// Bytes actually available
        actual: u64,
    },

    /// Entry size stored as a negative number
    #[error("Entry {index} has negative size {size}")]
    NegativeEntrySize {
        /// Table index of the entry
        index: usize,
        /// Raw stored size
        size: i32,
    },

    /// Entry table is not sorted ascending by name hash
    #[error("Entry table not sorted by name hash at index {index}")]
    UnsortedEntries {
        /// First index whose hash is below its predecessor's
        index: usize,
    },

    /// Compressed name references a dictionary slot that does not exist
    #[error("Name byte 0x{byte:02X} references beyond the {dict_len}-byte dictionary")]
    DictionaryReference {
        /// Back-reference byte
        byte: u8,
        /// Dictionary table length
        dict_len: usize,
    },

    /// Name expansion exceeded the expansion stack
    #[error("Name expansion overflow at blob offset {offset} (capacity {capacity})")]
    ExpansionOverflow {
        /// Blob cursor when the overflow happened
        offset: usize,
        /// Stack capacity
        capacity: usize,
    },

    /// Name blob ended in the middle of a name
    #[error("Name blob exhausted at offset {0}")]
    NameBlobExhausted(usize),

    /// Binary parsing error
    #[error("Binary parsing error: {0}")]
    BinRw(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CatalogError {
    /// Whether this error means the input is not a supported catalog at all,
    /// as opposed to a supported catalog that is damaged
    pub fn is_format_mismatch(&self) -> bool {
        matches!(self, Self::InvalidMagic(_) | Self::UnsupportedVersion(_))
    }
}

impl From<binrw::Error> for CatalogError {
    fn from(e: binrw::Error) -> Self {
        match e {
            binrw::Error::Io(io) => Self::Io(io),
            binrw::Error::Backtrace(bt) => Self::from(*bt.error),
            other => Self::BinRw(other.to_string()),
        }
    }
}

/// Result type alias for catalog operations
pub type CatalogResult<T> = Result<T, CatalogError>;

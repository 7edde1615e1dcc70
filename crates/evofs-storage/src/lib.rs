//! Read-only access to Evo packed file system installations.
//!
//! An installation is a directory holding one catalog (`game.ndx`) and a set
//! of volumes (`game000.dat`, `game001.dat`, ...). Early installations ship a
//! single combined `game.dat` that embeds its own catalog and doubles as
//! volume 0.
//!
//! # Layers
//!
//! - [`Volume`]: one open volume file and its chunk table
//! - [`ChunkCache`]: two-slot (raw input / decoded output) chunk cache
//! - [`EntryReader`]: byte stream over one catalog entry
//! - [`VirtualFileSystem`]: catalog plus lazily opened volumes
//!
//! # Example
//!
//! ```rust,no_run
//! use evofs_storage::VirtualFileSystem;
//! use std::io::Read;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let vfs = VirtualFileSystem::open("/path/to/install")?;
//! let mut reader = vfs.open_reader("cars/f40/body.bin")?;
//!
//! let mut data = Vec::new();
//! reader.read_to_end(&mut data)?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![allow(clippy::must_use_candidate)]

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

// Two-slot chunk cache
pub mod cache;

// Configuration
pub mod config;

// Batch and single-file extraction
pub mod extract;

// Per-entry byte stream
pub mod reader;

// Top-level facade
pub mod vfs;

// Open volume files
pub mod volume;

pub use cache::ChunkCache;
pub use config::VfsConfig;
pub use extract::{ExtractReport, SkippedEntry};
pub use reader::EntryReader;
pub use vfs::{Layout, VirtualFileSystem, VolumeState};
pub use volume::Volume;

use evofs_formats::{CatalogError, CodecError, VolumeError};

/// Result type for file system operations.
pub type Result<T> = std::result::Result<T, VfsError>;

/// Errors that can occur while reading an installation.
#[derive(Debug, Error)]
pub enum VfsError {
    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrong magic or unsupported version.
    #[error("Unsupported format: {0}")]
    Format(String),

    /// A declared bound or marker is violated.
    #[error("Data corruption detected: {0}")]
    Corruption(String),

    /// A chunk failed to decode.
    #[error("Failed to decode chunk {chunk} of volume {volume}: {source}")]
    Decompression {
        /// Volume index
        volume: u16,
        /// Chunk index within the volume
        chunk: usize,
        /// Codec failure
        #[source]
        source: CodecError,
    },

    /// Extracted content does not match the stored checksum.
    #[error("Checksum mismatch for {name}: expected {expected}, got {actual}")]
    Integrity {
        /// Entry name
        name: String,
        /// Stored checksum (hex)
        expected: String,
        /// Checksum of the delivered bytes (hex)
        actual: String,
    },

    /// Name has no catalog entry.
    #[error("Entry not found: {0}")]
    EntryNotFound(String),

    /// Volume file is missing on disk.
    #[error("Volume {index} not found at {}", .path.display())]
    VolumeNotFound {
        /// Volume index
        index: u16,
        /// Expected location
        path: PathBuf,
    },

    /// Neither a catalog nor a combined data file exists.
    #[error("No catalog found in {}", .0.display())]
    CatalogNotFound(PathBuf),

    /// Entry name would escape the extraction directory.
    #[error("Refusing to extract unsafe path: {0}")]
    UnsafePath(String),
}

/// Coarse classification of [`VfsError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Operating system I/O failure
    Io,
    /// Not a supported catalog or volume
    Format,
    /// Catalog or volume cannot be trusted
    Corruption,
    /// A chunk failed to decode
    Decompression,
    /// Checksum mismatch
    Integrity,
    /// Missing entry, volume or catalog
    NotFound,
    /// Entry name unusable as an output path
    InvalidPath,
}

impl VfsError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) => ErrorKind::Io,
            Self::Format(_) => ErrorKind::Format,
            Self::Corruption(_) => ErrorKind::Corruption,
            Self::Decompression { .. } => ErrorKind::Decompression,
            Self::Integrity { .. } => ErrorKind::Integrity,
            Self::EntryNotFound(_) | Self::VolumeNotFound { .. } | Self::CatalogNotFound(_) => {
                ErrorKind::NotFound
            }
            Self::UnsafePath(_) => ErrorKind::InvalidPath,
        }
    }

    /// Whether a batch operation may skip the affected entry and continue
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::NotFound
                | ErrorKind::Integrity
                | ErrorKind::Decompression
                | ErrorKind::InvalidPath
        )
    }
}

/// Truncated structures surface from the parsers as unexpected EOF
fn is_truncation(e: &std::io::Error) -> bool {
    e.kind() == std::io::ErrorKind::UnexpectedEof
}

impl From<CatalogError> for VfsError {
    fn from(e: CatalogError) -> Self {
        match e {
            CatalogError::Io(io) if !is_truncation(&io) => Self::Io(io),
            e if e.is_format_mismatch() => Self::Format(format!("catalog: {e}")),
            e => Self::Corruption(format!("catalog: {e}")),
        }
    }
}

impl From<VolumeError> for VfsError {
    fn from(e: VolumeError) -> Self {
        match e {
            VolumeError::Io(io) if !is_truncation(&io) => Self::Io(io),
            e if e.is_format_mismatch() => Self::Format(format!("volume: {e}")),
            e => Self::Corruption(format!("volume: {e}")),
        }
    }
}

/// Version information for this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Catalog file name in a split installation.
pub const CATALOG_FILE: &str = "game.ndx";

/// Combined data file of an early installation.
pub const COMBINED_FILE: &str = "game.dat";

/// File stem shared by all volumes (`game000.dat`, `game001.dat`, ...).
pub const VOLUME_STEM: &str = "game";

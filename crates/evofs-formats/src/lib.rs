//! File format parsers for the Evo packed file system
//!
//! The packed file system ships a game's assets as a handful of multi-gigabyte
//! volume files (`gameNNN.dat`) plus one compact catalog (`game.ndx`) mapping
//! logical file names to byte ranges inside those volumes. This crate parses
//! both file kinds and decodes the chunk payloads stored in volumes. It never
//! touches the file system itself; see `evofs-storage` for that.
//!
//! # Supported Formats
//!
//! - **Catalog**: header, name dictionary, compressed name blob and the
//!   hash-sorted entry table, for the early (`3100`) and current (`4300`)
//!   generations
//! - **Volume**: header and the cumulative chunk offset table
//! - **Codec**: chunk decompression (store, zlib, LZ4, LZ4HC)
//!
//! # Data Flow
//!
//! ```text
//! name -> Catalog (hash) -> entry -> Volume chunk table -> Codec -> bytes
//! ```

#![warn(missing_docs)]
#![allow(clippy::cast_possible_truncation)] // Intentional for binary format parsing
#![allow(clippy::cast_lossless)] // Sometimes clearer than From
#![allow(clippy::uninlined_format_args)] // Backwards compatibility
#![allow(clippy::module_name_repetitions)] // Clear naming is preferred
#![allow(clippy::similar_names)] // Domain-specific naming patterns

/// Catalog (`.ndx`) parsing, name decoding and hash lookup
///
/// The catalog stores every file name in one dictionary-compressed blob and
/// looks entries up by a seeded rolling hash rather than by string
/// comparison. Entries are sorted ascending by that hash.
///
/// See the [`catalog`] module for the on-disk layout.
pub mod catalog;
/// Chunk decompression for volume payloads
pub mod codec;
/// Volume (`.dat`) header and chunk table parsing
pub mod volume;

/// Writers producing byte-exact catalogs and volumes for tests
#[cfg(any(test, feature = "test-fixtures"))]
pub mod fixtures;

pub use catalog::{Catalog, CatalogEntry, CatalogError, CatalogHeader, FormatVersion, name_hash};
pub use codec::{Codec, CodecError, decompress_chunk};
pub use volume::{ChunkTable, VolumeError, VolumeHeader};

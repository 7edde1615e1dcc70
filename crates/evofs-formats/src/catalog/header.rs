//! Catalog header for both format generations
//!
//! ```text
//! current (4300)                    early (3100)
//! magic        u32                  magic        u32
//! version      u32                  version      u32
//! timestamp    u64 FILETIME         timestamp    u64 FILETIME
//! total_size   u64                  hash_seed_a  u32
//! hash_seed_a  u32                  hash_seed_b  u32
//! hash_seed_b  u32                  codec        u32
//! codec        u32                  chunk_size   u32
//! chunk_size   u32                  entry_count  u32
//! reserved     u32 x2               dict_size    u8
//! volume_count u32
//! reserved     u32
//! entry_count  u32
//! dict_size    u8
//! ```
//!
//! Both layouts continue with the dictionary table, the name blob and (current
//! only) the `0x12345678` marker.

use super::error::{CatalogError, CatalogResult};
use crate::codec::Codec;
use binrw::{BinRead, BinReaderExt, BinWrite};
use std::fmt;
use std::io::{Read, Seek};

/// `DATN` read as a little-endian u32
pub const CATALOG_MAGIC_DATN: u32 = 0x4E54_4144;
/// `DATX` read as a little-endian u32
pub const CATALOG_MAGIC_DATX: u32 = 0x5854_4144;
/// Marker after the name blob and after the entry table
pub const SECTION_MARKER: u32 = 0x1234_5678;

/// Chunk sizes must stay below this
pub const MAX_CHUNK_SIZE: u32 = 0x4_0000;
/// Entry counts must stay below this
pub const MAX_ENTRY_COUNT: u32 = 1_000_000;
/// Largest dictionary pair count
pub const MAX_DICT_SIZE: u8 = 0x80;
/// Largest volume count a 16-bit volume index can address
pub const MAX_VOLUME_COUNT: u32 = 0x1_0000;

/// 2015-01-01T00:00:00Z as a Windows FILETIME.
///
/// Current-format catalogs stamped on or after this pack a 16-bit volume
/// index into each entry instead of an 8-bit one.
pub const PACKING_CUTOVER_FILETIME: u64 = 130_645_440_000_000_000;

/// Format generation shared by catalogs and volumes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatVersion {
    /// Version 3100: no checksums, catalog embedded in a combined data file
    Early,
    /// Version 4300: separate catalog, checksums, multiple volumes
    Current,
}

impl FormatVersion {
    /// Map the raw version field, `None` for anything unsupported
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            3100 => Some(Self::Early),
            4300 => Some(Self::Current),
            _ => None,
        }
    }

    /// Raw version field value
    pub const fn raw(self) -> u32 {
        match self {
            Self::Early => 3100,
            Self::Current => 4300,
        }
    }

    /// Whether entries carry an MD5 of their content
    pub const fn has_checksums(self) -> bool {
        matches!(self, Self::Current)
    }
}

impl fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw())
    }
}

/// Fields following magic and version in a current-format header
#[derive(Debug, Clone, BinRead, BinWrite)]
#[brw(little)]
pub(crate) struct CurrentHeaderFields {
    pub timestamp: u64,
    pub total_size: u64,
    pub hash_seed_a: u32,
    pub hash_seed_b: u32,
    pub codec: u32,
    pub chunk_size: u32,
    pub reserved0: u32,
    pub reserved1: u32,
    pub volume_count: u32,
    pub reserved2: u32,
    pub entry_count: u32,
    pub dict_size: u8,
}

/// Fields following magic and version in an early-format header
#[derive(Debug, Clone, BinRead, BinWrite)]
#[brw(little)]
pub(crate) struct EarlyHeaderFields {
    pub timestamp: u64,
    pub hash_seed_a: u32,
    pub hash_seed_b: u32,
    pub codec: u32,
    pub chunk_size: u32,
    pub entry_count: u32,
    pub dict_size: u8,
}

/// Parsed and validated catalog header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogHeader {
    /// Raw magic (`DATN` or `DATX`)
    pub magic: u32,
    /// Format generation
    pub version: FormatVersion,
    /// Creation time as a Windows FILETIME
    pub timestamp: u64,
    /// Total logical data size (0 for the early format)
    pub total_size: u64,
    /// First name hash seed
    pub hash_seed_a: u32,
    /// Second name hash seed
    pub hash_seed_b: u32,
    /// Codec applied to non-raw chunks
    pub codec: Codec,
    /// Logical chunk size shared by all volumes
    pub chunk_size: u32,
    /// Number of volume files (1 for the early format)
    pub volume_count: u32,
    /// Number of entries in the table
    pub entry_count: u32,
    /// Dictionary pair count
    pub dict_size: u8,
}

impl CatalogHeader {
    /// Read and validate magic, version and the generation's header fields
    pub fn read<R: Read + Seek>(reader: &mut R) -> CatalogResult<Self> {
        let magic: u32 = reader.read_le()?;
        if magic != CATALOG_MAGIC_DATN && magic != CATALOG_MAGIC_DATX {
            return Err(CatalogError::InvalidMagic(magic));
        }

        let raw_version: u32 = reader.read_le()?;
        let version = FormatVersion::from_raw(raw_version)
            .ok_or(CatalogError::UnsupportedVersion(raw_version))?;

        let header = match version {
            FormatVersion::Current => {
                let f: CurrentHeaderFields = reader.read_le()?;
                Self {
                    magic,
                    version,
                    timestamp: f.timestamp,
                    total_size: f.total_size,
                    hash_seed_a: f.hash_seed_a,
                    hash_seed_b: f.hash_seed_b,
                    codec: parse_codec(f.codec)?,
                    chunk_size: f.chunk_size,
                    volume_count: f.volume_count,
                    entry_count: f.entry_count,
                    dict_size: f.dict_size,
                }
            }
            FormatVersion::Early => {
                let f: EarlyHeaderFields = reader.read_le()?;
                Self {
                    magic,
                    version,
                    timestamp: f.timestamp,
                    total_size: 0,
                    hash_seed_a: f.hash_seed_a,
                    hash_seed_b: f.hash_seed_b,
                    codec: parse_codec(f.codec)?,
                    chunk_size: f.chunk_size,
                    volume_count: 1,
                    entry_count: f.entry_count,
                    dict_size: f.dict_size,
                }
            }
        };

        header.validate()?;
        Ok(header)
    }

    fn validate(&self) -> CatalogResult<()> {
        if self.chunk_size == 0 || self.chunk_size >= MAX_CHUNK_SIZE {
            return Err(CatalogError::InvalidChunkSize(self.chunk_size));
        }
        if self.volume_count > MAX_VOLUME_COUNT {
            return Err(CatalogError::TooManyVolumes(self.volume_count));
        }
        if self.entry_count >= MAX_ENTRY_COUNT {
            return Err(CatalogError::TooManyEntries(self.entry_count));
        }
        if self.dict_size > MAX_DICT_SIZE {
            return Err(CatalogError::DictionaryTooLarge(self.dict_size));
        }
        Ok(())
    }

    /// How entries in this catalog pack volume index and offset
    pub fn entry_packing(&self) -> super::entry::EntryPacking {
        super::entry::EntryPacking::for_catalog(self.version, self.timestamp)
    }
}

fn parse_codec(id: u32) -> CatalogResult<Codec> {
    Codec::from_id(id).map_err(|_| CatalogError::InvalidCodec(id))
}

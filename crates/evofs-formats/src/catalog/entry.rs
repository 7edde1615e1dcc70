//! Catalog entries and their on-disk records

use super::header::{FormatVersion, PACKING_CUTOVER_FILETIME};
use binrw::{BinRead, BinWrite};
use std::fmt;

/// Entry record of a current-format catalog (32 bytes)
#[derive(Debug, Clone, BinRead, BinWrite)]
#[brw(little)]
pub(crate) struct CurrentEntryRecord {
    pub packed: u64,
    pub size: i32,
    pub name_hash: u32,
    pub checksum: [u8; 16],
}

/// Entry record of an early-format catalog (16 bytes)
#[derive(Debug, Clone, BinRead, BinWrite)]
#[brw(little)]
pub(crate) struct EarlyEntryRecord {
    pub offset: u64,
    pub size: i32,
    pub name_hash: u32,
}

/// How a catalog packs volume index and logical offset into one u64
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryPacking {
    /// Early format: the whole field is the offset, volume is always 0
    OffsetOnly,
    /// Before the cutover: low 8 bits volume, upper 56 bits offset
    Narrow,
    /// On or after the cutover: low 16 bits volume, upper 48 bits offset
    Wide,
}

impl EntryPacking {
    /// Packing used by a catalog of `version` stamped at `timestamp`
    pub fn for_catalog(version: FormatVersion, timestamp: u64) -> Self {
        match version {
            FormatVersion::Early => Self::OffsetOnly,
            FormatVersion::Current if timestamp >= PACKING_CUTOVER_FILETIME => Self::Wide,
            FormatVersion::Current => Self::Narrow,
        }
    }

    /// Split a stored field into `(volume_index, offset)`
    pub fn unpack(self, raw: u64) -> (u16, u64) {
        match self {
            Self::OffsetOnly => (0, raw),
            Self::Narrow => ((raw & 0xFF) as u16, raw >> 8),
            Self::Wide => ((raw & 0xFFFF) as u16, raw >> 16),
        }
    }

    /// Inverse of [`EntryPacking::unpack`]; bits that do not fit are dropped
    pub fn pack(self, volume_index: u16, offset: u64) -> u64 {
        match self {
            Self::OffsetOnly => offset,
            Self::Narrow => (offset << 8) | u64::from(volume_index & 0xFF),
            Self::Wide => (offset << 16) | u64::from(volume_index),
        }
    }
}

/// MD5 of an entry's full content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentChecksum(pub [u8; 16]);

impl ContentChecksum {
    /// Raw digest bytes
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Lowercase hex rendering
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ContentChecksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl From<[u8; 16]> for ContentChecksum {
    fn from(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }
}

/// One logical file in the catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    /// Decoded logical name
    pub name: String,
    /// Volume holding the content
    pub volume_index: u16,
    /// Byte offset in the volume's decompressed address space
    pub offset: u64,
    /// Content size in bytes
    pub size: u32,
    /// Stored name hash; the table is sorted by this
    pub name_hash: u32,
    /// Content MD5, current format only
    pub checksum: Option<ContentChecksum>,
}

impl CatalogEntry {
    /// Offset one past the last content byte
    pub fn end_offset(&self) -> u64 {
        self.offset.saturating_add(u64::from(self.size))
    }
}

impl fmt::Display for CatalogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:08X})", self.name, self.name_hash)
    }
}

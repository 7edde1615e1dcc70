//! Byte-exact catalog and volume writers for tests
//!
//! These never encode chunk payloads: callers hand in chunks that are
//! already in their on-disk form (raw, zlib, length-prefixed LZ4).

use crate::catalog::entry::{CurrentEntryRecord, EarlyEntryRecord, EntryPacking};
use crate::catalog::header::{
    CATALOG_MAGIC_DATX, CurrentHeaderFields, EarlyHeaderFields, PACKING_CUTOVER_FILETIME,
    SECTION_MARKER,
};
use crate::catalog::{CatalogError, CatalogResult, FormatVersion, name_hash};
use crate::codec::Codec;
use crate::volume::{
    CHUNK_TABLE_MARKER, PAYLOAD_MARKER, VOLUME_MAGIC, VolumeError, VolumeHeaderFields,
    VolumeResult,
};
use binrw::BinWriterExt;
use std::io::{self, Cursor, Write};

/// What to write after a current-format entry table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrailerStyle {
    /// `0x12345678`
    Marker,
    /// The trailer's own offset in the catalog
    StreamOffset,
    /// An arbitrary value
    Value(u32),
}

#[derive(Debug, Clone, Copy)]
enum Location {
    Logical { volume: u16, offset: u64 },
    Packed(u64),
}

/// One entry to be written by [`CatalogBuilder`]
#[derive(Debug, Clone)]
pub struct FixtureEntry {
    name: String,
    location: Location,
    size: i32,
    hash: Option<u32>,
    checksum: [u8; 16],
}

impl FixtureEntry {
    /// Entry at `offset` in volume `volume`
    pub fn new(name: &str, volume: u16, offset: u64, size: u32) -> Self {
        Self {
            name: name.to_string(),
            location: Location::Logical { volume, offset },
            size: size as i32,
            hash: None,
            checksum: [0; 16],
        }
    }

    /// Store `hash` instead of the name's real hash
    #[must_use]
    pub fn with_hash(mut self, hash: u32) -> Self {
        self.hash = Some(hash);
        self
    }

    /// Store a content checksum (current format only)
    #[must_use]
    pub fn with_checksum(mut self, checksum: [u8; 16]) -> Self {
        self.checksum = checksum;
        self
    }
}

/// Writes a catalog from plain entries
#[derive(Debug, Clone)]
pub struct CatalogBuilder {
    version: FormatVersion,
    timestamp: u64,
    total_size: Option<u64>,
    seed_a: u32,
    seed_b: u32,
    codec: Codec,
    chunk_size: u32,
    volume_count: u32,
    dict_size: u8,
    table: Vec<u8>,
    name_blob: Option<Vec<u8>>,
    blob_marker: u32,
    trailer: TrailerStyle,
    keep_order: bool,
    entries: Vec<FixtureEntry>,
}

impl Default for CatalogBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CatalogBuilder {
    /// Current-format catalog stamped at the packing cutover
    pub fn new() -> Self {
        Self {
            version: FormatVersion::Current,
            timestamp: PACKING_CUTOVER_FILETIME,
            total_size: None,
            seed_a: 0x0001_0DCD,
            seed_b: 0x0002_4F2B,
            codec: Codec::Store,
            chunk_size: 0x1000,
            volume_count: 1,
            dict_size: 0x80,
            table: vec![0; 0x100],
            name_blob: None,
            blob_marker: SECTION_MARKER,
            trailer: TrailerStyle::Marker,
            keep_order: false,
            entries: Vec::new(),
        }
    }

    /// Early-format catalog
    pub fn early() -> Self {
        Self {
            version: FormatVersion::Early,
            timestamp: 0x01CA_0000_0000_0000,
            ..Self::new()
        }
    }

    /// Set the creation timestamp
    #[must_use]
    pub fn timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Set the header's total size (defaults to the sum of entry sizes)
    #[must_use]
    pub fn total_size(mut self, total_size: u64) -> Self {
        self.total_size = Some(total_size);
        self
    }

    /// Set both hash seeds
    #[must_use]
    pub fn seeds(mut self, seed_a: u32, seed_b: u32) -> Self {
        self.seed_a = seed_a;
        self.seed_b = seed_b;
        self
    }

    /// Set the codec
    #[must_use]
    pub fn codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    /// Set the chunk size
    #[must_use]
    pub fn chunk_size(mut self, chunk_size: u32) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Set the volume count (current format only)
    #[must_use]
    pub fn volume_count(mut self, volume_count: u32) -> Self {
        self.volume_count = volume_count;
        self
    }

    /// Replace the all-zero dictionary
    #[must_use]
    pub fn dictionary(mut self, dict_size: u8, table: Vec<u8>) -> Self {
        self.dict_size = dict_size;
        self.table = table;
        self
    }

    /// Write `blob` verbatim instead of encoding entry names
    #[must_use]
    pub fn name_blob(mut self, blob: Vec<u8>) -> Self {
        self.name_blob = Some(blob);
        self
    }

    /// Value written where the post-blob marker belongs
    #[must_use]
    pub fn blob_marker(mut self, marker: u32) -> Self {
        self.blob_marker = marker;
        self
    }

    /// What follows the entry table
    #[must_use]
    pub fn trailer(mut self, trailer: TrailerStyle) -> Self {
        self.trailer = trailer;
        self
    }

    /// Write entries in insertion order instead of sorting by hash
    #[must_use]
    pub fn keep_order(mut self) -> Self {
        self.keep_order = true;
        self
    }

    /// Add an entry
    #[must_use]
    pub fn push(mut self, entry: FixtureEntry) -> Self {
        self.entries.push(entry);
        self
    }

    /// Add an entry hashed from its name
    #[must_use]
    pub fn entry(self, name: &str, volume: u16, offset: u64, size: u32) -> Self {
        self.push(FixtureEntry::new(name, volume, offset, size))
    }

    /// Add an entry with a forced hash
    #[must_use]
    pub fn entry_with_hash(
        self,
        name: &str,
        volume: u16,
        offset: u64,
        size: u32,
        hash: u32,
    ) -> Self {
        self.push(FixtureEntry::new(name, volume, offset, size).with_hash(hash))
    }

    /// Add an entry with a pre-packed location field and a raw size
    #[must_use]
    pub fn raw_entry(mut self, name: &str, packed: u64, size: i32, hash: Option<u32>) -> Self {
        self.entries.push(FixtureEntry {
            name: name.to_string(),
            location: Location::Packed(packed),
            size,
            hash,
            checksum: [0; 16],
        });
        self
    }

    /// Serialize the catalog
    pub fn build(&self) -> CatalogResult<Vec<u8>> {
        let mut entries: Vec<(u32, &FixtureEntry)> = self
            .entries
            .iter()
            .map(|e| {
                let hash = e
                    .hash
                    .unwrap_or_else(|| name_hash(&e.name, self.seed_a, self.seed_b));
                (hash, e)
            })
            .collect();
        if !self.keep_order {
            entries.sort_by_key(|(hash, _)| *hash);
        }

        let blob = match &self.name_blob {
            Some(blob) => blob.clone(),
            None => self.encode_names(entries.iter().map(|(_, e)| e.name.as_str()))?,
        };

        let entry_count = entries.len() as u32;
        let mut out = Cursor::new(Vec::new());
        out.write_le(&CATALOG_MAGIC_DATX)?;
        out.write_le(&self.version.raw())?;

        match self.version {
            FormatVersion::Current => {
                let total_size = self.total_size.unwrap_or_else(|| {
                    self.entries.iter().map(|e| e.size.max(0) as u64).sum()
                });
                out.write_le(&CurrentHeaderFields {
                    timestamp: self.timestamp,
                    total_size,
                    hash_seed_a: self.seed_a,
                    hash_seed_b: self.seed_b,
                    codec: u32::from(self.codec.id()),
                    chunk_size: self.chunk_size,
                    reserved0: 0,
                    reserved1: 0,
                    volume_count: self.volume_count,
                    reserved2: 0,
                    entry_count,
                    dict_size: self.dict_size,
                })?;
            }
            FormatVersion::Early => {
                out.write_le(&EarlyHeaderFields {
                    timestamp: self.timestamp,
                    hash_seed_a: self.seed_a,
                    hash_seed_b: self.seed_b,
                    codec: u32::from(self.codec.id()),
                    chunk_size: self.chunk_size,
                    entry_count,
                    dict_size: self.dict_size,
                })?;
            }
        }

        out.write_all(&self.table)?;
        out.write_le(&(blob.len() as u32))?;
        out.write_all(&blob)?;

        let packing = EntryPacking::for_catalog(self.version, self.timestamp);
        if self.version == FormatVersion::Current {
            out.write_le(&self.blob_marker)?;
        }

        for (hash, entry) in &entries {
            let packed = match entry.location {
                Location::Logical { volume, offset } => packing.pack(volume, offset),
                Location::Packed(raw) => raw,
            };
            match self.version {
                FormatVersion::Current => out.write_le(&CurrentEntryRecord {
                    packed,
                    size: entry.size,
                    name_hash: *hash,
                    checksum: entry.checksum,
                })?,
                FormatVersion::Early => out.write_le(&EarlyEntryRecord {
                    offset: packed,
                    size: entry.size,
                    name_hash: *hash,
                })?,
            }
        }

        if self.version == FormatVersion::Current {
            let trailer = match self.trailer {
                TrailerStyle::Marker => SECTION_MARKER,
                TrailerStyle::StreamOffset => out.position() as u32,
                TrailerStyle::Value(value) => value,
            };
            out.write_le(&trailer)?;
        }

        Ok(out.into_inner())
    }

    /// Literal encoding: name bytes plus a terminator, which is left out
    /// when the name already hits the decoder's length limit
    fn encode_names<'a>(&self, names: impl Iterator<Item = &'a str>) -> CatalogResult<Vec<u8>> {
        let limit = usize::from(self.dict_size).saturating_sub(1);
        let mut blob = Vec::new();

        for name in names {
            let bytes = name.as_bytes();
            if bytes.len() > limit || bytes.iter().any(|&b| b == 0 || b & 0x80 != 0) {
                return Err(CatalogError::Io(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("name {name:?} cannot be stored literally"),
                )));
            }
            blob.extend_from_slice(bytes);
            if bytes.len() < limit {
                blob.push(0);
            }
        }

        Ok(blob)
    }
}

/// Writes a volume from chunks already in on-disk form
#[derive(Debug, Clone)]
pub struct VolumeBuilder {
    version: FormatVersion,
    timestamp: u64,
    chunk_size: u32,
    chunks: Vec<Vec<u8>>,
    embedded_catalog: Option<Vec<u8>>,
}

impl VolumeBuilder {
    /// Current-format volume with the given chunk size
    pub fn new(chunk_size: u32) -> Self {
        Self {
            version: FormatVersion::Current,
            timestamp: PACKING_CUTOVER_FILETIME,
            chunk_size,
            chunks: Vec::new(),
            embedded_catalog: None,
        }
    }

    /// Set the format generation
    #[must_use]
    pub fn version(mut self, version: FormatVersion) -> Self {
        self.version = version;
        self
    }

    /// Append one on-disk chunk
    #[must_use]
    pub fn chunk(mut self, data: Vec<u8>) -> Self {
        self.chunks.push(data);
        self
    }

    /// Append `data` split into raw chunk-size pieces
    #[must_use]
    pub fn raw_payload(mut self, data: &[u8]) -> Self {
        let size = self.chunk_size.max(1) as usize;
        self.chunks.extend(data.chunks(size).map(<[u8]>::to_vec));
        self
    }

    /// Append a catalog after the payload and point the TOC field at it
    #[must_use]
    pub fn embedded_catalog(mut self, catalog: Vec<u8>) -> Self {
        self.embedded_catalog = Some(catalog);
        self
    }

    /// Absolute offset of the first payload byte
    pub fn data_base(&self) -> u64 {
        32 + 4 + 4 * self.chunks.len() as u64 + 4
    }

    /// Serialize the volume
    pub fn build(&self) -> VolumeResult<Vec<u8>> {
        let payload_len: u64 = self.chunks.iter().map(|c| c.len() as u64).sum();
        let toc_offset = if self.embedded_catalog.is_some() {
            self.data_base() + payload_len
        } else {
            0
        };

        let mut out = Cursor::new(Vec::new());
        out.write_le(&VOLUME_MAGIC)?;
        out.write_le(&self.version.raw())?;
        out.write_le(&VolumeHeaderFields {
            timestamp: self.timestamp,
            toc_offset,
            chunk_count: self.chunks.len() as u32,
            chunk_size: self.chunk_size,
        })?;

        out.write_le(&CHUNK_TABLE_MARKER)?;
        for (index, chunk) in self.chunks.iter().enumerate() {
            if chunk.len() > self.chunk_size as usize {
                return Err(VolumeError::OversizedChunk {
                    index,
                    size: chunk.len() as u32,
                    chunk_size: self.chunk_size,
                });
            }
            out.write_le(&(chunk.len() as u32))?;
        }
        out.write_le(&PAYLOAD_MARKER)?;

        let mut data = out.into_inner();
        for chunk in &self.chunks {
            data.extend_from_slice(chunk);
        }
        if let Some(catalog) = &self.embedded_catalog {
            data.extend_from_slice(catalog);
        }
        Ok(data)
    }
}

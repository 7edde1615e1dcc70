//! Volume (`gameNNN.dat`) format
//!
//! ```text
//! magic        "DATF"
//! version      u32 (3100 or 4300)
//! timestamp    u64 FILETIME
//! toc_offset   u64 (early format: absolute offset of the embedded catalog)
//! chunk_count  u32
//! chunk_size   u32
//! "CHNK"
//! chunk sizes  u32 x chunk_count (on-disk size of each chunk)
//! "DATA"
//! payload      chunks back to back
//! ```
//!
//! A chunk whose on-disk size equals `chunk_size` is stored raw. Any shorter
//! chunk is encoded with the catalog's codec.

mod error;

pub use error::{VolumeError, VolumeResult};

use crate::catalog::FormatVersion;
use binrw::{BinRead, BinReaderExt, BinWrite};
use std::io::{Read, Seek};

/// `DATF` read as a little-endian u32
pub const VOLUME_MAGIC: u32 = 0x4654_4144;
/// `CHNK` read as a little-endian u32
pub const CHUNK_TABLE_MARKER: u32 = 0x4B4E_4843;
/// `DATA` read as a little-endian u32
pub const PAYLOAD_MARKER: u32 = 0x4154_4144;

/// Fixed fields following magic and version
#[derive(Debug, Clone, BinRead, BinWrite)]
#[brw(little)]
pub(crate) struct VolumeHeaderFields {
    pub timestamp: u64,
    pub toc_offset: u64,
    pub chunk_count: u32,
    pub chunk_size: u32,
}

/// Parsed volume header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeHeader {
    /// Format generation
    pub version: FormatVersion,
    /// Creation time as a Windows FILETIME
    pub timestamp: u64,
    /// Offset of the embedded catalog (early combined files)
    pub toc_offset: u64,
    /// Number of chunks in the payload
    pub chunk_count: u32,
    /// Logical chunk size
    pub chunk_size: u32,
}

impl VolumeHeader {
    /// Read magic, version and the fixed header fields
    pub fn read<R: Read + Seek>(reader: &mut R) -> VolumeResult<Self> {
        let magic: u32 = reader.read_le()?;
        if magic != VOLUME_MAGIC {
            return Err(VolumeError::InvalidMagic(magic));
        }

        let raw_version: u32 = reader.read_le()?;
        let version = FormatVersion::from_raw(raw_version)
            .ok_or(VolumeError::UnsupportedVersion(raw_version))?;

        let fields: VolumeHeaderFields = reader.read_le()?;
        if fields.chunk_size == 0 {
            return Err(VolumeError::InvalidChunkSize(0));
        }

        Ok(Self {
            version,
            timestamp: fields.timestamp,
            toc_offset: fields.toc_offset,
            chunk_count: fields.chunk_count,
            chunk_size: fields.chunk_size,
        })
    }

    /// Check the header against the catalog that references this volume
    pub fn check_compatible(&self, version: FormatVersion, chunk_size: u32) -> VolumeResult<()> {
        if self.version != version {
            return Err(VolumeError::VersionMismatch {
                volume: self.version,
                catalog: version,
            });
        }
        if self.chunk_size != chunk_size {
            return Err(VolumeError::ChunkSizeMismatch {
                volume: self.chunk_size,
                catalog: chunk_size,
            });
        }
        Ok(())
    }
}

/// Cumulative on-disk chunk offsets
///
/// `offsets[0] == 0` and `offsets[i + 1] == offsets[i] + on_disk_size(i)`,
/// so the table has one more slot than there are chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkTable {
    offsets: Vec<u64>,
    chunk_size: u32,
    data_base: u64,
}

impl ChunkTable {
    /// Read the `CHNK` table and `DATA` marker following a header.
    ///
    /// The data base is the reader position right after `DATA`.
    pub fn read<R: Read + Seek>(reader: &mut R, header: &VolumeHeader) -> VolumeResult<Self> {
        let marker: u32 = reader.read_le()?;
        if marker != CHUNK_TABLE_MARKER {
            return Err(VolumeError::MissingMarker {
                context: "chunk table",
                found: marker,
            });
        }

        let expected = u64::from(header.chunk_count) * 4;
        let mut raw = Vec::new();
        let actual = reader.by_ref().take(expected).read_to_end(&mut raw)? as u64;
        if actual != expected {
            return Err(VolumeError::TruncatedChunkTable { expected, actual });
        }

        let sizes: Vec<u32> = raw
            .chunks_exact(4)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();

        let marker: u32 = reader.read_le()?;
        if marker != PAYLOAD_MARKER {
            return Err(VolumeError::MissingMarker {
                context: "payload",
                found: marker,
            });
        }

        let data_base = reader.stream_position()?;
        Self::from_sizes(&sizes, header.chunk_size, data_base)
    }

    /// Build the table from per-chunk on-disk sizes
    pub fn from_sizes(sizes: &[u32], chunk_size: u32, data_base: u64) -> VolumeResult<Self> {
        if chunk_size == 0 {
            return Err(VolumeError::InvalidChunkSize(chunk_size));
        }

        let mut offsets = Vec::with_capacity(sizes.len() + 1);
        let mut offset = 0u64;
        offsets.push(offset);

        for (index, &size) in sizes.iter().enumerate() {
            if size > chunk_size {
                return Err(VolumeError::OversizedChunk {
                    index,
                    size,
                    chunk_size,
                });
            }
            offset += u64::from(size);
            offsets.push(offset);
        }

        Ok(Self {
            offsets,
            chunk_size,
            data_base,
        })
    }

    /// Number of chunks
    pub fn chunk_count(&self) -> usize {
        self.offsets.len() - 1
    }

    /// Logical chunk size
    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    /// Absolute file offset of the first payload byte
    pub fn data_base(&self) -> u64 {
        self.data_base
    }

    /// Total on-disk payload length
    pub fn payload_len(&self) -> u64 {
        self.offsets[self.offsets.len() - 1]
    }

    /// `(payload_offset, on_disk_size)` of chunk `index`, relative to
    /// [`ChunkTable::data_base`]
    pub fn chunk_range(&self, index: usize) -> VolumeResult<(u64, u32)> {
        if index >= self.chunk_count() {
            return Err(VolumeError::ChunkOutOfRange {
                index,
                count: self.chunk_count(),
            });
        }
        let start = self.offsets[index];
        let size = (self.offsets[index + 1] - start) as u32;
        Ok((start, size))
    }

    /// Whether chunk `index` is stored untransformed
    pub fn is_raw(&self, index: usize) -> VolumeResult<bool> {
        Ok(self.chunk_range(index)?.1 == self.chunk_size)
    }
}

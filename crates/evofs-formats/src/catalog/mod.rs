//! Catalog (`game.ndx`) format
//!
//! The catalog maps logical file names to byte ranges inside the volumes.
//!
//! # Format Overview
//!
//! - Magic: `DATN` or `DATX`
//! - Versions: 3100 (early) and 4300 (current)
//! - All multi-byte integers: little-endian
//! - Header (see [`header`]), then the name dictionary (`2 * dict_size`
//!   bytes), a u32-prefixed name blob, and for the current format the
//!   `0x12345678` marker
//! - Entry table sorted ascending by name hash; current entries are
//!   32 bytes (packed volume/offset, size, hash, MD5), early entries 16
//! - Current format: a trailing u32 that is either the marker or its own
//!   offset in the catalog stream
//!
//! Names are decoded once at load time (see [`names`]).
//!
//! # Usage
//!
//! ```rust,no_run
//! use evofs_formats::catalog::Catalog;
//! use std::fs::File;
//! use std::io::BufReader;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut reader = BufReader::new(File::open("game.ndx")?);
//! let catalog = Catalog::read(&mut reader)?;
//!
//! if let Some(entry) = catalog.find_by_name("cars/f40/body.bin") {
//!     println!("{} bytes in volume {}", entry.size, entry.volume_index);
//! }
//! # Ok(())
//! # }
//! ```

pub mod entry;
pub mod error;
pub mod hash;
pub mod header;
pub mod names;

pub use entry::{CatalogEntry, ContentChecksum, EntryPacking};
pub use error::{CatalogError, CatalogResult};
pub use hash::{name_hash, normalize_name};
pub use header::{CatalogHeader, FormatVersion};
pub use names::{NameDecoder, NameDictionary};

use binrw::BinReaderExt;
use entry::{CurrentEntryRecord, EarlyEntryRecord};
use header::SECTION_MARKER;
use std::io::{Cursor, Read, Seek};
use std::ops::Range;
use tracing::{debug, warn};

/// Entry as read from the table, before its name is attached
struct RawEntry {
    packed: u64,
    size: i32,
    name_hash: u32,
    checksum: Option<[u8; 16]>,
}

/// Parsed catalog with all names decoded
#[derive(Debug, Clone)]
pub struct Catalog {
    header: CatalogHeader,
    dictionary: NameDictionary,
    entries: Vec<CatalogEntry>,
}

impl Catalog {
    /// Parse a catalog from an in-memory buffer
    pub fn parse(data: &[u8]) -> CatalogResult<Self> {
        Self::read(&mut Cursor::new(data))
    }

    /// Parse a catalog starting at the reader's current position
    pub fn read<R: Read + Seek>(reader: &mut R) -> CatalogResult<Self> {
        let start = reader.stream_position()?;
        let header = CatalogHeader::read(reader)?;

        let mut table = Vec::new();
        let table_len = u64::from(header.dict_size) * 2;
        read_section(reader, "name dictionary", table_len, &mut table)?;
        let dictionary = NameDictionary::new(header.dict_size, table)?;

        let blob_len: u32 = reader.read_le()?;
        let mut blob = Vec::new();
        read_section(reader, "name blob", u64::from(blob_len), &mut blob)?;

        if header.version == FormatVersion::Current {
            let marker: u32 = reader.read_le()?;
            if marker != SECTION_MARKER {
                return Err(CatalogError::MissingMarker {
                    context: "name blob",
                    found: marker,
                });
            }
        }

        let raw = read_entry_table(reader, &header)?;

        if header.version == FormatVersion::Current {
            let position = reader.stream_position()? - start;
            let trailer: u32 = reader.read_le()?;
            if trailer != SECTION_MARKER && u64::from(trailer) != position {
                return Err(CatalogError::MissingMarker {
                    context: "entry table",
                    found: trailer,
                });
            }
        }

        let packing = header.entry_packing();
        let mut decoder = dictionary.names(&blob);
        let mut entries = Vec::with_capacity(raw.len());

        for (index, record) in raw.into_iter().enumerate() {
            let name_bytes = decoder.next().unwrap_or(Err(CatalogError::NameBlobExhausted(0)))?;
            let size = u32::try_from(record.size).map_err(|_| CatalogError::NegativeEntrySize {
                index,
                size: record.size,
            })?;
            let (volume_index, offset) = packing.unpack(record.packed);

            entries.push(CatalogEntry {
                name: decode_name_bytes(index, name_bytes),
                volume_index,
                offset,
                size,
                name_hash: record.name_hash,
                checksum: record.checksum.map(ContentChecksum),
            });
        }

        if decoder.position() != blob.len() {
            debug!(
                "Name blob has {} trailing bytes",
                blob.len() - decoder.position()
            );
        }

        if let Some(index) = entries
            .windows(2)
            .position(|pair| pair[1].name_hash < pair[0].name_hash)
        {
            return Err(CatalogError::UnsortedEntries { index: index + 1 });
        }

        debug!(
            "Loaded catalog v{}: {} entries, {} volumes, codec {}, chunk size 0x{:X}",
            header.version,
            entries.len(),
            header.volume_count,
            header.codec,
            header.chunk_size
        );

        Ok(Self {
            header,
            dictionary,
            entries,
        })
    }

    /// Parsed header
    pub fn header(&self) -> &CatalogHeader {
        &self.header
    }

    /// Name dictionary
    pub fn dictionary(&self) -> &NameDictionary {
        &self.dictionary
    }

    /// All entries in table (hash) order
    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    /// Entry at a table index
    pub fn entry(&self, index: usize) -> Option<&CatalogEntry> {
        self.entries.get(index)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the catalog has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Hash a name with this catalog's seeds
    pub fn hash_name(&self, name: &str) -> u32 {
        name_hash(name, self.header.hash_seed_a, self.header.hash_seed_b)
    }

    /// Table index range of all entries sharing `hash`
    pub fn hash_range(&self, hash: u32) -> Range<usize> {
        let first = self.entries.partition_point(|e| e.name_hash < hash);
        let end = first + self.entries[first..].partition_point(|e| e.name_hash == hash);
        first..end
    }

    /// All entries sharing `hash`
    pub fn find_all_by_hash(&self, hash: u32) -> &[CatalogEntry] {
        &self.entries[self.hash_range(hash)]
    }

    /// Index of the entry for `hash`.
    ///
    /// When several entries share the hash, the one whose offset is closest
    /// to `tiebreak` wins; equal distances resolve to the lowest index. With
    /// a tiebreak of 0 that is the entry with the smallest offset.
    pub fn find_index_by_hash(&self, hash: u32, tiebreak: u64) -> Option<usize> {
        let range = self.hash_range(hash);
        let first = range.start;

        self.entries[range]
            .iter()
            .enumerate()
            .min_by_key(|(i, e)| (tiebreak.abs_diff(e.offset), *i))
            .map(|(i, _)| first + i)
    }

    /// Entry for `hash`, see [`Catalog::find_index_by_hash`]
    pub fn find_by_hash(&self, hash: u32, tiebreak: u64) -> Option<&CatalogEntry> {
        self.find_index_by_hash(hash, tiebreak)
            .map(|i| &self.entries[i])
    }

    /// Index of the entry for a logical name.
    ///
    /// Among entries sharing the name's hash, one whose decoded name matches
    /// (ignoring case and separator style) is preferred; otherwise this falls
    /// back to [`Catalog::find_index_by_hash`] with a tiebreak of 0.
    pub fn find_index_by_name(&self, name: &str) -> Option<usize> {
        let hash = self.hash_name(name);
        let range = self.hash_range(hash);
        if range.is_empty() {
            return None;
        }

        let wanted = normalize_name(name);
        let first = range.start;
        self.entries[range]
            .iter()
            .position(|e| normalize_name(&e.name) == wanted)
            .map(|i| first + i)
            .or_else(|| self.find_index_by_hash(hash, 0))
    }

    /// Entry for a logical name, see [`Catalog::find_index_by_name`]
    pub fn find_by_name(&self, name: &str) -> Option<&CatalogEntry> {
        self.find_index_by_name(name).map(|i| &self.entries[i])
    }

    /// Entries ordered by name for listings
    pub fn entries_sorted_by_name(&self) -> Vec<&CatalogEntry> {
        let mut sorted: Vec<&CatalogEntry> = self.entries.iter().collect();
        sorted.sort_by(|a, b| a.name.cmp(&b.name));
        sorted
    }
}

/// Read exactly `len` bytes without trusting `len` for the allocation
fn read_section<R: Read>(
    reader: &mut R,
    context: &'static str,
    len: u64,
    buf: &mut Vec<u8>,
) -> CatalogResult<()> {
    let actual = reader.by_ref().take(len).read_to_end(buf)? as u64;
    if actual != len {
        return Err(CatalogError::Truncated {
            context,
            expected: len,
            actual,
        });
    }
    Ok(())
}

fn read_entry_table<R: Read + Seek>(
    reader: &mut R,
    header: &CatalogHeader,
) -> CatalogResult<Vec<RawEntry>> {
    let count = header.entry_count as usize;
    let mut raw = Vec::with_capacity(count);

    for _ in 0..count {
        let entry = match header.version {
            FormatVersion::Current => {
                let r: CurrentEntryRecord = reader.read_le()?;
                RawEntry {
                    packed: r.packed,
                    size: r.size,
                    name_hash: r.name_hash,
                    checksum: Some(r.checksum),
                }
            }
            FormatVersion::Early => {
                let r: EarlyEntryRecord = reader.read_le()?;
                RawEntry {
                    packed: r.offset,
                    size: r.size,
                    name_hash: r.name_hash,
                    checksum: None,
                }
            }
        };
        raw.push(entry);
    }

    Ok(raw)
}

fn decode_name_bytes(index: usize, bytes: Vec<u8>) -> String {
    String::from_utf8(bytes).unwrap_or_else(|e| {
        warn!("Entry {} has a name that is not valid UTF-8", index);
        String::from_utf8_lossy(e.as_bytes()).into_owned()
    })
}

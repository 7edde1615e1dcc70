//! Byte stream over one catalog entry
//!
//! A reader maps its cursor onto the volume's logical address space
//! (`entry.offset + cursor`), resolves the containing chunk through its own
//! [`ChunkCache`] and copies out of the decoded chunk, crossing chunk
//! boundaries as needed. Reads past the entry's size return 0 bytes.
//!
//! Only the most recent chunk is cached; backward jumps re-read from disk.

use crate::cache::ChunkCache;
use crate::volume::Volume;
use crate::{Result, VfsError};
use evofs_formats::{Catalog, CatalogEntry};
use md5::{Digest, Md5};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::Arc;
use tracing::debug;

/// Read session for one entry
#[derive(Debug)]
pub struct EntryReader {
    catalog: Arc<Catalog>,
    entry_index: usize,
    volume: Arc<Volume>,
    cache: ChunkCache,
    position: u64,
}

impl EntryReader {
    /// Bind entry `entry_index` of `catalog` to its volume
    pub fn new(catalog: Arc<Catalog>, entry_index: usize, volume: Arc<Volume>) -> Result<Self> {
        let entry = catalog
            .entry(entry_index)
            .ok_or_else(|| VfsError::EntryNotFound(format!("entry #{entry_index}")))?;

        if entry.volume_index != volume.index() {
            return Err(VfsError::Corruption(format!(
                "{} belongs to volume {}, not {}",
                entry.name,
                entry.volume_index,
                volume.index()
            )));
        }

        let table = volume.chunk_table();
        let extent = table.chunk_count() as u64 * u64::from(table.chunk_size());
        if entry.end_offset() > extent {
            return Err(VfsError::Corruption(format!(
                "{} ends at 0x{:X}, past the 0x{:X}-byte extent of volume {}",
                entry.name,
                entry.end_offset(),
                extent,
                volume.index()
            )));
        }

        let header = catalog.header();
        let cache = ChunkCache::new(header.codec, header.chunk_size);

        Ok(Self {
            catalog,
            entry_index,
            volume,
            cache,
            position: 0,
        })
    }

    /// The entry being read
    pub fn entry(&self) -> &CatalogEntry {
        &self.catalog.entries()[self.entry_index]
    }

    /// Table index of the entry
    pub fn entry_index(&self) -> usize {
        self.entry_index
    }

    /// Volume the entry lives in
    pub fn volume(&self) -> &Arc<Volume> {
        &self.volume
    }

    /// Entry size in bytes
    pub fn len(&self) -> u64 {
        u64::from(self.entry().size)
    }

    /// Whether the entry is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cursor relative to the start of the entry
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Bytes between the cursor and the end of the entry
    pub fn remaining(&self) -> u64 {
        self.len().saturating_sub(self.position)
    }

    /// Move the cursor.
    ///
    /// With `relative` the offset is added to the current position,
    /// otherwise it is taken from the start of the entry. The chunk cache
    /// is left alone; the next read resolves whatever chunk it needs.
    pub fn seek_by(&mut self, offset: i64, relative: bool) -> Result<u64> {
        let base = if relative { self.position } else { 0 };
        self.seek_from(base, offset)
    }

    /// Set the cursor to `base + offset`, leaving it untouched on failure
    fn seek_from(&mut self, base: u64, offset: i64) -> Result<u64> {
        self.position = base.checked_add_signed(offset).ok_or_else(|| {
            VfsError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of entry",
            ))
        })?;
        Ok(self.position)
    }

    /// Read up to `buf.len()` bytes at the cursor, clamped to the entry
    pub fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize> {
        let wanted = (buf.len() as u64).min(self.remaining()) as usize;
        let entry_offset = self.entry().offset;
        let chunk_size = u64::from(self.cache.chunk_size());
        let mut done = 0;

        while done < wanted {
            let absolute = entry_offset + self.position;
            let chunk = (absolute / chunk_size) as usize;
            let within = (absolute % chunk_size) as usize;
            let take = (wanted - done).min(chunk_size as usize - within);

            let data = self.cache.resolve(&self.volume, chunk)?;
            let Some(source) = data.get(within..within + take) else {
                return Err(VfsError::Corruption(format!(
                    "chunk {chunk} of volume {} decodes to {} bytes, read needs {}",
                    self.volume.index(),
                    data.len(),
                    within + take
                )));
            };

            buf[done..done + take].copy_from_slice(source);
            done += take;
            self.position += take as u64;
        }

        Ok(done)
    }

    /// Stream the whole entry into `sink`, starting from offset 0.
    ///
    /// With `verify` and a stored checksum, the MD5 of every delivered byte
    /// is compared to it at the end. Entries without a checksum (early
    /// format) are not verified. Returns the number of bytes written.
    pub fn extract_to<W: Write>(&mut self, sink: &mut W, verify: bool) -> Result<u64> {
        self.position = 0;

        let expected = if verify { self.entry().checksum } else { None };
        let mut hasher = expected.map(|_| Md5::new());
        let mut buf = vec![0u8; self.cache.chunk_size() as usize];
        let mut written = 0u64;

        loop {
            let n = self.read_bytes(&mut buf)?;
            if n == 0 {
                break;
            }
            if let Some(hasher) = hasher.as_mut() {
                hasher.update(&buf[..n]);
            }
            sink.write_all(&buf[..n])?;
            written += n as u64;
        }

        if let (Some(hasher), Some(expected)) = (hasher, expected) {
            let actual = hasher.finalize();
            if actual.as_slice() != expected.as_bytes() {
                return Err(VfsError::Integrity {
                    name: self.entry().name.clone(),
                    expected: expected.to_hex(),
                    actual: hex::encode(actual),
                });
            }
            debug!("Verified {} ({})", self.entry().name, expected);
        }

        Ok(written)
    }
}

fn into_io_error(e: VfsError) -> io::Error {
    match e {
        VfsError::Io(io) => io,
        other => io::Error::other(other),
    }
}

impl Read for EntryReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_bytes(buf).map_err(into_io_error)
    }
}

impl Seek for EntryReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let (base, offset) = match pos {
            SeekFrom::Start(offset) => {
                self.position = offset;
                return Ok(offset);
            }
            SeekFrom::Current(offset) => (self.position, offset),
            SeekFrom::End(offset) => (self.len(), offset),
        };
        self.seek_from(base, offset).map_err(into_io_error)
    }
}

//! Open volume files
//!
//! A volume owns one file handle. The handle has a single read cursor, so
//! every chunk fetch runs inside one exclusive section of the handle mutex.

use crate::{Result, VfsError};
use evofs_formats::{ChunkTable, FormatVersion, VolumeHeader};
use parking_lot::Mutex;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

struct VolumeHandle {
    file: File,
    /// Cursor position, `None` after a failed read
    position: Option<u64>,
}

/// One opened volume file
pub struct Volume {
    index: u16,
    path: PathBuf,
    header: VolumeHeader,
    chunks: ChunkTable,
    handle: Mutex<VolumeHandle>,
}

impl std::fmt::Debug for Volume {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Volume")
            .field("index", &self.index)
            .field("path", &self.path)
            .field("header", &self.header)
            .field("chunk_count", &self.chunks.chunk_count())
            .finish_non_exhaustive()
    }
}

impl Volume {
    /// Open a volume and check it against the catalog's generation and
    /// chunk size
    pub fn open<P: AsRef<Path>>(
        path: P,
        index: u16,
        version: FormatVersion,
        chunk_size: u32,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;

        let mut reader = BufReader::new(file);
        let header = VolumeHeader::read(&mut reader)?;
        header.check_compatible(version, chunk_size)?;
        let chunks = ChunkTable::read(&mut reader, &header)?;

        let mut file = reader.into_inner();
        let position = file.seek(SeekFrom::Start(chunks.data_base()))?;

        debug!(
            "Opened volume {} ({}): {} chunks of 0x{:X}, 0x{:X} payload bytes at 0x{:X}",
            index,
            path.display(),
            chunks.chunk_count(),
            chunks.chunk_size(),
            chunks.payload_len(),
            chunks.data_base()
        );

        Ok(Self {
            index,
            path,
            header,
            chunks,
            handle: Mutex::new(VolumeHandle {
                file,
                position: Some(position),
            }),
        })
    }

    /// Volume index in the catalog
    pub fn index(&self) -> u16 {
        self.index
    }

    /// File path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parsed header
    pub fn header(&self) -> &VolumeHeader {
        &self.header
    }

    /// Chunk offset table
    pub fn chunk_table(&self) -> &ChunkTable {
        &self.chunks
    }

    /// Logical chunk size
    pub fn chunk_size(&self) -> u32 {
        self.chunks.chunk_size()
    }

    /// Read the on-disk bytes of `chunk` into the front of `buf`.
    ///
    /// Seeks only when the handle is not already positioned at the chunk.
    /// Returns the on-disk size.
    pub fn read_chunk(&self, chunk: usize, buf: &mut [u8]) -> Result<usize> {
        let (offset, size) = self.chunks.chunk_range(chunk)?;
        let size = size as usize;
        if size > buf.len() {
            return Err(VfsError::Corruption(format!(
                "chunk {chunk} of volume {} is {size} bytes, buffer holds {}",
                self.index,
                buf.len()
            )));
        }

        let target = self.chunks.data_base() + offset;
        let mut handle = self.handle.lock();

        let positioned = handle.position == Some(target);
        handle.position = None;
        if !positioned {
            trace!("Volume {}: seek to 0x{:X}", self.index, target);
            handle.file.seek(SeekFrom::Start(target))?;
        }

        handle.file.read_exact(&mut buf[..size]).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                VfsError::Corruption(format!(
                    "chunk {chunk} of volume {} is truncated on disk",
                    self.index
                ))
            } else {
                VfsError::Io(e)
            }
        })?;
        handle.position = Some(target + size as u64);

        Ok(size)
    }
}

//! Two-slot chunk cache
//!
//! The input slot holds the last chunk read from disk, the output slot the
//! last decoded chunk. A raw chunk needs no decoding, so its input buffer is
//! swapped into the output slot instead of copied.

use crate::volume::Volume;
use crate::{Result, VfsError};
use evofs_formats::{Codec, decompress_chunk};
use std::mem;
use tracing::trace;

#[derive(Debug)]
struct ChunkSlot {
    chunk: Option<usize>,
    data: Vec<u8>,
    len: usize,
}

impl ChunkSlot {
    fn new(size: usize) -> Self {
        Self {
            chunk: None,
            data: vec![0; size],
            len: 0,
        }
    }
}

/// Decode cache bound to one volume's chunk size and the catalog codec
#[derive(Debug)]
pub struct ChunkCache {
    codec: Codec,
    chunk_size: u32,
    input: ChunkSlot,
    output: ChunkSlot,
}

impl ChunkCache {
    /// Allocate both slots
    pub fn new(codec: Codec, chunk_size: u32) -> Self {
        let size = chunk_size as usize;
        Self {
            codec,
            chunk_size,
            input: ChunkSlot::new(size),
            output: ChunkSlot::new(size),
        }
    }

    /// Codec applied to non-raw chunks
    pub fn codec(&self) -> Codec {
        self.codec
    }

    /// Logical chunk size
    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    /// Chunk currently held in the input slot
    pub fn input_chunk(&self) -> Option<usize> {
        self.input.chunk
    }

    /// Chunk currently held in the output slot
    pub fn output_chunk(&self) -> Option<usize> {
        self.output.chunk
    }

    /// Make `chunk` of `volume` the output chunk and return its decoded bytes
    pub fn resolve(&mut self, volume: &Volume, chunk: usize) -> Result<&[u8]> {
        if self.output.chunk == Some(chunk) {
            return Ok(&self.output.data[..self.output.len]);
        }

        if self.input.chunk != Some(chunk) {
            self.input.chunk = None;
            self.input.len = volume.read_chunk(chunk, &mut self.input.data)?;
            self.input.chunk = Some(chunk);
        }

        if !self.codec.transforms_chunks() || volume.chunk_table().is_raw(chunk)? {
            trace!("Volume {} chunk {}: raw", volume.index(), chunk);
            mem::swap(&mut self.input, &mut self.output);
            self.input.chunk = None;
        } else {
            trace!(
                "Volume {} chunk {}: decoding {} bytes with {}",
                volume.index(),
                chunk,
                self.input.len,
                self.codec
            );
            self.output.chunk = None;
            let written = decompress_chunk(
                self.codec,
                &self.input.data[..self.input.len],
                &mut self.output.data,
            )
            .map_err(|source| VfsError::Decompression {
                volume: volume.index(),
                chunk,
                source,
            })?;
            self.output.len = written;
            self.output.chunk = Some(chunk);
        }

        Ok(&self.output.data[..self.output.len])
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use evofs_formats::FormatVersion;
    use evofs_formats::fixtures::VolumeBuilder;
    use flate2::Compression;
    use flate2::write::ZlibEncoder;
    use std::io::Write;
    use tempfile::TempDir;

    const CHUNK: u32 = 0x100;

    fn zlib(data: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn open(dir: &TempDir, builder: VolumeBuilder) -> Volume {
        let path = dir.path().join("game000.dat");
        std::fs::write(&path, builder.build().unwrap()).unwrap();
        Volume::open(&path, 0, FormatVersion::Current, CHUNK).unwrap()
    }

    #[test]
    fn test_raw_chunk_swaps_into_output() {
        let dir = TempDir::new().unwrap();
        let volume = open(&dir, VolumeBuilder::new(CHUNK).chunk(vec![7; CHUNK as usize]));
        let mut cache = ChunkCache::new(Codec::Zlib, CHUNK);

        let data = cache.resolve(&volume, 0).unwrap().to_vec();
        assert_eq!(data, vec![7; CHUNK as usize]);
        assert_eq!(cache.output_chunk(), Some(0));
        assert_eq!(cache.input_chunk(), None);
    }

    #[test]
    fn test_compressed_chunk_keeps_input() {
        let dir = TempDir::new().unwrap();
        let original: Vec<u8> = (0..CHUNK).map(|i| (i % 7) as u8).collect();
        let volume = open(&dir, VolumeBuilder::new(CHUNK).chunk(zlib(&original)));
        let mut cache = ChunkCache::new(Codec::Zlib, CHUNK);

        assert_eq!(cache.resolve(&volume, 0).unwrap(), original.as_slice());
        assert_eq!(cache.output_chunk(), Some(0));
        assert_eq!(cache.input_chunk(), Some(0));

        // Cached output is served again without touching the volume
        assert_eq!(cache.resolve(&volume, 0).unwrap(), original.as_slice());
    }

    #[test]
    fn test_codec_none_never_decodes() {
        let dir = TempDir::new().unwrap();
        let volume = open(&dir, VolumeBuilder::new(CHUNK).chunk(vec![3; 0x20]));
        let mut cache = ChunkCache::new(Codec::None, CHUNK);
        assert_eq!(cache.resolve(&volume, 0).unwrap(), &[3; 0x20]);
    }

    #[test]
    fn test_decode_failure_leaves_output_empty() {
        let dir = TempDir::new().unwrap();
        let volume = open(
            &dir,
            VolumeBuilder::new(CHUNK)
                .chunk(vec![1; CHUNK as usize])
                .chunk(vec![0x78, 0x9C, 0xFF, 0xFF]),
        );
        let mut cache = ChunkCache::new(Codec::Zlib, CHUNK);

        cache.resolve(&volume, 0).unwrap();
        let err = cache.resolve(&volume, 1).unwrap_err();
        assert!(matches!(err, VfsError::Decompression { volume: 0, chunk: 1, .. }));
        assert_eq!(cache.output_chunk(), None);
    }

    #[test]
    fn test_reserved_codec_fails_only_for_encoded_chunks() {
        let dir = TempDir::new().unwrap();
        let volume = open(
            &dir,
            VolumeBuilder::new(CHUNK)
                .chunk(vec![5; CHUNK as usize])
                .chunk(vec![6; 0x10]),
        );
        let mut cache = ChunkCache::new(Codec::Reserved(6), CHUNK);

        assert!(cache.resolve(&volume, 0).is_ok());
        assert_eq!(
            cache.resolve(&volume, 1).unwrap_err().kind(),
            crate::ErrorKind::Decompression
        );
    }
}

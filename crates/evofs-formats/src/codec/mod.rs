//! Chunk codecs
//!
//! Volume payloads are cut into fixed-size logical chunks. Each chunk is
//! stored either raw (its on-disk size equals the declared chunk size) or
//! encoded with the catalog-wide codec. Only decoding is supported.
//!
//! | Id | Codec | On-disk layout |
//! |----|-------|----------------|
//! | 0  | None  | raw bytes, never transformed |
//! | 1  | Store | raw bytes, possibly shorter than a chunk |
//! | 2  | Zlib  | zlib stream inflating to exactly one chunk |
//! | 3  | LZ4   | u32 LE decoded length + LZ4 block |
//! | 4  | LZ4HC | same layout as LZ4 |
//! | 5-7 | reserved | accepted in headers, not decodable |

mod error;

pub use error::{CodecError, CodecResult};

use flate2::{Decompress, FlushDecompress, Status};
use std::fmt;

/// Lead byte of the zlib framing variant the format reserves but never
/// shipped a decoder for.
pub const UNSUPPORTED_ZLIB_LEAD: u8 = 0x55;

/// Compression codec declared by a catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Codec {
    /// Chunks are stored untransformed
    None,
    /// Chunks are copied verbatim (`NoPack`)
    Store,
    /// Zlib-wrapped deflate
    Zlib,
    /// LZ4 block with a length prefix
    Lz4,
    /// LZ4 high-compression block, decoded like [`Codec::Lz4`]
    Lz4Hc,
    /// Id in the valid range without a known decoder
    Reserved(u8),
}

impl Codec {
    /// Highest codec id a catalog may declare
    pub const MAX_ID: u32 = 7;

    /// Parse a codec id as stored in the catalog header
    pub fn from_id(id: u32) -> CodecResult<Self> {
        match id {
            0 => Ok(Self::None),
            1 => Ok(Self::Store),
            2 => Ok(Self::Zlib),
            3 => Ok(Self::Lz4),
            4 => Ok(Self::Lz4Hc),
            5..=7 => Ok(Self::Reserved(id as u8)),
            _ => Err(CodecError::UnknownCodec(id)),
        }
    }

    /// Numeric id as stored in the catalog header
    pub const fn id(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Store => 1,
            Self::Zlib => 2,
            Self::Lz4 => 3,
            Self::Lz4Hc => 4,
            Self::Reserved(id) => id,
        }
    }

    /// Whether chunks of this codec can ever differ from their on-disk bytes
    pub const fn transforms_chunks(self) -> bool {
        !matches!(self, Self::None)
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("none"),
            Self::Store => f.write_str("store"),
            Self::Zlib => f.write_str("zlib"),
            Self::Lz4 => f.write_str("lz4"),
            Self::Lz4Hc => f.write_str("lz4hc"),
            Self::Reserved(id) => write!(f, "reserved({id})"),
        }
    }
}

/// Decode one on-disk chunk into `output`.
///
/// `output` must be exactly one declared chunk long. Returns the number of
/// valid bytes written to the front of `output`.
///
/// Chunks whose on-disk size equals the chunk size are raw and must not be
/// passed here; the caller copies them directly.
pub fn decompress_chunk(codec: Codec, input: &[u8], output: &mut [u8]) -> CodecResult<usize> {
    match codec {
        Codec::None | Codec::Store => copy_stored(input, output),
        Codec::Zlib => inflate(input, output),
        Codec::Lz4 | Codec::Lz4Hc => decode_lz4(input, output),
        Codec::Reserved(id) => Err(CodecError::UnsupportedCodec(id)),
    }
}

fn copy_stored(input: &[u8], output: &mut [u8]) -> CodecResult<usize> {
    if input.len() > output.len() {
        return Err(CodecError::OutputTooSmall {
            needed: input.len(),
            available: output.len(),
        });
    }

    output[..input.len()].copy_from_slice(input);
    Ok(input.len())
}

fn inflate(input: &[u8], output: &mut [u8]) -> CodecResult<usize> {
    if input.first() == Some(&UNSUPPORTED_ZLIB_LEAD) {
        return Err(CodecError::UnsupportedFraming(UNSUPPORTED_ZLIB_LEAD));
    }

    let mut inflater = Decompress::new(true);
    let status = inflater
        .decompress(input, output, FlushDecompress::Finish)
        .map_err(|e| CodecError::Zlib(e.to_string()))?;

    let produced = usize::try_from(inflater.total_out())
        .map_err(|_| CodecError::Zlib("output size overflow".to_string()))?;

    match status {
        Status::StreamEnd => {}
        Status::Ok | Status::BufError if produced == output.len() => {
            return Err(CodecError::Zlib(format!(
                "stream does not end within {} bytes",
                output.len()
            )));
        }
        _ => {
            return Err(CodecError::Zlib(format!(
                "stream truncated after {produced} bytes"
            )));
        }
    }

    if produced != output.len() {
        return Err(CodecError::LengthMismatch {
            expected: output.len(),
            actual: produced,
        });
    }

    Ok(produced)
}

fn decode_lz4(input: &[u8], output: &mut [u8]) -> CodecResult<usize> {
    if input.len() < 4 {
        return Err(CodecError::MissingLengthPrefix(input.len()));
    }

    let expected = u32::from_le_bytes([input[0], input[1], input[2], input[3]]) as usize;
    if expected > output.len() {
        return Err(CodecError::OutputTooSmall {
            needed: expected,
            available: output.len(),
        });
    }

    let decoded = lz4_flex::block::decompress_into(&input[4..], &mut output[..expected])
        .map_err(|e| CodecError::Lz4(e.to_string()))?;

    if decoded != expected {
        return Err(CodecError::LengthMismatch {
            expected,
            actual: decoded,
        });
    }

    Ok(decoded)
}

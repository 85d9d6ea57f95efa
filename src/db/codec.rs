// Framed, checksummed payloads shared by every on-disk artifact.
//
// Frame layout (little-endian): comp:u8, ulen:u64, clen:u64, crc:u32, body.
// The CRC32 covers the uncompressed payload.

use std::io::{Read, Write};
use std::path::Path;

use crc32fast::Hasher as Crc32;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SolverError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    None,
    #[default]
    Lz4,
    Zstd,
}

impl Compression {
    #[inline]
    pub(crate) fn tag(self) -> u8 {
        match self {
            Compression::None => 0,
            Compression::Lz4 => 1,
            Compression::Zstd => 2,
        }
    }

    #[inline]
    pub(crate) fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Compression::None),
            1 => Some(Compression::Lz4),
            2 => Some(Compression::Zstd),
            _ => None,
        }
    }
}

#[inline]
pub(crate) fn checksum(payload: &[u8]) -> u32 {
    let mut hasher = Crc32::new();
    hasher.update(payload);
    hasher.finalize()
}

pub(crate) fn compress(compression: Compression, payload: &[u8]) -> Result<Vec<u8>> {
    match compression {
        Compression::None => Ok(payload.to_vec()),
        Compression::Lz4 => Ok(lz4_flex::block::compress(payload)),
        // Fixed level keeps output deterministic.
        Compression::Zstd => zstd::encode_all(std::io::Cursor::new(payload), 3)
            .map_err(|e| SolverError::Runtime(format!("zstd encode error: {e}"))),
    }
}

pub(crate) fn decompress(compression: Compression, body: &[u8], ulen: usize, path: &Path) -> Result<Vec<u8>> {
    let payload = match compression {
        Compression::None => body.to_vec(),
        Compression::Lz4 => lz4_flex::block::decompress(body, ulen)
            .map_err(|e| SolverError::corrupt(path, format!("lz4 decompress error: {e}")))?,
        // Bounded by `ulen`: a frame claiming less cannot expand past it.
        Compression::Zstd => zstd::bulk::decompress(body, ulen)
            .map_err(|e| SolverError::corrupt(path, format!("zstd decode error: {e}")))?,
    };
    if payload.len() != ulen {
        return Err(SolverError::corrupt(
            path,
            format!("length mismatch: decoded {} bytes, expected {ulen}", payload.len()),
        ));
    }
    Ok(payload)
}

/// Decodes `body` and verifies it against `crc`.
pub(crate) fn decode_checked(compression: Compression, body: &[u8], ulen: usize, crc: u32, path: &Path) -> Result<Vec<u8>> {
    let payload = decompress(compression, body, ulen, path)?;
    let actual = checksum(&payload);
    if actual != crc {
        return Err(SolverError::corrupt(path, format!("crc mismatch: got {actual:08x}, expected {crc:08x}")));
    }
    Ok(payload)
}

pub(crate) fn write_frame<W: Write>(w: &mut W, compression: Compression, payload: &[u8], path: &Path) -> Result<()> {
    let crc = checksum(payload);
    let body = compress(compression, payload)?;
    let io = |e| SolverError::fs(path, e);
    w.write_all(&[compression.tag()]).map_err(io)?;
    w.write_all(&(payload.len() as u64).to_le_bytes()).map_err(io)?;
    w.write_all(&(body.len() as u64).to_le_bytes()).map_err(io)?;
    w.write_all(&crc.to_le_bytes()).map_err(io)?;
    w.write_all(&body).map_err(io)?;
    Ok(())
}

/// Bytes in front of every frame body.
pub(crate) const FRAME_HEADER_BYTES: u64 = 1 + 8 + 8 + 4;

/// Reads one frame. `available` is what is left of the input and
/// `max_ulen` the largest payload the caller can use; lengths beyond either
/// are corruption, not allocations.
pub(crate) fn read_frame<R: Read>(r: &mut R, available: u64, max_ulen: usize, path: &Path) -> Result<Vec<u8>> {
    let tag = read_array::<1, _>(r, path)?[0];
    let compression = Compression::from_tag(tag)
        .ok_or_else(|| SolverError::corrupt(path, format!("unknown compression tag: {tag}")))?;
    let ulen = to_len(u64::from_le_bytes(read_array(r, path)?), path)?;
    let clen = u64::from_le_bytes(read_array(r, path)?);
    let crc = u32::from_le_bytes(read_array(r, path)?);
    if ulen > max_ulen {
        return Err(SolverError::corrupt(path, format!("frame payload of {ulen} bytes, at most {max_ulen} expected")));
    }
    let room = available.saturating_sub(FRAME_HEADER_BYTES);
    if clen > room {
        return Err(SolverError::corrupt(path, format!("frame body of {clen} bytes, only {room} left")));
    }
    if compression == Compression::None && clen != ulen as u64 {
        return Err(SolverError::corrupt(path, format!("stored frame of {clen} bytes, expected {ulen}")));
    }
    let mut body = Vec::new();
    r.by_ref().take(clen).read_to_end(&mut body).map_err(|e| SolverError::fs(path, e))?;
    if body.len() as u64 != clen {
        return Err(SolverError::corrupt(path, format!("frame body truncated at {} of {clen} bytes", body.len())));
    }
    decode_checked(compression, &body, ulen, crc, path)
}

pub(crate) fn read_array<const N: usize, R: Read>(r: &mut R, path: &Path) -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    r.read_exact(&mut buf).map_err(|e| SolverError::fs(path, e))?;
    Ok(buf)
}

pub(crate) fn expect_magic<R: Read>(r: &mut R, magic: &[u8; 8], path: &Path) -> Result<()> {
    let found = read_array::<8, _>(r, path)?;
    if &found != magic {
        return Err(SolverError::corrupt(path, "invalid magic"));
    }
    Ok(())
}

fn to_len(n: u64, path: &Path) -> Result<usize> {
    usize::try_from(n).map_err(|_| SolverError::corrupt(path, format!("length {n} out of range")))
}

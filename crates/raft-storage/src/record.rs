//! # record
//!
//! why: give journal entries a self-checking on-disk framing so torn writes are detectable
//! relations: encoded by the journal writer thread, decoded by journal recovery
//! what: encode/decode of `[len][crc32c][index][term][flags][payload]`, RecordError
//!
//! All integers are little-endian. `len` counts the bytes after the crc; the crc covers exactly
//! those bytes. Payloads at or above the compression threshold are stored as an lz4 block with the
//! original size prepended and `FLAG_LZ4` set.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use raft_core::LogEntry;
use std::io;
use thiserror::Error;

/// len + crc
pub const FRAME_HEADER_LEN: usize = 8;
/// index + term + flags
const BODY_HEADER_LEN: usize = 17;

const FLAG_LZ4: u8 = 0b0000_0001;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("incomplete record")]
    Incomplete,
    #[error("crc mismatch: expected {expected:#x}, got {actual:#x}")]
    CrcMismatch { expected: u32, actual: u32 },
    #[error("record length {0} is too short")]
    BadLength(u32),
    #[error("unknown record flags {0:#x}")]
    UnknownFlags(u8),
    #[error("decompression failed: {0}")]
    Decompression(io::Error),
}

/// Frame one entry, compressing its payload when it is at least `compress_threshold` bytes
/// (0 disables compression)
pub fn encode(entry: &LogEntry, compress_threshold: usize) -> io::Result<Bytes> {
    let compress = compress_threshold > 0 && entry.command.len() >= compress_threshold;
    let compressed;
    let (flags, payload) = if compress {
        compressed = lz4::block::compress(&entry.command, None, true)?;
        (FLAG_LZ4, compressed.as_slice())
    } else {
        (0, entry.command.as_slice())
    };

    let body_len = BODY_HEADER_LEN + payload.len();
    let len = u32::try_from(body_len)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "entry too large for journal"))?;

    let mut body = BytesMut::with_capacity(body_len);
    body.put_u64_le(entry.index);
    body.put_u64_le(entry.term);
    body.put_u8(flags);
    body.put_slice(payload);

    let mut buf = BytesMut::with_capacity(FRAME_HEADER_LEN + body_len);
    buf.put_u32_le(len);
    buf.put_u32_le(crc32c::crc32c(&body));
    buf.put_slice(&body);
    Ok(buf.freeze())
}

/// Decode the record at the start of `buf`, returning it with its framed length
pub fn decode(mut buf: &[u8]) -> Result<(LogEntry, usize), RecordError> {
    if buf.len() < FRAME_HEADER_LEN {
        return Err(RecordError::Incomplete);
    }
    let len = buf.get_u32_le();
    let expected = buf.get_u32_le();
    if (len as usize) < BODY_HEADER_LEN {
        return Err(RecordError::BadLength(len));
    }
    if buf.len() < len as usize {
        return Err(RecordError::Incomplete);
    }

    let mut body = &buf[..len as usize];
    let actual = crc32c::crc32c(body);
    if actual != expected {
        return Err(RecordError::CrcMismatch { expected, actual });
    }

    let index = body.get_u64_le();
    let term = body.get_u64_le();
    let flags = body.get_u8();
    let command = match flags {
        0 => body.to_vec(),
        FLAG_LZ4 => lz4::block::decompress(body, None).map_err(RecordError::Decompression)?,
        other => return Err(RecordError::UnknownFlags(other)),
    };
    Ok((LogEntry::new(term, index, command), FRAME_HEADER_LEN + len as usize))
}

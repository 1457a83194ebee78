//! Live-room binary frame codec (panic-free).
//!
//! Wire layout, all integers big-endian:
//!
//! ```text
//! [0:4)   total_length  u32
//! [4:6)   header_length u16 (= 16)
//! [6:8)   version       u16  0|1 raw, 2 zlib container, 3 brotli container
//! [8:12)  operation     u32
//! [12:16) sequence      u32
//! [16:total_length) body
//! ```
//!
//! Parsing rules:
//! - Never index (`buf[0]`); always use `Buf` and `remaining()` checks.
//! - A bad length ends the scan of the current buffer; frames parsed before
//!   it are still returned.

use std::io::Read;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{DanmakuError, Result};

/// Fixed header size written by `encode_frame`.
pub const HEADER_LEN: u16 = 16;

/// Nested container levels followed before a frame is dropped.
pub const MAX_UNWRAP_DEPTH: usize = 4;

/// Largest body a single container may inflate to.
pub const MAX_INFLATED_BYTES: usize = 16 * 1024 * 1024;

/// Frame operation (wire integer). Unknown values are carried, not rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Heartbeat,
    HeartbeatReply,
    Message,
    Auth,
    AuthReply,
    Unknown(u32),
}

impl Operation {
    pub fn from_u32(v: u32) -> Self {
        match v {
            2 => Operation::Heartbeat,
            3 => Operation::HeartbeatReply,
            5 => Operation::Message,
            7 => Operation::Auth,
            8 => Operation::AuthReply,
            other => Operation::Unknown(other),
        }
    }

    pub fn as_u32(self) -> u32 {
        match self {
            Operation::Heartbeat => 2,
            Operation::HeartbeatReply => 3,
            Operation::Message => 5,
            Operation::Auth => 7,
            Operation::AuthReply => 8,
            Operation::Unknown(v) => v,
        }
    }

    /// Short label for logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Heartbeat => "heartbeat",
            Operation::HeartbeatReply => "heartbeat_reply",
            Operation::Message => "message",
            Operation::Auth => "auth",
            Operation::AuthReply => "auth_reply",
            Operation::Unknown(_) => "unknown",
        }
    }
}

/// Body encoding, derived from the header `version`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// Versions 0 and 1: plain JSON (or raw bytes for heartbeat replies).
    Raw,
    /// Version 2: zlib stream holding a sequence of frames.
    Zlib,
    /// Version 3: brotli stream holding a sequence of frames.
    Brotli,
    Unknown(u16),
}

impl Compression {
    pub fn from_version(v: u16) -> Self {
        match v {
            0 | 1 => Compression::Raw,
            2 => Compression::Zlib,
            3 => Compression::Brotli,
            other => Compression::Unknown(other),
        }
    }
}

/// One parsed wire frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub total_length: u32,
    pub header_length: u16,
    pub version: u16,
    pub operation: Operation,
    pub sequence: u32,
    /// Body (zero-copy slice of the input buffer).
    pub body: Bytes,
}

impl Frame {
    pub fn compression(&self) -> Compression {
        Compression::from_version(self.version)
    }
}

/// Result of scanning one buffer.
#[derive(Debug, Default)]
pub struct Scan {
    /// Frames parsed before the end of the buffer or the first bad header.
    pub frames: Vec<Frame>,
    /// Why the scan stopped early, if it did.
    pub stopped: Option<DanmakuError>,
}

/// Scan `buf` from offset 0, returning every well-formed frame up to the
/// first truncated or invalid header.
pub fn scan_frames(mut buf: Bytes) -> Scan {
    let mut scan = Scan::default();

    while buf.has_remaining() {
        if buf.remaining() < HEADER_LEN as usize {
            scan.stopped = Some(DanmakuError::FrameDecode(format!(
                "truncated header: {} bytes left",
                buf.remaining()
            )));
            break;
        }

        let mut header = &buf[..HEADER_LEN as usize];
        let total_length = header.get_u32();
        let header_length = header.get_u16();
        let version = header.get_u16();
        let operation = Operation::from_u32(header.get_u32());
        let sequence = header.get_u32();

        let total = total_length as usize;
        if header_length < HEADER_LEN || total < header_length as usize {
            scan.stopped = Some(DanmakuError::FrameDecode(format!(
                "invalid lengths: total={total_length} header={header_length}"
            )));
            break;
        }
        if total > buf.remaining() {
            scan.stopped = Some(DanmakuError::FrameDecode(format!(
                "frame exceeds buffer: total={total_length} remaining={}",
                buf.remaining()
            )));
            break;
        }

        let mut frame_bytes = buf.split_to(total);
        frame_bytes.advance(header_length as usize);

        scan.frames.push(Frame {
            total_length,
            header_length,
            version,
            operation,
            sequence,
            body: frame_bytes,
        });
    }

    scan
}

/// Decode all frames in `buf`; stops quietly on truncation.
pub fn decode_frames(buf: Bytes) -> Vec<Frame> {
    let scan = scan_frames(buf);
    if let Some(e) = &scan.stopped {
        tracing::debug!(error = %e, parsed = scan.frames.len(), "frame scan stopped early");
    }
    scan.frames
}

/// Encode one frame with the fixed 16-byte header.
pub fn encode_frame(operation: Operation, version: u16, sequence: u32, body: &[u8]) -> Bytes {
    let total = HEADER_LEN as usize + body.len();
    let mut out = BytesMut::with_capacity(total);
    out.put_u32(total as u32);
    out.put_u16(HEADER_LEN);
    out.put_u16(version);
    out.put_u32(operation.as_u32());
    out.put_u32(sequence);
    out.put_slice(body);
    out.freeze()
}

/// Undo the body compression named by `version`.
///
/// Inflated output is capped at `MAX_INFLATED_BYTES`; a body that would
/// expand past it is rejected.
pub fn decompress(version: u16, body: &[u8]) -> Result<Bytes> {
    match Compression::from_version(version) {
        Compression::Raw => Ok(Bytes::copy_from_slice(body)),
        Compression::Zlib => inflate_capped("zlib", flate2::read::ZlibDecoder::new(body)),
        Compression::Brotli => inflate_capped("brotli", brotli::Decompressor::new(body, 4096)),
        Compression::Unknown(v) => Err(DanmakuError::PayloadDecompress(format!(
            "unknown body version {v}"
        ))),
    }
}

fn inflate_capped(codec: &str, reader: impl Read) -> Result<Bytes> {
    let mut out = Vec::new();
    reader
        .take(MAX_INFLATED_BYTES as u64 + 1)
        .read_to_end(&mut out)
        .map_err(|e| DanmakuError::PayloadDecompress(format!("{codec}: {e}")))?;
    if out.len() > MAX_INFLATED_BYTES {
        return Err(DanmakuError::PayloadDecompress(format!(
            "{codec}: inflated body exceeds {MAX_INFLATED_BYTES} bytes"
        )));
    }
    Ok(Bytes::from(out))
}

/// Leaf frames after unwrapping, plus the per-frame failures met on the way.
#[derive(Debug, Default)]
pub struct Unwrapped {
    /// Raw (version 0/1) frames in wire order.
    pub frames: Vec<Frame>,
    /// One entry per dropped frame or early-stopped nested scan.
    pub errors: Vec<DanmakuError>,
}

/// Decode `buf` and recursively expand compressed containers into raw frames.
pub fn unwrap_buffer(buf: Bytes) -> Unwrapped {
    let mut out = Unwrapped::default();
    let scan = scan_frames(buf);
    if let Some(e) = scan.stopped {
        out.errors.push(e);
    }
    for frame in scan.frames {
        unwrap_into(frame, 0, &mut out);
    }
    out
}

fn unwrap_into(frame: Frame, depth: usize, out: &mut Unwrapped) {
    match frame.compression() {
        Compression::Raw => out.frames.push(frame),
        Compression::Zlib | Compression::Brotli => {
            if depth >= MAX_UNWRAP_DEPTH {
                out.errors.push(DanmakuError::FrameDecode(format!(
                    "container nesting exceeds {MAX_UNWRAP_DEPTH}"
                )));
                return;
            }
            let inner = match decompress(frame.version, &frame.body) {
                Ok(b) => b,
                Err(e) => {
                    out.errors.push(e);
                    return;
                }
            };
            let scan = scan_frames(inner);
            if let Some(e) = scan.stopped {
                out.errors.push(e);
            }
            for f in scan.frames {
                unwrap_into(f, depth + 1, out);
            }
        }
        Compression::Unknown(v) => out.errors.push(DanmakuError::PayloadDecompress(format!(
            "unknown body version {v}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::io::Write;

    use super::*;

    fn zlib(data: &[u8]) -> Vec<u8> {
        let mut enc = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn header_is_big_endian() {
        let b = encode_frame(Operation::Auth, 1, 1, b"{}");
        assert_eq!(&b[..16], &[0, 0, 0, 18, 0, 16, 0, 1, 0, 0, 0, 7, 0, 0, 0, 1]);
        assert_eq!(&b[16..], b"{}");
    }

    #[test]
    fn zero_total_length_stops_scan() {
        let mut raw = encode_frame(Operation::Message, 0, 1, b"a").to_vec();
        raw.extend_from_slice(&[0u8; 16]);
        let scan = scan_frames(Bytes::from(raw));
        assert_eq!(scan.frames.len(), 1);
        assert!(scan.stopped.is_some());
    }

    #[test]
    fn longer_header_is_skipped() {
        let mut raw = Vec::new();
        raw.extend_from_slice(&22u32.to_be_bytes());
        raw.extend_from_slice(&20u16.to_be_bytes());
        raw.extend_from_slice(&0u16.to_be_bytes());
        raw.extend_from_slice(&5u32.to_be_bytes());
        raw.extend_from_slice(&9u32.to_be_bytes());
        raw.extend_from_slice(&[0xAA; 4]);
        raw.extend_from_slice(b"hi");
        let frames = decode_frames(Bytes::from(raw));
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].body.as_ref(), b"hi");
        assert_eq!(frames[0].sequence, 9);
    }

    #[test]
    fn nesting_is_capped() {
        let mut frame = encode_frame(Operation::Message, 0, 0, b"{\"cmd\":\"X\"}");
        for _ in 0..=MAX_UNWRAP_DEPTH {
            frame = encode_frame(Operation::Message, 2, 0, &zlib(&frame));
        }
        let out = unwrap_buffer(frame);
        assert!(out.frames.is_empty());
        assert_eq!(out.errors.len(), 1);
    }

    #[test]
    fn bad_container_drops_only_that_frame() {
        let mut raw = encode_frame(Operation::Message, 2, 0, b"not zlib").to_vec();
        raw.extend_from_slice(&encode_frame(Operation::Message, 0, 0, b"{}"));
        let out = unwrap_buffer(Bytes::from(raw));
        assert_eq!(out.frames.len(), 1);
        assert_eq!(out.errors[0].kind().as_str(), "PAYLOAD_DECOMPRESS");
    }

    #[test]
    fn oversized_inflation_is_rejected() {
        let chunk = vec![0u8; 1024 * 1024];
        let mut enc = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::best());
        for _ in 0..=MAX_INFLATED_BYTES / chunk.len() {
            enc.write_all(&chunk).unwrap();
        }
        let bomb = enc.finish().unwrap();
        assert!(bomb.len() < MAX_INFLATED_BYTES / 100);

        let err = decompress(2, &bomb).unwrap_err();
        assert_eq!(err.kind().as_str(), "PAYLOAD_DECOMPRESS");
        assert!(err.to_string().contains("exceeds"));

        let mut raw = encode_frame(Operation::Message, 2, 0, &bomb).to_vec();
        raw.extend_from_slice(&encode_frame(Operation::Message, 0, 0, b"{}"));
        let out = unwrap_buffer(Bytes::from(raw));
        assert_eq!(out.frames.len(), 1);
        assert_eq!(out.errors.len(), 1);
    }

    #[test]
    fn unknown_operation_is_carried() {
        let frames = decode_frames(encode_frame(Operation::from_u32(99), 1, 0, b""));
        assert_eq!(frames[0].operation, Operation::Unknown(99));
        assert_eq!(frames[0].operation.as_u32(), 99);
    }
}

//! Protocol modules (binary frames + JSON commands).
//!
//! - `packet`: the fixed 16-byte header frame format, with recursive
//!   unwrapping of zlib/brotli containers.
//! - `command`: interpretation of decompressed `Message` bodies into
//!   `ChatEvent`s, plus the auth/heartbeat bodies the client sends.
//!
//! All parsers are panic-free: malformed input ends the scan of the current
//! buffer or drops the one frame, and is reported as `DanmakuError` for
//! logging instead of tearing anything down.

pub mod command;
pub mod packet;

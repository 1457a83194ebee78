//! Decode-once codec for inbound buffers.
//!
//! - Scan frames, unwrapping zlib/brotli containers (bounded depth)
//! - `AuthReply` => accepted/rejected
//! - `Message` => `ChatEvent` (unknown commands dropped)
//! - `HeartbeatReply` => popularity
//! - Anything else is ignored

use bytes::Bytes;

use danmaku_core::error::{DanmakuError, Result};
use danmaku_core::protocol::command::{self, AuthBody, AuthReply, ChatEvent, HEARTBEAT_BODY};
use danmaku_core::protocol::packet::{self, Operation};

/// Sequence number stamped on outbound frames.
const OUT_SEQ: u32 = 1;

#[derive(Debug)]
pub enum Inbound {
    /// `Ok` for code 0, `AuthRejected` otherwise.
    AuthReply(Result<()>),
    Chat(ChatEvent),
    Popularity(u32),
}

#[derive(Debug, Default)]
pub struct Decoded {
    pub items: Vec<Inbound>,
    /// Per-frame failures; already isolated, for logging/metrics only.
    pub errors: Vec<DanmakuError>,
    /// Leaf frames seen, by operation.
    pub ops: Vec<Operation>,
}

pub fn decode(buf: Bytes) -> Decoded {
    let unwrapped = packet::unwrap_buffer(buf);
    let mut out = Decoded {
        errors: unwrapped.errors,
        ..Decoded::default()
    };

    for frame in unwrapped.frames {
        out.ops.push(frame.operation);
        match frame.operation {
            Operation::AuthReply => {
                let res = AuthReply::parse(&frame.body).and_then(AuthReply::into_result);
                out.items.push(Inbound::AuthReply(res));
            }
            Operation::Message => {
                if let Some(ev) = command::parse_command(&frame.body) {
                    out.items.push(Inbound::Chat(ev));
                }
            }
            Operation::HeartbeatReply => match command::parse_popularity(&frame.body) {
                Some(p) => out.items.push(Inbound::Popularity(p)),
                None => out.errors.push(DanmakuError::FrameDecode(format!(
                    "heartbeat reply body too short: {}",
                    frame.body.len()
                ))),
            },
            Operation::Heartbeat | Operation::Auth | Operation::Unknown(_) => {}
        }
    }
    out
}

pub fn auth_frame(room_id: i64, token: &str) -> Result<Bytes> {
    let body = AuthBody::new(room_id, token).to_bytes()?;
    Ok(packet::encode_frame(Operation::Auth, 1, OUT_SEQ, &body))
}

pub fn heartbeat_frame() -> Bytes {
    packet::encode_frame(Operation::Heartbeat, 1, OUT_SEQ, HEARTBEAT_BODY)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::panic)]

    use super::*;

    #[test]
    fn mixed_buffer() {
        let mut buf = packet::encode_frame(Operation::AuthReply, 1, 1, b"{\"code\":0}").to_vec();
        buf.extend_from_slice(&packet::encode_frame(Operation::HeartbeatReply, 1, 1, &[0, 0, 0, 9]));
        buf.extend_from_slice(&packet::encode_frame(Operation::Message, 0, 0, br#"{"cmd":"LIVE"}"#));
        buf.extend_from_slice(&packet::encode_frame(Operation::Message, 0, 0, br#"{"cmd":"NOPE"}"#));
        buf.extend_from_slice(&packet::encode_frame(Operation::Unknown(77), 0, 0, b""));

        let d = decode(Bytes::from(buf));
        assert!(d.errors.is_empty());
        assert_eq!(d.ops.len(), 5);
        assert_eq!(d.items.len(), 3);
        assert!(matches!(d.items[0], Inbound::AuthReply(Ok(()))));
        assert!(matches!(d.items[1], Inbound::Popularity(9)));
        assert!(matches!(d.items[2], Inbound::Chat(_)));
    }

    #[test]
    fn rejected_auth() {
        let d = decode(packet::encode_frame(Operation::AuthReply, 1, 1, b"{\"code\":-101}"));
        match &d.items[0] {
            Inbound::AuthReply(Err(e)) => assert_eq!(e.kind().as_str(), "AUTH_REJECTED"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn outbound_frames() {
        let f = packet::decode_frames(auth_frame(5, "k").unwrap());
        assert_eq!(f[0].operation, Operation::Auth);
        assert_eq!(f[0].version, 1);
        let f = packet::decode_frames(heartbeat_frame());
        assert_eq!(f[0].operation, Operation::Heartbeat);
        assert!(!f[0].body.is_empty());
    }
}

//! Compressed containers all the way down to chat events.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::io::Write;

use bytes::Bytes;

use danmaku_core::protocol::command::{parse_command, parse_popularity, ChatEvent};
use danmaku_core::protocol::packet::{encode_frame, unwrap_buffer, Operation};

use vector_loader::load;

const DANMU: &[u8] = br#"{"cmd":"DANMU_MSG","info":[[0,1,25,16711680],"first",[1,"alice"]]}"#;
const SUPER: &[u8] =
    br#"{"cmd":"SUPER_CHAT_MESSAGE","data":{"user_info":{"uname":"bob"},"message":"second","price":30}}"#;

fn inner_pair() -> Vec<u8> {
    let mut v = encode_frame(Operation::Message, 0, 0, DANMU).to_vec();
    v.extend_from_slice(&encode_frame(Operation::Message, 1, 0, SUPER));
    v
}

fn events(buf: Bytes) -> Vec<ChatEvent> {
    let out = unwrap_buffer(buf);
    assert!(out.errors.is_empty(), "{:?}", out.errors);
    out.frames
        .iter()
        .filter(|f| f.operation == Operation::Message)
        .filter_map(|f| parse_command(&f.body))
        .collect()
}

fn assert_pair(evs: &[ChatEvent]) {
    assert_eq!(evs.len(), 2);
    match &evs[0] {
        ChatEvent::Danmaku(d) => {
            assert_eq!(d.text, "first");
            assert_eq!(d.rgb, 0xFF0000);
        }
        other => panic!("unexpected {other:?}"),
    }
    match &evs[1] {
        ChatEvent::SuperChat(s) => {
            assert_eq!(s.user, "bob");
            assert_eq!(s.text, "second");
            assert_eq!(s.price, 30);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn zlib_container_yields_both_events() {
    let mut enc = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
    enc.write_all(&inner_pair()).unwrap();
    let body = enc.finish().unwrap();
    assert_pair(&events(encode_frame(Operation::Message, 2, 0, &body)));
}

#[test]
fn brotli_container_yields_both_events() {
    let mut w = brotli::CompressorWriter::new(Vec::new(), 4096, 5, 22);
    w.write_all(&inner_pair()).unwrap();
    let body = w.into_inner();
    assert_pair(&events(encode_frame(Operation::Message, 3, 0, &body)));
}

#[test]
fn zlib_vector_from_fixture() {
    let v = load("zlib_container.json");
    let evs = events(Bytes::from(v.frame.decode()));
    assert_eq!(evs.len(), 2);
    assert_eq!(evs[0].text(), "hello");
    assert_eq!(evs[1].text(), "thanks");
}

#[test]
fn corrupt_container_does_not_hide_neighbours() {
    let mut buf = encode_frame(Operation::Message, 2, 0, b"not zlib").to_vec();
    buf.extend_from_slice(&encode_frame(Operation::Message, 0, 0, DANMU));
    let out = unwrap_buffer(Bytes::from(buf));
    assert_eq!(out.frames.len(), 1);
    assert_eq!(out.errors.len(), 1);
    assert_eq!(out.errors[0].kind().as_str(), "PAYLOAD_DECOMPRESS");
}

#[test]
fn heartbeat_reply_popularity() {
    let v = load("heartbeat_reply.json");
    let out = unwrap_buffer(Bytes::from(v.frame.decode()));
    assert_eq!(out.frames[0].operation, Operation::HeartbeatReply);
    assert_eq!(parse_popularity(&out.frames[0].body), Some(1234));
}

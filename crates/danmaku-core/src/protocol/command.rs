//! JSON bodies: the auth/heartbeat frames the client sends and the commands
//! the server pushes inside `Message` frames.
//!
//! Command interpretation is best-effort: an unknown `cmd`, a missing field or
//! malformed JSON yields `None`, never an error. Deployments vary and
//! strictness here would only lose chat lines.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DanmakuError, Result};

/// Colour used when a chat line carries none.
pub const DEFAULT_RGB: u32 = 0x00FF_FFFF;

/// Font size the server reports for normal-sized chat lines.
pub const DEFAULT_FONT_SIZE: i32 = 25;

/// Heartbeat body; the server accepts any non-empty bytes.
pub const HEARTBEAT_BODY: &[u8] = b"[object Object]";

/// Auth frame body.
#[derive(Debug, Clone, Serialize)]
pub struct AuthBody<'a> {
    pub uid: i64,
    pub roomid: i64,
    pub protover: u32,
    pub platform: &'a str,
    #[serde(rename = "type")]
    pub kind: u32,
    pub key: &'a str,
}

impl<'a> AuthBody<'a> {
    pub fn new(room_id: i64, key: &'a str) -> Self {
        Self {
            uid: 0,
            roomid: room_id,
            protover: 3,
            platform: "web",
            kind: 2,
            key,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| DanmakuError::Internal(format!("auth encode: {e}")))
    }
}

/// AuthReply body (`{"code":0}` on success).
#[derive(Debug, Clone, Deserialize)]
pub struct AuthReply {
    pub code: i64,
    #[serde(default)]
    pub msg: Option<String>,
}

impl AuthReply {
    /// Parse an AuthReply body. Unparseable bodies count as a rejection.
    pub fn parse(body: &[u8]) -> Result<Self> {
        serde_json::from_slice(body).map_err(|e| DanmakuError::AuthRejected {
            code: -1,
            msg: format!("unreadable auth reply: {e}"),
        })
    }

    pub fn into_result(self) -> Result<()> {
        if self.code == 0 {
            Ok(())
        } else {
            Err(DanmakuError::AuthRejected {
                code: self.code,
                msg: self.msg.unwrap_or_default(),
            })
        }
    }
}

/// Popularity value carried by a heartbeat reply (first 4 bytes, big-endian).
pub fn parse_popularity(body: &[u8]) -> Option<u32> {
    let head: [u8; 4] = body.get(..4)?.try_into().ok()?;
    Some(u32::from_be_bytes(head))
}

/// How a chat line wants to be displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatMode {
    Scroll,
    Top,
    Bottom,
    Other,
}

impl ChatMode {
    /// Map the numeric mode used in `info[0][1]`.
    pub fn from_wire(v: i64) -> Self {
        match v {
            1..=3 => ChatMode::Scroll,
            4 => ChatMode::Bottom,
            5 => ChatMode::Top,
            _ => ChatMode::Other,
        }
    }
}

/// A regular chat line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Danmaku {
    pub text: String,
    pub rgb: u32,
    pub mode: ChatMode,
    pub font_size: i32,
    pub user: Option<String>,
}

/// A paid, highlighted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuperChat {
    pub user: String,
    pub text: String,
    /// Amount as sent upstream.
    pub price: i64,
    pub rgb: Option<u32>,
}

/// Room-level notice worth surfacing to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusNote {
    pub cmd: String,
    pub text: String,
}

/// One interpreted command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    Danmaku(Danmaku),
    SuperChat(SuperChat),
    StatusNote(StatusNote),
}

impl ChatEvent {
    pub fn text(&self) -> &str {
        match self {
            ChatEvent::Danmaku(d) => &d.text,
            ChatEvent::SuperChat(s) => &s.text,
            ChatEvent::StatusNote(n) => &n.text,
        }
    }
}

/// Interpret one raw `Message` body. `None` means "not for us" or malformed.
pub fn parse_command(body: &[u8]) -> Option<ChatEvent> {
    let v: Value = serde_json::from_slice(body).ok()?;
    parse_value(&v)
}

/// Interpret an already-parsed command object.
pub fn parse_value(v: &Value) -> Option<ChatEvent> {
    let cmd = v.get("cmd")?.as_str()?;

    if cmd.starts_with("DANMU_MSG") {
        return parse_danmu(v).map(ChatEvent::Danmaku);
    }

    match cmd {
        "SUPER_CHAT_MESSAGE" | "SUPER_CHAT_MESSAGE_JPN" => {
            parse_super_chat(v).map(ChatEvent::SuperChat)
        }
        "LIVE" => Some(note(cmd, "live started".into())),
        "PREPARING" => Some(note(cmd, "live ended".into())),
        "CUT_OFF" => {
            let text = match v.get("msg").and_then(Value::as_str) {
                Some(m) if !m.is_empty() => format!("live cut off: {m}"),
                _ => "live cut off".into(),
            };
            Some(note(cmd, text))
        }
        "ROOM_BLOCK_MSG" | "WARNING" => {
            let text = v
                .get("msg")
                .or_else(|| v.get("data").and_then(|d| d.get("msg")))
                .and_then(Value::as_str)?;
            Some(note(cmd, text.to_string()))
        }
        _ => None,
    }
}

fn note(cmd: &str, text: String) -> ChatEvent {
    ChatEvent::StatusNote(StatusNote {
        cmd: cmd.to_string(),
        text,
    })
}

fn parse_danmu(v: &Value) -> Option<Danmaku> {
    let info = v.get("info")?.as_array()?;
    let text = info.get(1)?.as_str()?.to_string();

    let meta = info.first().and_then(Value::as_array);
    let field = |i: usize| meta.and_then(|m| m.get(i)).and_then(Value::as_i64);

    let rgb = field(3)
        .and_then(|c| u32::try_from(c).ok())
        .map(|c| c & 0x00FF_FFFF)
        .unwrap_or(DEFAULT_RGB);
    let mode = field(1).map(ChatMode::from_wire).unwrap_or(ChatMode::Scroll);
    let font_size = field(2)
        .and_then(|s| i32::try_from(s).ok())
        .filter(|s| *s > 0)
        .unwrap_or(DEFAULT_FONT_SIZE);
    let user = info
        .get(2)
        .and_then(Value::as_array)
        .and_then(|u| u.get(1))
        .and_then(Value::as_str)
        .map(str::to_string);

    Some(Danmaku {
        text,
        rgb,
        mode,
        font_size,
        user,
    })
}

fn parse_super_chat(v: &Value) -> Option<SuperChat> {
    let data = v.get("data")?;
    let user = data
        .get("user_info")
        .and_then(|u| u.get("uname"))
        .and_then(Value::as_str)?
        .to_string();
    let text = data.get("message")?.as_str()?.to_string();
    let price = data
        .get("price")
        .and_then(|p| p.as_i64().or_else(|| p.as_f64().map(|f| f as i64)))
        .unwrap_or(0);
    let rgb = data
        .get("background_bottom_color")
        .and_then(Value::as_str)
        .and_then(|s| u32::from_str_radix(s.trim_start_matches('#'), 16).ok());

    Some(SuperChat {
        user,
        text,
        price,
        rgb,
    })
}

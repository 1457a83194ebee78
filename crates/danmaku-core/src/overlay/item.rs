use crate::protocol::command::{ChatEvent, ChatMode, DEFAULT_FONT_SIZE};

/// Where an item is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayMode {
    /// Right-to-left across the viewport.
    Scroll,
    /// Pinned, centred, stacked from the top.
    Top,
    /// Pinned, centred, stacked from the bottom.
    Bottom,
    /// Anything else; laid out like `Scroll`.
    Other,
}

impl From<ChatMode> for DisplayMode {
    fn from(m: ChatMode) -> Self {
        match m {
            ChatMode::Scroll => DisplayMode::Scroll,
            ChatMode::Top => DisplayMode::Top,
            ChatMode::Bottom => DisplayMode::Bottom,
            ChatMode::Other => DisplayMode::Other,
        }
    }
}

/// One overlay line. Immutable once handed to the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayItem {
    /// Position on the playback timeline.
    pub timestamp_ms: i32,
    pub display_mode: DisplayMode,
    pub text: String,
    pub color_argb: u32,
    pub base_font_size: i32,
    /// Upstream block weight; items under `StyleParams::min_weight` are skipped.
    pub weight: i32,
}

impl OverlayItem {
    /// White scrolling line at normal size.
    pub fn scroll(timestamp_ms: i32, text: impl Into<String>) -> Self {
        Self {
            timestamp_ms,
            display_mode: DisplayMode::Scroll,
            text: text.into(),
            color_argb: 0xFFFF_FFFF,
            base_font_size: DEFAULT_FONT_SIZE,
            weight: 0,
        }
    }

    pub fn with_mode(mut self, mode: DisplayMode) -> Self {
        self.display_mode = mode;
        self
    }

    pub fn with_color(mut self, argb: u32) -> Self {
        self.color_argb = argb;
        self
    }

    pub fn with_weight(mut self, weight: i32) -> Self {
        self.weight = weight;
        self
    }

    /// Build an overlay line for a live chat event stamped at `timestamp_ms`.
    ///
    /// Status notes are not drawn; super chats are pinned to the top.
    pub fn from_chat(event: &ChatEvent, timestamp_ms: i32) -> Option<Self> {
        match event {
            ChatEvent::Danmaku(d) => Some(Self {
                timestamp_ms,
                display_mode: d.mode.into(),
                text: d.text.clone(),
                color_argb: 0xFF00_0000 | (d.rgb & 0x00FF_FFFF),
                base_font_size: d.font_size,
                weight: 0,
            }),
            ChatEvent::SuperChat(s) => Some(Self {
                timestamp_ms,
                display_mode: DisplayMode::Top,
                text: format!("{}: {}", s.user, s.text),
                color_argb: 0xFF00_0000 | (s.rgb.unwrap_or(0x00FF_D700) & 0x00FF_FFFF),
                base_font_size: DEFAULT_FONT_SIZE,
                weight: 0,
            }),
            ChatEvent::StatusNote(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::protocol::command::{Danmaku, StatusNote, SuperChat};

    #[test]
    fn chat_events_map_to_items() {
        let d = ChatEvent::Danmaku(Danmaku {
            text: "hi".into(),
            rgb: 0x123456,
            mode: ChatMode::Bottom,
            font_size: 25,
            user: None,
        });
        let item = OverlayItem::from_chat(&d, 900).unwrap();
        assert_eq!(item.timestamp_ms, 900);
        assert_eq!(item.color_argb, 0xFF12_3456);
        assert_eq!(item.display_mode, DisplayMode::Bottom);

        let sc = ChatEvent::SuperChat(SuperChat {
            user: "bob".into(),
            text: "thanks".into(),
            price: 30,
            rgb: None,
        });
        let item = OverlayItem::from_chat(&sc, 0).unwrap();
        assert_eq!(item.text, "bob: thanks");
        assert_eq!(item.display_mode, DisplayMode::Top);

        let note = ChatEvent::StatusNote(StatusNote {
            cmd: "LIVE".into(),
            text: "live started".into(),
        });
        assert!(OverlayItem::from_chat(&note, 0).is_none());
    }
}

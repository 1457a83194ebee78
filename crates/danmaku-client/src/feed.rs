//! Network → render hand-off.
//!
//! The client actor pushes chat events into a bounded queue without ever
//! touching scheduler state; the render loop owns a `LiveOverlay` that drains
//! the queue at the top of every tick, stamps each event with the current
//! playback position and feeds it to the scheduler.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};

use danmaku_core::overlay::{OverlayItem, OverlayScheduler, Placement, StyleParams, Viewport};
use danmaku_core::protocol::command::ChatEvent;

use crate::obs::ClientMetrics;

pub const FEED_CAPACITY: usize = 512;

/// Consumed items kept before the live list is compacted.
const COMPACT_AFTER: usize = 1024;

/// Producer half, held by the client runtime. Lossy when full.
#[derive(Clone)]
pub struct FeedSender {
    tx: mpsc::Sender<ChatEvent>,
    metrics: Option<Arc<ClientMetrics>>,
}

impl std::fmt::Debug for FeedSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedSender").field("capacity", &self.tx.max_capacity()).finish()
    }
}

impl FeedSender {
    pub fn with_metrics(mut self, metrics: Arc<ClientMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Returns false when the event was dropped (queue full or overlay gone).
    pub fn push(&self, event: ChatEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                if let Some(m) = &self.metrics {
                    m.events_dropped.inc(&[("sink", "overlay")]);
                }
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

/// Render-side owner of the scheduler and the feed receiver.
pub struct LiveOverlay {
    rx: mpsc::Receiver<ChatEvent>,
    scheduler: OverlayScheduler,
    disconnected: bool,
}

impl std::fmt::Debug for LiveOverlay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveOverlay")
            .field("scheduler", &self.scheduler)
            .field("disconnected", &self.disconnected)
            .finish()
    }
}

pub fn overlay_feed(capacity: usize) -> (FeedSender, LiveOverlay) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        FeedSender { tx, metrics: None },
        LiveOverlay {
            rx,
            scheduler: OverlayScheduler::new(),
            disconnected: false,
        },
    )
}

impl LiveOverlay {
    /// Swap in a scheduler (e.g. one with a real text measurer).
    pub fn with_scheduler(mut self, scheduler: OverlayScheduler) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Drain queued events, then advance the scheduler.
    pub fn tick(&mut self, viewport: Viewport, position_ms: i32, style: &StyleParams) -> Vec<Placement> {
        self.drain(position_ms);
        self.scheduler.tick(viewport, position_ms, style)
    }

    /// Move everything queued so far into the scheduler. Returns how many
    /// items were accepted.
    pub fn drain(&mut self, position_ms: i32) -> usize {
        let mut accepted = 0;
        loop {
            match self.rx.try_recv() {
                Ok(ev) => {
                    if let Some(item) = OverlayItem::from_chat(&ev, position_ms) {
                        self.scheduler.push_live(item);
                        accepted += 1;
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if !self.disconnected {
                        tracing::debug!("overlay feed producer gone");
                        self.disconnected = true;
                    }
                    break;
                }
            }
        }
        if self.scheduler.cursor() >= COMPACT_AFTER {
            self.scheduler.compact();
        }
        accepted
    }

    pub fn scheduler(&self) -> &OverlayScheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut OverlayScheduler {
        &mut self.scheduler
    }

    /// True once every `FeedSender` has been dropped.
    pub fn is_disconnected(&self) -> bool {
        self.disconnected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use danmaku_core::protocol::command::{ChatMode, Danmaku, StatusNote, DEFAULT_FONT_SIZE, DEFAULT_RGB};

    fn chat(text: &str) -> ChatEvent {
        ChatEvent::Danmaku(Danmaku {
            text: text.to_string(),
            rgb: DEFAULT_RGB,
            mode: ChatMode::Scroll,
            font_size: DEFAULT_FONT_SIZE,
            user: None,
        })
    }

    #[test]
    fn drained_items_show_on_the_same_tick() {
        let (tx, mut overlay) = overlay_feed(8);
        assert!(tx.push(chat("hi")));
        assert!(tx.push(ChatEvent::StatusNote(StatusNote {
            cmd: "LIVE".into(),
            text: "live started".into(),
        })));

        let out = overlay.tick(Viewport::new(1000.0, 300.0), 10_000, &StyleParams::default());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].item.text, "hi");
        assert_eq!(out[0].item.timestamp_ms, 10_000);
        assert_eq!(overlay.scheduler().len(), 1);
    }

    #[test]
    fn full_queue_drops_and_counts() {
        let metrics = Arc::new(ClientMetrics::default());
        let (tx, _overlay) = overlay_feed(2);
        let tx = tx.with_metrics(Arc::clone(&metrics));
        assert!(tx.push(chat("a")));
        assert!(tx.push(chat("b")));
        assert!(!tx.push(chat("c")));
        assert_eq!(metrics.events_dropped.get(&[("sink", "overlay")]), 1);
    }

    #[test]
    fn disconnect_is_noticed() {
        let (tx, mut overlay) = overlay_feed(2);
        drop(tx);
        assert_eq!(overlay.drain(0), 0);
        assert!(overlay.is_disconnected());
    }
}

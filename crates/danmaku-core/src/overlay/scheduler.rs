//! Lane scheduler.
//!
//! Per tick, in order:
//! 1. detect a timeline jump (> `SEEK_JUMP_MS`) and reset as if `seek_to`
//!    had been called;
//! 2. evict slots that have expired, run backwards, or scrolled off;
//! 3. retry pending items whose retry time has come, dropping stale ones;
//! 4. ingest newly due items from the sorted list;
//! 5. emit one `Placement` per active slot.
//!
//! Scroll lanes guarantee that two lines sharing a lane never overlap while
//! both are visible: a line is only admitted behind every occupant it could
//! catch before that occupant leaves the screen. Items that find no lane wait
//! in a bounded pending queue and are shed once too old.

use std::collections::VecDeque;
use std::sync::Arc;

use super::item::{DisplayMode, OverlayItem};
use super::measure::{ApproxMeasure, TextMeasure};
use super::style::{LaneLayout, StyleParams, Viewport};

/// Pending queue capacity; the oldest entry is dropped on overflow.
pub const MAX_PENDING: usize = 260;
/// Delay between placement attempts for a pending item.
pub const RETRY_INTERVAL_MS: i32 = 220;
/// Pending items older than this are abandoned.
pub const MAX_DELAY_MS: i32 = 1600;
/// A position change larger than this between ticks counts as a seek.
pub const SEEK_JUMP_MS: i32 = 3000;
/// On-screen time of pinned (top/bottom) items.
pub const PINNED_DURATION_MS: i32 = 4000;

/// Which lane set a placement belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Band {
    Scroll,
    Top,
    Bottom,
}

impl Band {
    fn of(mode: DisplayMode) -> Self {
        match mode {
            DisplayMode::Top => Band::Top,
            DisplayMode::Bottom => Band::Bottom,
            DisplayMode::Scroll | DisplayMode::Other => Band::Scroll,
        }
    }
}

/// One item to draw this frame.
#[derive(Debug, Clone)]
pub struct Placement {
    pub item: Arc<OverlayItem>,
    pub band: Band,
    pub lane: usize,
    /// Left edge in pixels.
    pub x: f32,
    /// Top edge in pixels.
    pub y: f32,
    pub text_width_px: f32,
    /// Item colour with the style opacity applied.
    pub color_argb: u32,
}

#[derive(Debug, Clone)]
struct ActiveSlot {
    item: Arc<OverlayItem>,
    text_width_px: f32,
    px_per_ms: f32,
    duration_ms: i32,
    /// Timeline position the slot's motion is measured from.
    start_ms: i32,
}

impl ActiveSlot {
    fn elapsed(&self, now: i32) -> i32 {
        now.saturating_sub(self.start_ms)
    }

    fn remaining(&self, now: i32) -> i32 {
        self.duration_ms.saturating_sub(self.elapsed(now))
    }

    fn left(&self, now: i32, viewport_w: f32) -> f32 {
        match Band::of(self.item.display_mode) {
            Band::Scroll => viewport_w - self.elapsed(now).max(0) as f32 * self.px_per_ms,
            Band::Top | Band::Bottom => (viewport_w - self.text_width_px) / 2.0,
        }
    }

    fn is_live(&self, now: i32, viewport_w: f32) -> bool {
        let elapsed = self.elapsed(now);
        elapsed >= 0
            && elapsed < self.duration_ms
            && self.left(now, viewport_w) + self.text_width_px >= 0.0
    }
}

/// Outcome of one placement attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Spawn {
    Placed,
    /// Every lane of the band is occupied.
    Blocked,
    /// Nothing left of the item's lifetime at its start time.
    Expired,
}

#[derive(Debug, Clone)]
struct PendingSlot {
    item: Arc<OverlayItem>,
    first_attempt_ms: i32,
    next_attempt_ms: i32,
}

/// Per-tick inputs shared by the spawn helpers.
struct Frame {
    now: i32,
    viewport: Viewport,
    layout: LaneLayout,
    font_size_px: f32,
    scroll_duration_ms: i32,
}

/// Collision-free overlay layout engine.
pub struct OverlayScheduler {
    items: Vec<Arc<OverlayItem>>,
    cursor: usize,
    scroll_lanes: Vec<Vec<ActiveSlot>>,
    top_lanes: Vec<Option<ActiveSlot>>,
    bottom_lanes: Vec<Option<ActiveSlot>>,
    pending: VecDeque<PendingSlot>,
    last_position: Option<i32>,
    measure: Box<dyn TextMeasure>,
    dropped: u64,
}

impl Default for OverlayScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for OverlayScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlayScheduler")
            .field("items", &self.items.len())
            .field("cursor", &self.cursor)
            .field("active", &self.active_count())
            .field("pending", &self.pending.len())
            .field("last_position", &self.last_position)
            .finish()
    }
}

impl OverlayScheduler {
    pub fn new() -> Self {
        Self::with_measure(Box::new(ApproxMeasure))
    }

    pub fn with_measure(measure: Box<dyn TextMeasure>) -> Self {
        Self {
            items: Vec::new(),
            cursor: 0,
            scroll_lanes: Vec::new(),
            top_lanes: Vec::new(),
            bottom_lanes: Vec::new(),
            pending: VecDeque::new(),
            last_position: None,
            measure,
            dropped: 0,
        }
    }

    /// Replace the whole timeline (on-demand mode). Sorts if needed and
    /// repositions at the last known playback position.
    pub fn set_items(&mut self, mut items: Vec<OverlayItem>) {
        items.sort_by_key(|i| i.timestamp_ms);
        self.items = items.into_iter().map(Arc::new).collect();
        let pos = self.last_position.unwrap_or(i32::MIN);
        self.seek_to(pos);
        if pos == i32::MIN {
            self.last_position = None;
        }
    }

    /// Append one live item, keeping the list sorted.
    ///
    /// An item stamped behind the ingestion cursor is queued for placement
    /// directly instead of being silently skipped.
    pub fn push_live(&mut self, item: OverlayItem) {
        let ts = item.timestamp_ms;
        let item = Arc::new(item);
        let idx = self.items.partition_point(|i| i.timestamp_ms <= ts);
        self.items.insert(idx, Arc::clone(&item));
        if idx < self.cursor {
            self.cursor += 1;
            let now = self.last_position.unwrap_or(ts);
            self.defer(item, now, now);
        }
    }

    /// Drop items the cursor has already passed. Live mode only: a later seek
    /// backwards will not find them again.
    pub fn compact(&mut self) {
        self.items.drain(..self.cursor);
        self.cursor = 0;
    }

    /// Explicit timeline jump: clears all active and pending state.
    pub fn seek_to(&mut self, position_ms: i32) {
        for lane in &mut self.scroll_lanes {
            lane.clear();
        }
        self.top_lanes.iter_mut().for_each(|l| *l = None);
        self.bottom_lanes.iter_mut().for_each(|l| *l = None);
        self.pending.clear();
        self.cursor = self.items.partition_point(|i| i.timestamp_ms < position_ms);
        self.last_position = Some(position_ms);
    }

    /// Advance to `position_ms` and return everything to draw this frame.
    pub fn tick(&mut self, viewport: Viewport, position_ms: i32, style: &StyleParams) -> Vec<Placement> {
        if let Some(last) = self.last_position {
            if (i64::from(position_ms) - i64::from(last)).abs() > i64::from(SEEK_JUMP_MS) {
                tracing::debug!(from = last, to = position_ms, "overlay timeline jump");
                self.seek_to(position_ms);
            }
        }
        self.last_position = Some(position_ms);

        let layout = LaneLayout::compute(viewport, style);
        self.fit_lanes(layout.lane_count);

        let frame = Frame {
            now: position_ms,
            viewport,
            layout,
            font_size_px: style.font_size_px,
            scroll_duration_ms: style.scroll_duration_ms(),
        };

        self.evict(&frame);
        self.retry_pending(&frame);
        self.ingest(&frame, style.min_weight);
        self.placements(&frame, style)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Index of the next item to ingest.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn active_count(&self) -> usize {
        self.scroll_lanes.iter().map(Vec::len).sum::<usize>()
            + self.top_lanes.iter().flatten().count()
            + self.bottom_lanes.iter().flatten().count()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Items abandoned because they waited too long or overflowed the queue.
    pub fn dropped_count(&self) -> u64 {
        self.dropped
    }

    fn fit_lanes(&mut self, count: usize) {
        if self.scroll_lanes.len() != count {
            self.scroll_lanes.resize_with(count, Vec::new);
            self.top_lanes.resize(count, None);
            self.bottom_lanes.resize(count, None);
        }
    }

    fn evict(&mut self, f: &Frame) {
        let (now, w) = (f.now, f.viewport.width);
        for lane in &mut self.scroll_lanes {
            lane.retain(|s| s.is_live(now, w));
        }
        for slot in self.top_lanes.iter_mut().chain(self.bottom_lanes.iter_mut()) {
            if slot.as_ref().is_some_and(|s| !s.is_live(now, w)) {
                *slot = None;
            }
        }
    }

    fn retry_pending(&mut self, f: &Frame) {
        let mut waiting = VecDeque::with_capacity(self.pending.len());
        while let Some(mut p) = self.pending.pop_front() {
            if f.now.saturating_sub(p.first_attempt_ms) > MAX_DELAY_MS {
                self.dropped += 1;
                continue;
            }
            if f.now < p.next_attempt_ms {
                waiting.push_back(p);
                continue;
            }
            // Late items start their motion now rather than mid-screen.
            match self.spawn(&p.item, f.now, f) {
                Spawn::Placed => continue,
                Spawn::Expired => {
                    self.dropped += 1;
                    continue;
                }
                Spawn::Blocked => {}
            }
            p.next_attempt_ms = f.now.saturating_add(RETRY_INTERVAL_MS);
            waiting.push_back(p);
        }
        self.pending = waiting;
    }

    fn ingest(&mut self, f: &Frame, min_weight: i32) {
        let oldest = f.now.saturating_sub(f.scroll_duration_ms);
        while let Some(item) = self.items.get(self.cursor) {
            if item.timestamp_ms > f.now {
                break;
            }
            let item = Arc::clone(item);
            self.cursor += 1;
            if item.timestamp_ms < oldest || item.weight < min_weight {
                continue;
            }
            // Expired items were too late to matter; only blocked ones wait.
            if self.spawn(&item, item.timestamp_ms, f) == Spawn::Blocked {
                self.defer(item, f.now, f.now.saturating_add(RETRY_INTERVAL_MS));
            }
        }
    }

    fn defer(&mut self, item: Arc<OverlayItem>, now: i32, next_attempt_ms: i32) {
        if self.pending.len() >= MAX_PENDING {
            self.pending.pop_front();
            self.dropped += 1;
        }
        self.pending.push_back(PendingSlot {
            item,
            first_attempt_ms: now,
            next_attempt_ms,
        });
    }

    /// Try to place `item` with its motion starting at `start_ms`.
    fn spawn(&mut self, item: &Arc<OverlayItem>, start_ms: i32, f: &Frame) -> Spawn {
        let text_width_px = self.measure.width(&item.text, f.font_size_px);
        let band = Band::of(item.display_mode);
        let duration_ms = match band {
            Band::Scroll => f.scroll_duration_ms,
            Band::Top | Band::Bottom => PINNED_DURATION_MS,
        };
        let slot = ActiveSlot {
            item: Arc::clone(item),
            text_width_px,
            px_per_ms: (f.viewport.width + text_width_px) / duration_ms as f32,
            duration_ms,
            start_ms,
        };
        if !slot.is_live(f.now, f.viewport.width) {
            return Spawn::Expired;
        }

        let placed = match band {
            Band::Scroll => {
                let lane = self
                    .scroll_lanes
                    .iter()
                    .position(|lane| admits(lane, &slot, f));
                match lane.and_then(|l| self.scroll_lanes.get_mut(l)) {
                    Some(lane) => {
                        lane.push(slot);
                        true
                    }
                    None => false,
                }
            }
            Band::Top => place_pinned(&mut self.top_lanes, slot, f.now),
            Band::Bottom => place_pinned(&mut self.bottom_lanes, slot, f.now),
        };
        if placed {
            Spawn::Placed
        } else {
            Spawn::Blocked
        }
    }

    fn placements(&self, f: &Frame, style: &StyleParams) -> Vec<Placement> {
        let (now, w) = (f.now, f.viewport.width);
        let lane_h = f.layout.lane_height;
        let mut out = Vec::with_capacity(self.active_count());

        let mut emit = |s: &ActiveSlot, band: Band, lane: usize, y: f32| {
            out.push(Placement {
                item: Arc::clone(&s.item),
                band,
                lane,
                x: s.left(now, w),
                y,
                text_width_px: s.text_width_px,
                color_argb: style.apply_opacity(s.item.color_argb),
            });
        };

        for (lane, slots) in self.scroll_lanes.iter().enumerate() {
            for s in slots {
                emit(s, Band::Scroll, lane, lane as f32 * lane_h);
            }
        }
        for (lane, s) in self.top_lanes.iter().enumerate() {
            if let Some(s) = s {
                emit(s, Band::Top, lane, lane as f32 * lane_h);
            }
        }
        for (lane, s) in self.bottom_lanes.iter().enumerate() {
            if let Some(s) = s {
                emit(s, Band::Bottom, lane, f.viewport.height - (lane + 1) as f32 * lane_h);
            }
        }
        out
    }
}

/// Whether `new` can enter a scroll lane without ever touching an occupant
/// while that occupant is still on screen.
fn admits(lane: &[ActiveSlot], new: &ActiveSlot, f: &Frame) -> bool {
    let (now, w) = (f.now, f.viewport.width);
    let new_left = new.left(now, w);
    lane.iter().all(|prev| {
        let remaining = prev.remaining(now);
        if remaining <= 0 {
            return true;
        }
        let tail = prev.left(now, w) + prev.text_width_px;
        let gap = new_left - tail - f.layout.margin;
        if gap < 0.0 {
            return false;
        }
        new.px_per_ms <= prev.px_per_ms || gap >= (new.px_per_ms - prev.px_per_ms) * remaining as f32
    })
}

fn place_pinned(lanes: &mut [Option<ActiveSlot>], slot: ActiveSlot, now: i32) -> bool {
    let free = lanes
        .iter_mut()
        .find(|l| l.as_ref().map_or(true, |s| s.remaining(now) <= 0));
    match free {
        Some(l) => {
            *l = Some(slot);
            true
        }
        None => false,
    }
}

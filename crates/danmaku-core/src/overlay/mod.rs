//! Overlay lane engine.
//!
//! Lays time-stamped chat lines out on a scrolling canvas so that no two
//! visible lines in the same lane overlap. The engine is single-threaded and
//! runtime-free: the render loop calls `OverlayScheduler::tick` once per
//! frame and draws whatever comes back.

pub mod item;
pub mod measure;
pub mod scheduler;
pub mod style;

pub use item::{DisplayMode, OverlayItem};
pub use measure::{ApproxMeasure, TextMeasure};
pub use scheduler::{Band, OverlayScheduler, Placement};
pub use style::{LaneLayout, StyleParams, Viewport};

//! Top-level facade crate.
//!
//! Re-exports the protocol/overlay core and the tokio client so users can
//! depend on a single crate.

pub mod core {
    pub use danmaku_core::*;
}

pub mod client {
    pub use danmaku_client::*;
}

pub use danmaku_client::{spawn, ClientEvent, ClientHandle, ClientOptions, ConnState};
pub use danmaku_core::overlay::{OverlayItem, OverlayScheduler, Placement, StyleParams, Viewport};
pub use danmaku_core::{DanmakuError, Result};

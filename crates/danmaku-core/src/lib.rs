//! danmaku core: wire codec, command interpretation, and the overlay lane
//! scheduler.
//!
//! This crate holds everything that can be expressed without a runtime: the
//! binary frame format of the live broadcast protocol, the mapping from JSON
//! commands to chat events, and the collision-free overlay layout engine. It
//! carries no transport or async dependencies so the render side can use it
//! on its own.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! Malformed server data surfaces as `DanmakuError` or is dropped, never as a
//! crash.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod overlay;
pub mod protocol;

/// Shared result type.
pub use error::{DanmakuError, Result};

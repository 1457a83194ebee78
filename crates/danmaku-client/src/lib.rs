//! Live danmaku client.
//!
//! Wires the connection state machine, its tokio actor, the WebSocket
//! transport, the upstream provider seam and the overlay feed. Consumed by
//! the `danmaku-client` binary and by integration tests.

pub mod client;
pub mod config;
pub mod feed;
pub mod obs;
pub mod transport;
pub mod upstream;

pub use client::{spawn, ClientEvent, ClientHandle, ClientOptions, ConnState};
pub use feed::{overlay_feed, FeedSender, LiveOverlay, FEED_CAPACITY};
pub use obs::ClientMetrics;
pub use upstream::{ConnectionInfo, ConnectionInfoProvider, ConnectionTarget, StaticProvider};

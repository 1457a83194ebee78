//! Transport layer (WebSocket client).
//!
//! `link` defines the seam the connection runtime talks to, `ws` is the
//! tokio-tungstenite implementation, and `codec` decodes inbound buffers
//! once into the items the runtime acts on.

pub mod codec;
pub mod link;
pub mod ws;

pub use link::{Link, LinkEvent, OpenRequest, Outbound, Transport};
pub use ws::WsTransport;

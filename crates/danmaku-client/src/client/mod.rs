//! ProtocolClient: one logical live-room connection.
//!
//! `machine` decides, `runtime` acts.

pub mod machine;
pub mod runtime;

pub use machine::{backoff_delay, ConnState, Effect, Input, Machine};
pub use runtime::{spawn, ClientEvent, ClientHandle, ClientOptions};

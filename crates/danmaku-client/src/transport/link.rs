use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use danmaku_core::error::Result;

/// What the runtime needs to open one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenRequest {
    pub url: String,
    pub user_agent: String,
    pub referer: String,
}

/// Writes queued towards the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Binary(Bytes),
    /// Close with a normal close code, then stop writing.
    Close,
}

/// Events coming back from the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Binary(Bytes),
    /// Read/write failure or close from either side. Always the last event.
    Closed(String),
}

/// One open connection: a write queue and an event stream.
///
/// Dropping both halves tears the connection down.
#[derive(Debug)]
pub struct Link {
    pub outbound: mpsc::Sender<Outbound>,
    pub events: mpsc::Receiver<LinkEvent>,
}

/// Opens connections. Implementations spawn their own reader/writer tasks.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self, req: &OpenRequest) -> Result<Link>;
}

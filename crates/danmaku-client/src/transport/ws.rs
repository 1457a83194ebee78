//! WebSocket transport on tokio-tungstenite.
//!
//! Responsibilities:
//! - Build the upgrade request (User-Agent + Referer headers)
//! - Split the socket into a writer task (fed by `Outbound`) and a reader
//!   task (producing `LinkEvent`)
//! - Report any read/write failure as a final `LinkEvent::Closed`

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

use danmaku_core::error::{DanmakuError, Result};

use super::link::{Link, LinkEvent, OpenRequest, Outbound, Transport};

/// Per-connection queue depth (both directions).
const LINK_QUEUE: usize = 256;

#[derive(Debug, Clone, Default)]
pub struct WsTransport;

impl WsTransport {
    pub fn new() -> Self {
        Self
    }
}

fn header_value(v: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(v).map_err(|e| DanmakuError::BadConfig(format!("invalid header value: {e}")))
}

#[async_trait]
impl Transport for WsTransport {
    async fn open(&self, req: &OpenRequest) -> Result<Link> {
        let mut request = req
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| DanmakuError::TransportFailure(format!("bad url {}: {e}", req.url)))?;
        let headers = request.headers_mut();
        headers.insert(header::USER_AGENT, header_value(&req.user_agent)?);
        headers.insert(header::REFERER, header_value(&req.referer)?);

        let (socket, _resp) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| DanmakuError::TransportFailure(format!("connect {}: {e}", req.url)))?;
        tracing::debug!(url = %req.url, "websocket open");

        let (mut ws_tx, mut ws_rx) = socket.split();
        let (out_tx, mut out_rx) = mpsc::channel::<Outbound>(LINK_QUEUE);
        let (ev_tx, ev_rx) = mpsc::channel::<LinkEvent>(LINK_QUEUE);

        // writer
        let writer_ev = ev_tx.clone();
        tokio::spawn(async move {
            while let Some(out) = out_rx.recv().await {
                match out {
                    Outbound::Binary(b) => {
                        if let Err(e) = ws_tx.send(Message::Binary(b.to_vec())).await {
                            let _ = writer_ev.send(LinkEvent::Closed(format!("write failed: {e}"))).await;
                            break;
                        }
                    }
                    Outbound::Close => {
                        let frame = CloseFrame {
                            code: CloseCode::Normal,
                            reason: "".into(),
                        };
                        let _ = ws_tx.send(Message::Close(Some(frame))).await;
                        let _ = ws_tx.close().await;
                        break;
                    }
                }
            }
        });

        // reader
        tokio::spawn(async move {
            let reason = loop {
                match ws_rx.next().await {
                    Some(Ok(Message::Binary(b))) => {
                        if ev_tx.send(LinkEvent::Binary(Bytes::from(b))).await.is_err() {
                            return;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        break match frame {
                            Some(f) => format!("closed by server: {} {}", u16::from(f.code), f.reason),
                            None => "closed by server".to_string(),
                        };
                    }
                    // text, ping/pong (pongs are answered by tungstenite)
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => break format!("read failed: {e}"),
                    None => break "stream ended".to_string(),
                }
            };
            let _ = ev_tx.send(LinkEvent::Closed(reason)).await;
        });

        Ok(Link {
            outbound: out_tx,
            events: ev_rx,
        })
    }
}

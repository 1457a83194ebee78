//! danmaku-client
//!
//! Connects to one live room using the static upstream section of the config,
//! logs chat traffic and drives a headless overlay at 60 Hz.
//!
//! Usage: `danmaku-client [config.yaml]` (default `danmaku.yaml`).
//! Log filter comes from `RUST_LOG`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::{Instant, MissedTickBehavior};
use tracing_subscriber::{fmt, EnvFilter};

use danmaku_client::client::{self, ClientEvent, ClientOptions};
use danmaku_client::config;
use danmaku_client::feed::{overlay_feed, LiveOverlay, FEED_CAPACITY};
use danmaku_client::obs::ClientMetrics;
use danmaku_client::transport::WsTransport;
use danmaku_client::upstream::StaticProvider;
use danmaku_core::error::Result;
use danmaku_core::overlay::{StyleParams, Viewport};
use danmaku_core::protocol::command::ChatEvent;

const FRAME_INTERVAL: Duration = Duration::from_micros(16_667);
const REPORT_EVERY_FRAMES: u64 = 300;

#[tokio::main]
async fn main() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let path = std::env::args().nth(1).unwrap_or_else(|| "danmaku.yaml".to_string());
    if let Err(e) = run(&path).await {
        tracing::error!(error = %e, kind = e.kind().as_str(), "danmaku-client failed");
        std::process::exit(1);
    }
}

async fn run(path: &str) -> Result<()> {
    let cfg = config::load_from_file(path)?;
    let metrics = Arc::new(ClientMetrics::default());

    let (feed, overlay) = overlay_feed(FEED_CAPACITY);
    let feed = feed.with_metrics(Arc::clone(&metrics));
    let provider = Arc::new(StaticProvider::new(cfg.upstream.connection_info()));
    let transport = Arc::new(WsTransport::new());

    let (handle, mut events) = client::spawn(
        ClientOptions::from_config(&cfg),
        provider,
        transport,
        Arc::clone(&metrics),
        Some(feed),
    );

    let (stop_tx, stop_rx) = oneshot::channel();
    let render = tokio::spawn(render_loop(overlay, cfg.overlay.style(), stop_rx));

    tracing::info!(room_id = cfg.client.room_id, "danmaku-client starting");
    handle.connect().await?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            ev = events.recv() => match ev {
                Some(ev) => log_event(&ev),
                None => break,
            },
            _ = &mut ctrl_c => {
                tracing::info!("ctrl-c received, closing");
                break;
            }
        }
    }

    handle.close().await;
    let _ = stop_tx.send(());
    let _ = render.await;

    tracing::info!(metrics = %metrics.render(), "final metrics");
    Ok(())
}

fn log_event(ev: &ClientEvent) {
    match ev {
        ClientEvent::Status { state, reason } => {
            tracing::info!(state = state.as_str(), %reason, "status");
        }
        ClientEvent::Chat(ChatEvent::Danmaku(d)) => {
            tracing::info!(user = d.user.as_deref().unwrap_or("-"), text = %d.text, "danmaku");
        }
        ClientEvent::Chat(ChatEvent::SuperChat(s)) => {
            tracing::info!(user = %s.user, price = s.price, text = %s.text, "super chat");
        }
        ClientEvent::Chat(ChatEvent::StatusNote(n)) => {
            tracing::info!(cmd = %n.cmd, text = %n.text, "room status");
        }
        ClientEvent::Popularity(p) => tracing::debug!(popularity = p, "heartbeat reply"),
    }
}

async fn render_loop(mut overlay: LiveOverlay, style: StyleParams, mut stop: oneshot::Receiver<()>) {
    let viewport = Viewport::new(1280.0, 720.0);
    let started = Instant::now();
    let mut ticker = tokio::time::interval(FRAME_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut frames: u64 = 0;

    loop {
        tokio::select! {
            _ = &mut stop => break,
            _ = ticker.tick() => {
                let position_ms = i32::try_from(started.elapsed().as_millis()).unwrap_or(i32::MAX);
                let drawn = overlay.tick(viewport, position_ms, &style);
                frames += 1;
                if frames % REPORT_EVERY_FRAMES == 0 {
                    let s = overlay.scheduler();
                    tracing::debug!(
                        drawn = drawn.len(),
                        active = s.active_count(),
                        pending = s.pending_count(),
                        dropped = s.dropped_count(),
                        "overlay"
                    );
                }
            }
        }
    }
}

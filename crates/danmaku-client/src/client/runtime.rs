//! Connection actor.
//!
//! One tokio task owns the `Machine`, the current link and every timer.
//! Everything else (handle calls, timer ticks, finished opens, fetched
//! connection info) reaches it as a message on a single inbox, so
//! transitions never run concurrently.
//!
//! - Timers are spawned tasks; their `AbortHandle` lives in one slot per
//!   purpose and is aborted before replacement. Each tick carries a sequence
//!   number so a tick that raced its own cancellation is ignored.
//! - Opens carry a generation; a link that finishes opening after it was
//!   superseded (reconnect, close) is dropped on arrival.
//! - Chat/status events go out through a bounded queue with `try_send`.
//!   A slow consumer loses events, it never stalls the connection.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::AbortHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::Instrument;

use danmaku_core::error::{DanmakuError, Result};
use danmaku_core::protocol::command::ChatEvent;

use crate::client::machine::{ConnState, Effect, Input, Machine};
use crate::config::ClientConfig;
use crate::feed::FeedSender;
use crate::obs::ClientMetrics;
use crate::transport::codec::{self, Inbound};
use crate::transport::{Link, LinkEvent, OpenRequest, Outbound, Transport};
use crate::upstream::{ConnectionInfo, ConnectionInfoProvider, ConnectionTarget};

const INBOX_CAPACITY: usize = 256;

/// Runtime knobs, usually derived from `ClientConfig`.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub room_id: i64,
    pub heartbeat_interval: Duration,
    pub auth_timeout: Duration,
    pub max_backoff_secs: u64,
    pub user_agent: String,
    pub referer: String,
    pub default_host: String,
    pub event_buffer: usize,
}

impl ClientOptions {
    pub fn new(room_id: i64) -> Self {
        Self {
            room_id,
            heartbeat_interval: Duration::from_secs(30),
            auth_timeout: Duration::from_secs(6),
            max_backoff_secs: 10,
            user_agent: "Mozilla/5.0".to_string(),
            referer: format!("https://live.bilibili.com/{room_id}"),
            default_host: "broadcastlv.chat.bilibili.com".to_string(),
            event_buffer: 1024,
        }
    }

    pub fn from_config(cfg: &ClientConfig) -> Self {
        let c = &cfg.client;
        Self {
            room_id: c.room_id,
            heartbeat_interval: c.heartbeat_interval(),
            auth_timeout: c.auth_timeout(),
            max_backoff_secs: c.max_backoff_secs,
            user_agent: c.user_agent.clone(),
            referer: format!("{}/{}", c.referer_origin.trim_end_matches('/'), c.room_id),
            default_host: c.default_host.clone(),
            event_buffer: c.event_buffer,
        }
    }
}

/// What consumers see.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    Status { state: ConnState, reason: String },
    Chat(ChatEvent),
    Popularity(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerKind {
    Heartbeat,
    AuthTimeout,
    Reconnect,
}

impl TimerKind {
    fn as_str(self) -> &'static str {
        match self {
            TimerKind::Heartbeat => "heartbeat",
            TimerKind::AuthTimeout => "auth_timeout",
            TimerKind::Reconnect => "reconnect",
        }
    }
}

enum Msg {
    Connect,
    Close(oneshot::Sender<()>),
    Info(Result<ConnectionInfo>),
    Opened { generation: u64, result: Result<Link> },
    Timer { kind: TimerKind, seq: u64 },
}

/// State readable from any thread without going through the actor.
#[derive(Debug)]
struct Shared {
    state: AtomicU8,
    closed: AtomicBool,
}

/// Cloneable control handle.
#[derive(Clone)]
pub struct ClientHandle {
    tx: mpsc::Sender<Msg>,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientHandle").field("state", &self.state()).finish()
    }
}

impl ClientHandle {
    /// Start connecting. A no-op unless the client is idle.
    pub async fn connect(&self) -> Result<()> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(DanmakuError::Closed);
        }
        self.tx.send(Msg::Connect).await.map_err(|_| DanmakuError::Closed)
    }

    /// Cancel every timer, close the transport and stop the actor.
    ///
    /// Safe to call any number of times from any task; returns once the
    /// actor has torn everything down (or immediately if it already has).
    pub async fn close(&self) {
        self.shared.closed.store(true, Ordering::Release);
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(Msg::Close(ack_tx)).await.is_ok() {
            let _ = ack_rx.await;
        }
    }

    pub fn state(&self) -> ConnState {
        ConnState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    pub fn is_authenticated(&self) -> bool {
        self.state() == ConnState::Authenticated
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }
}

/// Spawn the client actor. The returned receiver carries status, chat and
/// popularity events; dropping it is fine (events are then discarded).
pub fn spawn(
    options: ClientOptions,
    provider: Arc<dyn ConnectionInfoProvider>,
    transport: Arc<dyn Transport>,
    metrics: Arc<ClientMetrics>,
    feed: Option<FeedSender>,
) -> (ClientHandle, mpsc::Receiver<ClientEvent>) {
    let (tx, inbox) = mpsc::channel(INBOX_CAPACITY);
    let (events_tx, events_rx) = mpsc::channel(options.event_buffer.max(1));
    let shared = Arc::new(Shared {
        state: AtomicU8::new(ConnState::Idle as u8),
        closed: AtomicBool::new(false),
    });

    let actor = Actor {
        machine: Machine::new(options.default_host.clone(), options.max_backoff_secs),
        options,
        provider,
        transport,
        metrics,
        feed,
        events: events_tx,
        shared: Arc::clone(&shared),
        self_tx: tx.downgrade(),
        inbox,
        link: None,
        generation: 0,
        timers: Timers::default(),
        open_started: None,
        finished: false,
    };
    let span = tracing::info_span!("danmaku_client", room_id = actor.options.room_id);
    tokio::spawn(actor.run().instrument(span));

    (ClientHandle { tx, shared }, events_rx)
}

#[derive(Default)]
struct TimerSlot {
    handle: Option<AbortHandle>,
    seq: u64,
}

impl TimerSlot {
    fn cancel(&mut self) {
        if let Some(h) = self.handle.take() {
            h.abort();
        }
        self.seq = self.seq.wrapping_add(1);
    }

    fn is_current(&self, seq: u64) -> bool {
        self.handle.is_some() && self.seq == seq
    }
}

#[derive(Default)]
struct Timers {
    heartbeat: TimerSlot,
    auth: TimerSlot,
    reconnect: TimerSlot,
}

impl Timers {
    fn slot(&mut self, kind: TimerKind) -> &mut TimerSlot {
        match kind {
            TimerKind::Heartbeat => &mut self.heartbeat,
            TimerKind::AuthTimeout => &mut self.auth,
            TimerKind::Reconnect => &mut self.reconnect,
        }
    }

    fn cancel_all(&mut self) {
        self.heartbeat.cancel();
        self.auth.cancel();
        self.reconnect.cancel();
    }
}

struct Actor {
    machine: Machine,
    options: ClientOptions,
    provider: Arc<dyn ConnectionInfoProvider>,
    transport: Arc<dyn Transport>,
    metrics: Arc<ClientMetrics>,
    feed: Option<FeedSender>,
    events: mpsc::Sender<ClientEvent>,
    shared: Arc<Shared>,
    self_tx: mpsc::WeakSender<Msg>,
    inbox: mpsc::Receiver<Msg>,
    link: Option<Link>,
    generation: u64,
    timers: Timers,
    open_started: Option<Instant>,
    finished: bool,
}

enum Wake {
    Inbox(Option<Msg>),
    Link(Option<LinkEvent>),
}

async fn next_link_event(link: &mut Option<Link>) -> Option<LinkEvent> {
    match link {
        Some(l) => l.events.recv().await,
        None => std::future::pending().await,
    }
}

impl Actor {
    async fn run(mut self) {
        tracing::debug!("client actor started");

        while !self.finished {
            let wake = tokio::select! {
                msg = self.inbox.recv() => Wake::Inbox(msg),
                ev = next_link_event(&mut self.link) => Wake::Link(ev),
            };
            match wake {
                Wake::Inbox(Some(msg)) => self.on_msg(msg),
                Wake::Inbox(None) => {
                    // every handle dropped
                    self.shared.closed.store(true, Ordering::Release);
                    self.apply(Input::Close);
                    self.finished = true;
                }
                Wake::Link(ev) => self.on_link_event(ev),
            }
        }

        self.timers.cancel_all();
        tracing::debug!("client actor stopped");
    }

    fn on_msg(&mut self, msg: Msg) {
        match msg {
            Msg::Connect => self.apply(Input::Connect),
            Msg::Close(ack) => {
                self.shared.closed.store(true, Ordering::Release);
                self.apply(Input::Close);
                self.timers.cancel_all();
                self.finished = true;
                let _ = ack.send(());
            }
            Msg::Info(res) => {
                if self.is_closed() {
                    return;
                }
                self.apply(Input::ConnectionInfo(res));
            }
            Msg::Opened { generation, result } => {
                if generation != self.generation || self.is_closed() {
                    tracing::debug!(generation, current = self.generation, "dropping stale open");
                    return;
                }
                match result {
                    Ok(link) => {
                        self.link = Some(link);
                        self.apply(Input::Opened);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "open failed");
                        self.apply(Input::TransportClosed(e.to_string()));
                    }
                }
            }
            Msg::Timer { kind, seq } => {
                if self.is_closed() || !self.timers.slot(kind).is_current(seq) {
                    return;
                }
                let input = match kind {
                    TimerKind::Heartbeat => Input::HeartbeatDue,
                    TimerKind::AuthTimeout => {
                        self.timers.auth.handle = None;
                        Input::AuthTimedOut
                    }
                    TimerKind::Reconnect => {
                        self.timers.reconnect.handle = None;
                        Input::ReconnectDue
                    }
                };
                self.apply(input);
            }
        }
    }

    fn on_link_event(&mut self, ev: Option<LinkEvent>) {
        match ev {
            Some(LinkEvent::Binary(buf)) => self.on_buffer(buf),
            Some(LinkEvent::Closed(reason)) => {
                self.link = None;
                tracing::info!(%reason, "transport closed");
                self.apply(Input::TransportClosed(reason));
            }
            None => {
                self.link = None;
                self.apply(Input::TransportClosed("link dropped".to_string()));
            }
        }
    }

    fn on_buffer(&mut self, buf: bytes::Bytes) {
        let decoded = codec::decode(buf);
        for op in &decoded.ops {
            self.metrics.frames_in.inc(&[("op", op.as_str())]);
        }
        for e in &decoded.errors {
            self.metrics.decode_errors.inc(&[("kind", e.kind().as_str())]);
            tracing::debug!(error = %e, "frame dropped");
        }

        for item in decoded.items {
            match item {
                Inbound::AuthReply(Ok(())) => self.apply(Input::AuthAccepted),
                Inbound::AuthReply(Err(e)) => {
                    tracing::warn!(error = %e, "auth rejected");
                    self.apply(Input::AuthRejected(e));
                }
                Inbound::Chat(ev) => {
                    self.metrics.chat_events.inc(&[("kind", chat_kind(&ev))]);
                    if let Some(feed) = &self.feed {
                        feed.push(ev.clone());
                    }
                    self.emit(ClientEvent::Chat(ev));
                }
                Inbound::Popularity(p) => {
                    self.metrics.popularity.set(&[], i64::from(p));
                    self.emit(ClientEvent::Popularity(p));
                }
            }
        }
    }

    fn apply(&mut self, input: Input) {
        for effect in self.machine.handle(input) {
            self.run_effect(effect);
        }
    }

    fn run_effect(&mut self, effect: Effect) {
        match effect {
            Effect::FetchConnectionInfo => self.fetch_connection_info(),
            Effect::Open(target) => self.open(target),
            Effect::SendAuth { token } => match codec::auth_frame(self.options.room_id, &token) {
                Ok(frame) => self.send(frame),
                Err(e) => tracing::error!(error = %e, "auth frame encode failed"),
            },
            Effect::SendHeartbeat => self.send(codec::heartbeat_frame()),
            Effect::StartAuthTimer => self.arm_once(TimerKind::AuthTimeout, self.options.auth_timeout),
            Effect::CancelAuthTimer => self.timers.auth.cancel(),
            Effect::StartHeartbeat => self.arm_heartbeat(),
            Effect::CancelHeartbeat => self.timers.heartbeat.cancel(),
            Effect::ScheduleReconnect { delay, cause } => {
                self.metrics.reconnects.inc(&[("cause", cause.as_str())]);
                tracing::info!(
                    attempt = self.machine.attempt(),
                    delay_secs = delay.as_secs(),
                    cause = cause.as_str(),
                    "reconnect scheduled"
                );
                self.arm_once(TimerKind::Reconnect, delay);
            }
            Effect::CancelReconnect => self.timers.reconnect.cancel(),
            Effect::CloseTransport => self.close_transport(),
            Effect::Status { state, reason } => self.on_status(state, reason),
        }
    }

    fn on_status(&mut self, state: ConnState, reason: String) {
        self.shared.state.store(state as u8, Ordering::Release);
        self.metrics.transitions.inc(&[("to", state.as_str())]);
        self.metrics.state.set(&[], i64::from(state as u8));
        if state == ConnState::Authenticated {
            if let Some(started) = self.open_started.take() {
                self.metrics.connect_duration.observe(&[], started.elapsed());
            }
        }
        tracing::info!(state = state.as_str(), %reason, "state changed");
        self.emit(ClientEvent::Status { state, reason });
    }

    fn emit(&self, ev: ClientEvent) {
        if self.events.try_send(ev).is_err() {
            self.metrics.events_dropped.inc(&[("sink", "events")]);
        }
    }

    fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    fn fetch_connection_info(&self) {
        let Some(tx) = self.self_tx.upgrade() else { return };
        let provider = Arc::clone(&self.provider);
        let room_id = self.options.room_id;
        tokio::spawn(async move {
            let res = provider.fetch_connection_info(room_id).await;
            let _ = tx.send(Msg::Info(res)).await;
        });
    }

    fn open(&mut self, target: ConnectionTarget) {
        self.generation = self.generation.wrapping_add(1);
        let generation = self.generation;
        let Some(tx) = self.self_tx.upgrade() else { return };
        let transport = Arc::clone(&self.transport);
        let req = OpenRequest {
            url: target.url(),
            user_agent: self.options.user_agent.clone(),
            referer: self.options.referer.clone(),
        };
        tracing::debug!(host = %target.host, url = %req.url, generation, "opening");
        self.open_started = Some(Instant::now());
        tokio::spawn(async move {
            let result = transport.open(&req).await;
            let _ = tx.send(Msg::Opened { generation, result }).await;
        });
    }

    fn close_transport(&mut self) {
        // invalidates any open still in flight
        self.generation = self.generation.wrapping_add(1);
        if let Some(link) = self.link.take() {
            let _ = link.outbound.try_send(Outbound::Close);
        }
    }

    fn send(&self, frame: bytes::Bytes) {
        match &self.link {
            Some(link) => {
                if let Err(e) = link.outbound.try_send(Outbound::Binary(frame)) {
                    tracing::debug!(error = %e, "outbound write dropped");
                }
            }
            None => tracing::debug!("no link; frame not sent"),
        }
    }

    fn arm_once(&mut self, kind: TimerKind, after: Duration) {
        let slot = self.timers.slot(kind);
        slot.cancel();
        let seq = slot.seq;
        let tx = self.self_tx.clone();
        let deadline = Instant::now() + after;
        let task = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(Msg::Timer { kind, seq }).await;
            }
        });
        tracing::trace!(timer = kind.as_str(), after_ms = after.as_millis() as u64, "timer armed");
        self.timers.slot(kind).handle = Some(task.abort_handle());
    }

    fn arm_heartbeat(&mut self) {
        let kind = TimerKind::Heartbeat;
        let period = self.options.heartbeat_interval;
        let slot = self.timers.slot(kind);
        slot.cancel();
        let seq = slot.seq;
        let tx = self.self_tx.clone();
        let first = Instant::now() + period;
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(first, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(tx) = tx.upgrade() else { break };
                if tx.send(Msg::Timer { kind, seq }).await.is_err() {
                    break;
                }
            }
        });
        self.timers.slot(kind).handle = Some(task.abort_handle());
    }
}

fn chat_kind(ev: &ChatEvent) -> &'static str {
    match ev {
        ChatEvent::Danmaku(_) => "danmaku",
        ChatEvent::SuperChat(_) => "super_chat",
        ChatEvent::StatusNote(_) => "status_note",
    }
}

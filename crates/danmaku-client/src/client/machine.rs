//! Connection state machine.
//!
//! Pure and synchronous: `Machine::handle` consumes one `Input` and returns
//! the `Effect`s the runtime must carry out, in order. Timers, sockets and
//! the token provider all live in the runtime; this type only decides.

use std::time::Duration;

use danmaku_core::error::{DanmakuError, ErrorKind, Result};

use crate::upstream::{rank_hosts, ConnectionInfo, ConnectionTarget};

/// Exponent cap for the reconnect backoff (2^4 = 16s before the ceiling).
const MAX_BACKOFF_EXP: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ConnState {
    Idle = 0,
    Connecting = 1,
    Authenticating = 2,
    Authenticated = 3,
    Reconnecting = 4,
    Closing = 5,
    Closed = 6,
}

impl ConnState {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnState::Idle => "idle",
            ConnState::Connecting => "connecting",
            ConnState::Authenticating => "authenticating",
            ConnState::Authenticated => "authenticated",
            ConnState::Reconnecting => "reconnecting",
            ConnState::Closing => "closing",
            ConnState::Closed => "closed",
        }
    }

    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => ConnState::Connecting,
            2 => ConnState::Authenticating,
            3 => ConnState::Authenticated,
            4 => ConnState::Reconnecting,
            5 => ConnState::Closing,
            6 => ConnState::Closed,
            _ => ConnState::Idle,
        }
    }
}

#[derive(Debug)]
pub enum Input {
    Connect,
    ConnectionInfo(Result<ConnectionInfo>),
    Opened,
    AuthAccepted,
    AuthRejected(DanmakuError),
    AuthTimedOut,
    TransportClosed(String),
    ReconnectDue,
    HeartbeatDue,
    Close,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    FetchConnectionInfo,
    Open(ConnectionTarget),
    SendAuth { token: String },
    SendHeartbeat,
    StartAuthTimer,
    CancelAuthTimer,
    StartHeartbeat,
    CancelHeartbeat,
    ScheduleReconnect { delay: Duration, cause: ErrorKind },
    CancelReconnect,
    CloseTransport,
    Status { state: ConnState, reason: String },
}

/// `min(2^min(attempt, 4), cap)` seconds.
pub fn backoff_delay(attempt: u32, cap_secs: u64) -> Duration {
    let secs = 1u64 << attempt.min(MAX_BACKOFF_EXP);
    Duration::from_secs(secs.min(cap_secs))
}

#[derive(Debug)]
pub struct Machine {
    state: ConnState,
    fetching: bool,
    token: String,
    hosts: Vec<ConnectionTarget>,
    host_index: usize,
    attempt: u32,
    max_backoff_secs: u64,
    default_host: String,
}

impl Machine {
    pub fn new(default_host: impl Into<String>, max_backoff_secs: u64) -> Self {
        Self {
            state: ConnState::Idle,
            fetching: false,
            token: String::new(),
            hosts: Vec::new(),
            host_index: 0,
            attempt: 0,
            max_backoff_secs,
            default_host: default_host.into(),
        }
    }

    pub fn state(&self) -> ConnState {
        self.state
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn host_index(&self) -> usize {
        self.host_index
    }

    pub fn current_target(&self) -> Option<&ConnectionTarget> {
        self.hosts.get(self.host_index)
    }

    pub fn handle(&mut self, input: Input) -> Vec<Effect> {
        let mut fx = Vec::new();
        match input {
            Input::Connect => {
                if self.state == ConnState::Idle && !self.fetching {
                    self.fetching = true;
                    fx.push(Effect::FetchConnectionInfo);
                }
            }
            Input::ConnectionInfo(res) => {
                if self.state != ConnState::Idle || !self.fetching {
                    return fx;
                }
                self.fetching = false;
                match res {
                    Ok(info) if info.is_usable() => {
                        self.token = info.token;
                        self.hosts = rank_hosts(info.hosts, &self.default_host);
                        self.host_index = 0;
                        self.open_current(&mut fx, "connecting".to_string());
                    }
                    Ok(_) => {
                        let e = DanmakuError::NoHostsAvailable;
                        fx.push(self.status(ConnState::Idle, e.to_string()));
                    }
                    Err(e) => {
                        fx.push(self.status(ConnState::Idle, format!("connection info failed: {e}")));
                    }
                }
            }
            Input::Opened => {
                if self.state == ConnState::Connecting {
                    fx.push(Effect::SendAuth { token: self.token.clone() });
                    fx.push(Effect::StartAuthTimer);
                    self.transition(&mut fx, ConnState::Authenticating, "authenticating".to_string());
                }
            }
            Input::AuthAccepted => {
                if self.state == ConnState::Authenticating {
                    fx.push(Effect::CancelAuthTimer);
                    self.attempt = 0;
                    self.transition(&mut fx, ConnState::Authenticated, "authenticated".to_string());
                    fx.push(Effect::StartHeartbeat);
                }
            }
            Input::AuthRejected(e) => {
                if self.state == ConnState::Authenticating {
                    self.schedule_reconnect(&mut fx, e);
                }
            }
            Input::AuthTimedOut => {
                if self.state == ConnState::Authenticating {
                    self.schedule_reconnect(&mut fx, DanmakuError::AuthTimeout);
                }
            }
            Input::TransportClosed(reason) => {
                if matches!(
                    self.state,
                    ConnState::Connecting | ConnState::Authenticating | ConnState::Authenticated
                ) {
                    self.schedule_reconnect(&mut fx, DanmakuError::TransportFailure(reason));
                }
            }
            Input::ReconnectDue => {
                if self.state == ConnState::Reconnecting && !self.hosts.is_empty() {
                    self.host_index = (self.host_index + 1) % self.hosts.len();
                    self.open_current(&mut fx, format!("reconnecting (attempt {})", self.attempt));
                }
            }
            Input::HeartbeatDue => {
                if self.state == ConnState::Authenticated {
                    fx.push(Effect::SendHeartbeat);
                }
            }
            Input::Close => {
                if matches!(self.state, ConnState::Closing | ConnState::Closed) {
                    return fx;
                }
                self.fetching = false;
                self.transition(&mut fx, ConnState::Closing, "closing".to_string());
                fx.push(Effect::CancelAuthTimer);
                fx.push(Effect::CancelHeartbeat);
                fx.push(Effect::CancelReconnect);
                fx.push(Effect::CloseTransport);
                self.transition(&mut fx, ConnState::Closed, "closed".to_string());
            }
        }
        fx
    }

    fn open_current(&mut self, fx: &mut Vec<Effect>, reason: String) {
        if let Some(target) = self.hosts.get(self.host_index).cloned() {
            let reason = format!("{reason}: {}", target.url());
            self.transition(fx, ConnState::Connecting, reason);
            fx.push(Effect::Open(target));
        }
    }

    /// Single funnel for connection-level failures. No-op while a reconnect
    /// is already pending.
    fn schedule_reconnect(&mut self, fx: &mut Vec<Effect>, cause: DanmakuError) {
        if self.state == ConnState::Reconnecting {
            return;
        }
        fx.push(Effect::CancelAuthTimer);
        fx.push(Effect::CancelHeartbeat);
        fx.push(Effect::CloseTransport);

        let delay = backoff_delay(self.attempt, self.max_backoff_secs);
        self.attempt = self.attempt.saturating_add(1);
        let reason = format!("reconnecting in {}s: {cause}", delay.as_secs());
        self.transition(fx, ConnState::Reconnecting, reason);
        fx.push(Effect::ScheduleReconnect {
            delay,
            cause: cause.kind(),
        });
    }

    fn transition(&mut self, fx: &mut Vec<Effect>, to: ConnState, reason: String) {
        fx.push(self.status(to, reason));
    }

    fn status(&mut self, to: ConnState, reason: String) -> Effect {
        self.state = to;
        Effect::Status { state: to, reason }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn info(hosts: &[&str]) -> ConnectionInfo {
        ConnectionInfo {
            token: "tok".into(),
            hosts: hosts
                .iter()
                .map(|h| ConnectionTarget {
                    host: h.to_string(),
                    wss_port: 443,
                    ws_port: 2244,
                })
                .collect(),
        }
    }

    fn opened(hosts: &[&str]) -> Machine {
        let mut m = Machine::new("default.example", 10);
        assert_eq!(m.handle(Input::Connect), vec![Effect::FetchConnectionInfo]);
        m.handle(Input::ConnectionInfo(Ok(info(hosts))));
        m.handle(Input::Opened);
        assert_eq!(m.state(), ConnState::Authenticating);
        m
    }

    fn delay_of(fx: &[Effect]) -> Option<u64> {
        fx.iter().find_map(|e| match e {
            Effect::ScheduleReconnect { delay, .. } => Some(delay.as_secs()),
            _ => None,
        })
    }

    fn opened_host(fx: &[Effect]) -> Option<String> {
        fx.iter().find_map(|e| match e {
            Effect::Open(t) => Some(t.host.clone()),
            _ => None,
        })
    }

    #[test]
    fn backoff_formula() {
        let got: Vec<u64> = (0..7).map(|a| backoff_delay(a, 10).as_secs()).collect();
        assert_eq!(got, vec![1, 2, 4, 8, 10, 10, 10]);
        assert_eq!(backoff_delay(40, 300).as_secs(), 16);
    }

    #[test]
    fn open_sends_auth_then_arms_timer() {
        let mut m = Machine::new("x", 10);
        m.handle(Input::Connect);
        let fx = m.handle(Input::ConnectionInfo(Ok(info(&["a"]))));
        assert_eq!(opened_host(&fx).as_deref(), Some("a"));
        assert_eq!(m.state(), ConnState::Connecting);

        let fx = m.handle(Input::Opened);
        assert_eq!(fx[0], Effect::SendAuth { token: "tok".into() });
        assert_eq!(fx[1], Effect::StartAuthTimer);
    }

    #[test]
    fn consecutive_failures_back_off_and_rotate_hosts() {
        let mut m = opened(&["a", "b", "c"]);
        let mut delays = Vec::new();
        let mut hosts = Vec::new();
        for _ in 0..6 {
            let fx = m.handle(Input::AuthTimedOut);
            delays.push(delay_of(&fx).unwrap());
            let fx = m.handle(Input::ReconnectDue);
            hosts.push(opened_host(&fx).unwrap());
            m.handle(Input::Opened);
        }
        assert_eq!(delays, vec![1, 2, 4, 8, 10, 10]);
        assert_eq!(hosts, vec!["b", "c", "a", "b", "c", "a"]);
    }

    #[test]
    fn auth_success_resets_attempts_but_open_does_not() {
        let mut m = opened(&["a", "b"]);
        m.handle(Input::TransportClosed("reset".into()));
        m.handle(Input::ReconnectDue);
        m.handle(Input::Opened);
        m.handle(Input::TransportClosed("reset".into()));
        assert_eq!(m.attempt(), 2);

        m.handle(Input::ReconnectDue);
        m.handle(Input::Opened);
        assert_eq!(m.attempt(), 2);
        let fx = m.handle(Input::AuthAccepted);
        assert_eq!(m.attempt(), 0);
        assert!(fx.contains(&Effect::CancelAuthTimer));
        assert!(fx.contains(&Effect::StartHeartbeat));

        let fx = m.handle(Input::TransportClosed("gone".into()));
        assert_eq!(delay_of(&fx), Some(1));
    }

    #[test]
    fn reconnect_is_not_duplicated() {
        let mut m = opened(&["a"]);
        assert!(delay_of(&m.handle(Input::AuthRejected(DanmakuError::AuthRejected {
            code: -101,
            msg: "bad".into()
        })))
        .is_some());
        assert!(m.handle(Input::TransportClosed("late".into())).is_empty());
        assert!(m.handle(Input::AuthTimedOut).is_empty());
        assert_eq!(m.attempt(), 1);
    }

    #[test]
    fn heartbeat_only_when_authenticated() {
        let mut m = opened(&["a"]);
        assert!(m.handle(Input::HeartbeatDue).is_empty());
        m.handle(Input::AuthAccepted);
        assert_eq!(m.handle(Input::HeartbeatDue), vec![Effect::SendHeartbeat]);
    }

    #[test]
    fn no_hosts_stays_idle_and_can_retry() {
        let mut m = Machine::new("x", 10);
        m.handle(Input::Connect);
        let fx = m.handle(Input::ConnectionInfo(Ok(info(&[]))));
        assert_eq!(m.state(), ConnState::Idle);
        assert!(matches!(&fx[..], [Effect::Status { state: ConnState::Idle, .. }]));

        let mut empty_token = info(&["a"]);
        empty_token.token.clear();
        m.handle(Input::Connect);
        m.handle(Input::ConnectionInfo(Ok(empty_token)));
        assert_eq!(m.state(), ConnState::Idle);

        assert_eq!(m.handle(Input::Connect), vec![Effect::FetchConnectionInfo]);
    }

    #[test]
    fn close_is_idempotent_and_final() {
        let mut m = opened(&["a"]);
        m.handle(Input::AuthTimedOut);
        let fx = m.handle(Input::Close);
        assert!(fx.contains(&Effect::CancelReconnect));
        assert!(fx.contains(&Effect::CloseTransport));
        assert_eq!(m.state(), ConnState::Closed);

        assert!(m.handle(Input::Close).is_empty());
        assert!(m.handle(Input::ReconnectDue).is_empty());
        assert!(m.handle(Input::Connect).is_empty());
        assert!(m.handle(Input::Opened).is_empty());
        assert_eq!(m.state(), ConnState::Closed);
    }

    #[test]
    fn default_host_is_preferred() {
        let mut m = Machine::new("b", 10);
        m.handle(Input::Connect);
        let fx = m.handle(Input::ConnectionInfo(Ok(info(&["a", "b"]))));
        assert_eq!(opened_host(&fx).as_deref(), Some("b"));
    }
}

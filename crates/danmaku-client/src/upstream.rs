//! Upstream seam: where connection tokens and host lists come from.
//!
//! The REST call that produces them is outside this crate; callers implement
//! `ConnectionInfoProvider` over their own API client.

use async_trait::async_trait;

use danmaku_core::error::Result;

/// One candidate broadcast server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionTarget {
    pub host: String,
    pub wss_port: u16,
    pub ws_port: u16,
}

impl ConnectionTarget {
    /// `wss://` when a TLS port is offered, plaintext `ws://` otherwise.
    pub fn url(&self) -> String {
        if self.wss_port != 0 || self.ws_port == 0 {
            let port = if self.wss_port == 0 { 443 } else { self.wss_port };
            format!("wss://{}:{}/sub", self.host, port)
        } else {
            format!("ws://{}:{}/sub", self.host, self.ws_port)
        }
    }
}

/// Token plus ranked host list for one room.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub token: String,
    pub hosts: Vec<ConnectionTarget>,
}

impl ConnectionInfo {
    pub fn is_usable(&self) -> bool {
        !self.token.is_empty() && !self.hosts.is_empty()
    }
}

#[async_trait]
pub trait ConnectionInfoProvider: Send + Sync {
    async fn fetch_connection_info(&self, room_id: i64) -> Result<ConnectionInfo>;
}

/// Provider returning a fixed answer (config-driven binary, tests).
#[derive(Debug, Clone)]
pub struct StaticProvider {
    info: ConnectionInfo,
}

impl StaticProvider {
    pub fn new(info: ConnectionInfo) -> Self {
        Self { info }
    }
}

#[async_trait]
impl ConnectionInfoProvider for StaticProvider {
    async fn fetch_connection_info(&self, room_id: i64) -> Result<ConnectionInfo> {
        tracing::debug!(room_id, hosts = self.info.hosts.len(), "static connection info");
        Ok(self.info.clone())
    }
}

/// Move the canonical default host to the front, keeping the rest in order.
pub fn rank_hosts(mut hosts: Vec<ConnectionTarget>, default_host: &str) -> Vec<ConnectionTarget> {
    if let Some(pos) = hosts.iter().position(|h| h.host == default_host) {
        let preferred = hosts.remove(pos);
        hosts.insert(0, preferred);
    }
    hosts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(host: &str) -> ConnectionTarget {
        ConnectionTarget {
            host: host.into(),
            wss_port: 443,
            ws_port: 2244,
        }
    }

    #[test]
    fn default_host_goes_first() {
        let ranked = rank_hosts(vec![t("a"), t("b"), t("canon"), t("c")], "canon");
        let names: Vec<_> = ranked.iter().map(|h| h.host.as_str()).collect();
        assert_eq!(names, ["canon", "a", "b", "c"]);
    }

    #[test]
    fn list_order_without_default() {
        let ranked = rank_hosts(vec![t("a"), t("b")], "canon");
        assert_eq!(ranked[0].host, "a");
    }

    #[test]
    fn plaintext_only_host() {
        let h = ConnectionTarget {
            host: "h".into(),
            wss_port: 0,
            ws_port: 2244,
        };
        assert_eq!(h.url(), "ws://h:2244/sub");
    }

    #[test]
    fn empty_token_is_unusable() {
        let info = ConnectionInfo {
            token: String::new(),
            hosts: vec![t("a")],
        };
        assert!(!info.is_usable());
    }
}

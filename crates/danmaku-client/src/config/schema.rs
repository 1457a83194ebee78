use std::time::Duration;

use serde::Deserialize;

use danmaku_core::error::{DanmakuError, Result};
use danmaku_core::overlay::StyleParams;

use crate::upstream::{ConnectionInfo, ConnectionTarget};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    pub version: u32,

    pub client: ClientSection,

    #[serde(default)]
    pub upstream: UpstreamSection,

    #[serde(default)]
    pub overlay: OverlaySection,
}

impl ClientConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(DanmakuError::UnsupportedVersion);
        }
        self.client.validate()?;
        self.upstream.validate()?;
        self.overlay.validate()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientSection {
    pub room_id: i64,

    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    #[serde(default = "default_auth_timeout_ms")]
    pub auth_timeout_ms: u64,

    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_referer_origin")]
    pub referer_origin: String,

    #[serde(default = "default_host")]
    pub default_host: String,

    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl ClientSection {
    pub fn validate(&self) -> Result<()> {
        if self.room_id <= 0 {
            return Err(DanmakuError::BadConfig("client.room_id must be positive".into()));
        }
        if !(5000..=120000).contains(&self.heartbeat_interval_ms) {
            return Err(DanmakuError::BadConfig(
                "client.heartbeat_interval_ms must be between 5000 and 120000".into(),
            ));
        }
        if !(1000..=60000).contains(&self.auth_timeout_ms) {
            return Err(DanmakuError::BadConfig(
                "client.auth_timeout_ms must be between 1000 and 60000".into(),
            ));
        }
        if !(1..=300).contains(&self.max_backoff_secs) {
            return Err(DanmakuError::BadConfig(
                "client.max_backoff_secs must be between 1 and 300".into(),
            ));
        }
        if self.event_buffer == 0 {
            return Err(DanmakuError::BadConfig("client.event_buffer must be > 0".into()));
        }
        Ok(())
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn auth_timeout(&self) -> Duration {
        Duration::from_millis(self.auth_timeout_ms)
    }
}

fn default_heartbeat_interval_ms() -> u64 {
    30000
}
fn default_auth_timeout_ms() -> u64 {
    6000
}
fn default_max_backoff_secs() -> u64 {
    10
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36"
        .into()
}
fn default_referer_origin() -> String {
    "https://live.bilibili.com".into()
}
fn default_host() -> String {
    "broadcastlv.chat.bilibili.com".into()
}
fn default_event_buffer() -> usize {
    1024
}

/// Static connection info for the bundled binary. Library users plug in
/// their own `ConnectionInfoProvider` instead.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpstreamSection {
    #[serde(default)]
    pub token: String,

    #[serde(default)]
    pub hosts: Vec<HostEntry>,
}

impl UpstreamSection {
    pub fn validate(&self) -> Result<()> {
        for h in &self.hosts {
            if h.host.trim().is_empty() {
                return Err(DanmakuError::BadConfig("upstream.hosts[].host must not be empty".into()));
            }
            if h.wss_port == 0 && h.ws_port == 0 {
                return Err(DanmakuError::BadConfig(format!(
                    "upstream host {} needs wss_port or ws_port",
                    h.host
                )));
            }
        }
        Ok(())
    }

    pub fn connection_info(&self) -> ConnectionInfo {
        ConnectionInfo {
            token: self.token.clone(),
            hosts: self
                .hosts
                .iter()
                .map(|h| ConnectionTarget {
                    host: h.host.clone(),
                    wss_port: h.wss_port,
                    ws_port: h.ws_port,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HostEntry {
    pub host: String,
    #[serde(default)]
    pub wss_port: u16,
    #[serde(default)]
    pub ws_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OverlaySection {
    #[serde(default = "default_font_size_px")]
    pub font_size_px: f32,

    #[serde(default = "default_speed_level")]
    pub speed_level: u8,

    #[serde(default = "default_unit")]
    pub coverage: f32,

    #[serde(default = "default_unit")]
    pub opacity: f32,

    #[serde(default)]
    pub min_weight: i32,
}

impl Default for OverlaySection {
    fn default() -> Self {
        Self {
            font_size_px: default_font_size_px(),
            speed_level: default_speed_level(),
            coverage: default_unit(),
            opacity: default_unit(),
            min_weight: 0,
        }
    }
}

impl OverlaySection {
    pub fn validate(&self) -> Result<()> {
        if !(self.font_size_px > 0.0 && self.font_size_px <= 200.0) {
            return Err(DanmakuError::BadConfig(
                "overlay.font_size_px must be in (0, 200]".into(),
            ));
        }
        if !(1..=10).contains(&self.speed_level) {
            return Err(DanmakuError::BadConfig(
                "overlay.speed_level must be between 1 and 10".into(),
            ));
        }
        if !(self.coverage > 0.0 && self.coverage <= 1.0) {
            return Err(DanmakuError::BadConfig("overlay.coverage must be in (0, 1]".into()));
        }
        if !(0.0..=1.0).contains(&self.opacity) {
            return Err(DanmakuError::BadConfig("overlay.opacity must be in [0, 1]".into()));
        }
        Ok(())
    }

    pub fn style(&self) -> StyleParams {
        StyleParams {
            font_size_px: self.font_size_px,
            speed_level: self.speed_level,
            coverage: self.coverage,
            opacity: self.opacity,
            min_weight: self.min_weight,
        }
    }
}

fn default_font_size_px() -> f32 {
    25.0
}
fn default_speed_level() -> u8 {
    4
}
fn default_unit() -> f32 {
    1.0
}

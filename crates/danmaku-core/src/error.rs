//! Shared error type across danmaku crates.

use thiserror::Error;

/// Stable error kinds (used in logs, status strings and tests).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Truncated or garbled frame buffer.
    FrameDecode,
    /// Bad zlib/brotli stream in a compressed frame.
    PayloadDecompress,
    /// Server answered the auth frame with a nonzero code.
    AuthRejected,
    /// No auth reply within the timeout.
    AuthTimeout,
    /// Socket error or close.
    TransportFailure,
    /// Token/host lookup came back empty.
    NoHosts,
    /// Invalid configuration.
    BadConfig,
    /// Unsupported config/protocol version.
    UnsupportedVersion,
    /// Client already closed.
    Closed,
    /// Internal error.
    Internal,
}

impl ErrorKind {
    /// String representation used in logs and status strings.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::FrameDecode => "FRAME_DECODE",
            ErrorKind::PayloadDecompress => "PAYLOAD_DECOMPRESS",
            ErrorKind::AuthRejected => "AUTH_REJECTED",
            ErrorKind::AuthTimeout => "AUTH_TIMEOUT",
            ErrorKind::TransportFailure => "TRANSPORT_FAILURE",
            ErrorKind::NoHosts => "NO_HOSTS",
            ErrorKind::BadConfig => "BAD_CONFIG",
            ErrorKind::UnsupportedVersion => "UNSUPPORTED_VERSION",
            ErrorKind::Closed => "CLOSED",
            ErrorKind::Internal => "INTERNAL",
        }
    }

    /// Whether this failure should drive the reconnect path.
    pub fn triggers_reconnect(self) -> bool {
        matches!(
            self,
            ErrorKind::AuthRejected | ErrorKind::AuthTimeout | ErrorKind::TransportFailure
        )
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, DanmakuError>;

/// Unified error type used by core and client.
#[derive(Debug, Error)]
pub enum DanmakuError {
    #[error("frame decode: {0}")]
    FrameDecode(String),
    #[error("payload decompress: {0}")]
    PayloadDecompress(String),
    #[error("auth rejected (code {code}): {msg}")]
    AuthRejected { code: i64, msg: String },
    #[error("auth timed out")]
    AuthTimeout,
    #[error("transport failure: {0}")]
    TransportFailure(String),
    #[error("no hosts available")]
    NoHostsAvailable,
    #[error("bad config: {0}")]
    BadConfig(String),
    #[error("unsupported version")]
    UnsupportedVersion,
    #[error("client closed")]
    Closed,
    #[error("internal: {0}")]
    Internal(String),
}

impl DanmakuError {
    /// Map to a stable kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DanmakuError::FrameDecode(_) => ErrorKind::FrameDecode,
            DanmakuError::PayloadDecompress(_) => ErrorKind::PayloadDecompress,
            DanmakuError::AuthRejected { .. } => ErrorKind::AuthRejected,
            DanmakuError::AuthTimeout => ErrorKind::AuthTimeout,
            DanmakuError::TransportFailure(_) => ErrorKind::TransportFailure,
            DanmakuError::NoHostsAvailable => ErrorKind::NoHosts,
            DanmakuError::BadConfig(_) => ErrorKind::BadConfig,
            DanmakuError::UnsupportedVersion => ErrorKind::UnsupportedVersion,
            DanmakuError::Closed => ErrorKind::Closed,
            DanmakuError::Internal(_) => ErrorKind::Internal,
        }
    }
}

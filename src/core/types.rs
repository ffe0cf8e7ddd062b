use std::time::Duration;

use thiserror::Error;

use super::reorder::GapSkip;

/// Convenience result alias for push-channel operations.
pub type PushResult<T> = Result<T, PushError>;

/// Canonical error surface shared across the crate.
#[derive(Debug, Error)]
pub enum PushError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Transport error ({context}): {error}")]
    TransportError {
        context: &'static str,
        error: String,
    },

    #[error("Decode failed: {0}")]
    Decode(String),

    #[error("Actor error: {0}")]
    ActorError(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Reconnection exhausted after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },
}

/// Transport-independent buffer sizing parameters used for websocket configuration.
#[derive(Clone, Copy, Debug)]
pub struct WebSocketBufferConfig {
    pub write_buffer_bytes: usize,
    pub max_write_buffer_bytes: usize,
    pub max_message_bytes: usize,
    pub max_frame_bytes: usize,
}

impl Default for WebSocketBufferConfig {
    fn default() -> Self {
        // Status updates are small JSON objects; the initial snapshot is the largest frame.
        Self {
            write_buffer_bytes: 16 << 10,
            max_write_buffer_bytes: 64 << 10,
            max_message_bytes: 8 * 1024 * 1024,
            max_frame_bytes: 8 * 1024 * 1024,
        }
    }
}

/// TLS configuration for websocket connections.
///
/// Certificate validation is enabled unless explicitly disabled for development setups.
#[derive(Clone, Copy, Debug)]
pub struct WsTlsConfig {
    pub validate_certs: bool,
}

impl Default for WsTlsConfig {
    fn default() -> Self {
        Self {
            validate_certs: true,
        }
    }
}

/// Lifecycle of the single logical push connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Open,
    Closing,
    Closed,
}

/// Point-in-time view of the connection, published to observers on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectionSnapshot {
    pub state: ConnectionState,
    /// Number of successful opens so far; ordering state is scoped to one epoch.
    pub epoch: u64,
    pub reconnect_attempts: u32,
    /// Automatic reconnection gave up; only an explicit `connect()` starts a new attempt.
    pub reconnect_exhausted: bool,
}

impl ConnectionSnapshot {
    #[inline]
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Open
    }
}

/// Why the transport went away.
#[derive(Debug, Clone)]
pub enum DisconnectCause {
    RemoteClosed { code: Option<u16>, reason: String },
    StreamEnded,
    ReadFailure { error: String },
    WriterFailed { error: String },
    HandshakeFailed { error: String },
}

/// Counters and recent diagnostics collected by the delivery pipeline.
#[derive(Clone, Debug)]
pub struct DeliveryStats {
    pub uptime: Duration,
    pub frames: u64,
    pub delivered: u64,
    pub stale_dropped: u64,
    pub duplicates_dropped: u64,
    pub gap_skips: u64,
    pub decode_failures: u64,
    pub handler_failures: u64,
    pub reconnects: u64,
    pub recent_gap_skips: Vec<GapSkip>,
    pub heartbeat_p50_us: u64,
    pub heartbeat_p99_us: u64,
    pub heartbeat_samples: u64,
}

/// Reconnect policy seam: decides whether and when the next automatic attempt happens.
pub trait WsReconnectStrategy: Send + Sync + 'static {
    /// Delay before the next attempt, or `None` once the attempt budget is spent.
    fn next_delay(&mut self) -> Option<Duration>;
    /// Called after a successful open.
    fn reset(&mut self);
    /// Attempts scheduled since the last successful open.
    fn attempts(&self) -> u32;
}

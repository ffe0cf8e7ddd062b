use std::time::{Duration, Instant};

use super::envelope::PING_FRAME;
use super::frame::WsFrame;

/// Keep-alive contract used by the push actor.
///
/// The server answers a ping with an ordinary `pong` envelope, which flows through the regular
/// delivery path; the strategy only gets told about it to measure round-trips.
pub trait WsHeartbeatStrategy: Send + Sync + 'static {
    fn create_ping(&mut self) -> Option<WsFrame>;
    /// A `pong` envelope was delivered. Returns the round-trip to the oldest unanswered ping.
    fn on_reply(&mut self) -> Option<Duration>;
    fn reset(&mut self);
    fn interval(&self) -> Duration;
}

/// Sends `{"type":"ping"}` text frames on a fixed interval.
pub struct JsonHeartbeat {
    interval: Duration,
    outstanding: Option<Instant>,
}

impl JsonHeartbeat {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            outstanding: None,
        }
    }
}

impl Default for JsonHeartbeat {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

impl WsHeartbeatStrategy for JsonHeartbeat {
    fn create_ping(&mut self) -> Option<WsFrame> {
        // Keep the oldest send time so a slow reply is not under-reported.
        self.outstanding.get_or_insert_with(Instant::now);
        Some(WsFrame::text_static(PING_FRAME))
    }

    fn on_reply(&mut self) -> Option<Duration> {
        self.outstanding.take().map(|sent| sent.elapsed())
    }

    fn reset(&mut self) {
        self.outstanding = None;
    }

    fn interval(&self) -> Duration {
        self.interval
    }
}

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use hdrhistogram::Histogram;

use super::reorder::{AdmitOutcome, GapSkip};
use super::types::DeliveryStats;

const MAX_RECENT_GAP_SKIPS: usize = 32;

/// Delivery counters owned by the push actor (no interior mutability).
#[derive(Debug)]
pub struct DeliveryHealth {
    connection_started: Instant,
    frames: u64,
    delivered: u64,
    stale_dropped: u64,
    duplicates_dropped: u64,
    gap_skips: u64,
    decode_failures: u64,
    handler_failures: u64,
    reconnects: u64,
    recent_gap_skips: VecDeque<GapSkip>,
    heartbeat_rtt: Option<Histogram<u64>>,
}

impl DeliveryHealth {
    pub fn new() -> Self {
        Self {
            connection_started: Instant::now(),
            frames: 0,
            delivered: 0,
            stale_dropped: 0,
            duplicates_dropped: 0,
            gap_skips: 0,
            decode_failures: 0,
            handler_failures: 0,
            reconnects: 0,
            recent_gap_skips: VecDeque::with_capacity(MAX_RECENT_GAP_SKIPS),
            // 1us..1h at 3 significant digits; static bounds never fail in practice.
            heartbeat_rtt: Histogram::new_with_bounds(1, 3_600_000_000, 3).ok(),
        }
    }

    /// New connection epoch: uptime restarts, cumulative counters are kept.
    pub fn reset_connection(&mut self) {
        self.connection_started = Instant::now();
    }

    pub fn record_frame(&mut self) {
        self.frames = self.frames.saturating_add(1);
    }

    pub fn record_admission(&mut self, outcome: AdmitOutcome) {
        match outcome {
            AdmitOutcome::Stale { .. } => {
                self.stale_dropped = self.stale_dropped.saturating_add(1)
            }
            AdmitOutcome::Duplicate => {
                self.duplicates_dropped = self.duplicates_dropped.saturating_add(1)
            }
            AdmitOutcome::Unordered
            | AdmitOutcome::Baseline
            | AdmitOutcome::InOrder
            | AdmitOutcome::Buffered => {}
        }
    }

    pub fn record_delivered(&mut self, handler_failures: usize) {
        self.delivered = self.delivered.saturating_add(1);
        self.handler_failures = self
            .handler_failures
            .saturating_add(handler_failures as u64);
    }

    pub fn record_gap_skip(&mut self, skip: GapSkip) {
        self.gap_skips = self.gap_skips.saturating_add(1);
        if self.recent_gap_skips.len() == MAX_RECENT_GAP_SKIPS {
            self.recent_gap_skips.pop_front();
        }
        self.recent_gap_skips.push_back(skip);
    }

    pub fn record_decode_failure(&mut self) {
        self.decode_failures = self.decode_failures.saturating_add(1);
    }

    pub fn record_heartbeat_rtt(&mut self, rtt: Duration) {
        let micros = rtt.as_micros().clamp(1, u64::MAX as u128) as u64;
        if let Some(histogram) = self.heartbeat_rtt.as_mut() {
            let _ = histogram.record(micros);
        }
    }

    pub fn increment_reconnect(&mut self) {
        self.reconnects = self.reconnects.saturating_add(1);
    }

    pub fn get_stats(&self) -> DeliveryStats {
        let (samples, p50, p99) = match self.heartbeat_rtt.as_ref() {
            Some(h) if h.len() > 0 => (
                h.len(),
                h.value_at_percentile(50.0),
                h.value_at_percentile(99.0),
            ),
            _ => (0, 0, 0),
        };

        DeliveryStats {
            uptime: self.connection_started.elapsed(),
            frames: self.frames,
            delivered: self.delivered,
            stale_dropped: self.stale_dropped,
            duplicates_dropped: self.duplicates_dropped,
            gap_skips: self.gap_skips,
            decode_failures: self.decode_failures,
            handler_failures: self.handler_failures,
            reconnects: self.reconnects,
            recent_gap_skips: self.recent_gap_skips.iter().cloned().collect(),
            heartbeat_p50_us: p50,
            heartbeat_p99_us: p99,
            heartbeat_samples: samples,
        }
    }
}

impl Default for DeliveryHealth {
    fn default() -> Self {
        Self::new()
    }
}

//! Per-category reordering with bounded delay.
//!
//! Each category owns a [`ReorderBuffer`] that tracks the next expected sequence number and parks
//! envelopes that arrived early. Released envelopes are pushed into a caller-supplied `Vec` in
//! delivery order so the hot path does not allocate per frame.
//!
//! Liveness comes from [`ReorderBuffer::sweep`]: once the oldest parked envelope has waited longer
//! than the buffer timeout (or too many envelopes are parked) the missing range is skipped and
//! reported as a [`GapSkip`].

use std::collections::BTreeMap;
use std::ops::Range;
use std::time::{Duration, Instant};

use super::envelope::{Category, Envelope};

/// Tolerances for out-of-order arrival.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReorderPolicy {
    /// How long the oldest parked envelope may wait for its predecessor.
    pub buffer_timeout: Duration,
    /// Parked-envelope count above which the gap is skipped regardless of age.
    pub max_buffer_depth: usize,
    /// Period of the gap-recovery sweep.
    pub sweep_interval: Duration,
}

impl Default for ReorderPolicy {
    fn default() -> Self {
        Self {
            buffer_timeout: Duration::from_millis(50),
            max_buffer_depth: 10,
            sweep_interval: Duration::from_millis(50),
        }
    }
}

/// What `admit` did with an envelope.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdmitOutcome {
    /// No sequence number; delivered immediately.
    Unordered,
    /// First sequenced envelope of the epoch; it seeded the expected sequence.
    Baseline,
    /// Matched the expected sequence and was delivered, possibly releasing parked successors.
    InOrder,
    /// Arrived early and was parked.
    Buffered,
    /// Older than the expected sequence; dropped.
    Stale { expected: u64 },
    /// Same sequence as an envelope already parked; dropped.
    Duplicate,
}

impl AdmitOutcome {
    pub fn is_dropped(self) -> bool {
        matches!(self, AdmitOutcome::Stale { .. } | AdmitOutcome::Duplicate)
    }
}

/// Why a gap was skipped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GapReason {
    Timeout,
    Overflow,
}

/// A forced advance of the expected sequence past envelopes that never arrived.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GapSkip {
    pub category: Category,
    /// Sequence numbers given up on (never empty).
    pub skipped: Range<u64>,
    pub reason: GapReason,
    /// Parked envelopes at the time of the skip.
    pub pending: usize,
}

#[derive(Debug)]
struct Parked {
    envelope: Envelope,
    arrived_at: Instant,
}

/// Ordering state for one category within one connection epoch.
#[derive(Debug, Default)]
pub struct ReorderBuffer {
    expected: Option<u64>,
    /// `u64::MAX` was released; every later sequenced envelope is stale.
    past_end: bool,
    pending: BTreeMap<u64, Parked>,
}

impl ReorderBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn expected(&self) -> Option<u64> {
        self.expected
    }

    #[inline]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn pending_seqs(&self) -> impl Iterator<Item = u64> + '_ {
        self.pending.keys().copied()
    }

    pub fn clear(&mut self) {
        self.expected = None;
        self.past_end = false;
        self.pending.clear();
    }

    /// Move `expected` past `released`.
    fn advance(&mut self, released: u64) {
        match released.checked_add(1) {
            Some(next) => self.expected = Some(next),
            None => {
                self.expected = Some(u64::MAX);
                self.past_end = true;
            }
        }
    }

    /// Feed one decoded envelope; in-order envelopes are appended to `out`.
    pub fn admit(
        &mut self,
        envelope: Envelope,
        now: Instant,
        out: &mut Vec<Envelope>,
    ) -> AdmitOutcome {
        let Some(seq) = envelope.seq else {
            out.push(envelope);
            return AdmitOutcome::Unordered;
        };

        let Some(expected) = self.expected else {
            out.push(envelope);
            self.advance(seq);
            self.drain(out);
            return AdmitOutcome::Baseline;
        };

        if self.past_end {
            return AdmitOutcome::Stale { expected };
        }
        if seq == expected {
            out.push(envelope);
            self.advance(seq);
            self.drain(out);
            AdmitOutcome::InOrder
        } else if seq > expected {
            if self.pending.contains_key(&seq) {
                return AdmitOutcome::Duplicate;
            }
            self.pending.insert(
                seq,
                Parked {
                    envelope,
                    arrived_at: now,
                },
            );
            self.drain(out);
            AdmitOutcome::Buffered
        } else {
            AdmitOutcome::Stale { expected }
        }
    }

    /// Gap-recovery check. Skips to the oldest parked envelope when it waited past the timeout or
    /// the buffer grew past its depth limit.
    pub fn sweep(
        &mut self,
        category: Category,
        now: Instant,
        policy: &ReorderPolicy,
        out: &mut Vec<Envelope>,
    ) -> Option<GapSkip> {
        let (&oldest_seq, oldest) = self.pending.first_key_value()?;
        let waited = now.saturating_duration_since(oldest.arrived_at);

        let reason = if waited > policy.buffer_timeout {
            GapReason::Timeout
        } else if self.pending.len() > policy.max_buffer_depth {
            GapReason::Overflow
        } else {
            return None;
        };

        let from = self.expected.unwrap_or(oldest_seq);
        let skip = GapSkip {
            category,
            skipped: from..oldest_seq,
            reason,
            pending: self.pending.len(),
        };
        self.expected = Some(oldest_seq);
        self.drain(out);
        Some(skip)
    }

    fn drain(&mut self, out: &mut Vec<Envelope>) {
        while !self.past_end {
            let Some(expected) = self.expected else {
                return;
            };
            let Some(entry) = self.pending.first_entry() else {
                return;
            };
            if *entry.key() != expected {
                return;
            }
            out.push(entry.remove().envelope);
            self.advance(expected);
        }
    }
}

/// Ordering state for every category of one connection epoch.
#[derive(Debug, Default)]
pub struct SequenceTracker {
    buffers: [ReorderBuffer; Category::COUNT],
}

impl SequenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn admit(
        &mut self,
        envelope: Envelope,
        now: Instant,
        out: &mut Vec<Envelope>,
    ) -> AdmitOutcome {
        let slot = envelope.category.index();
        self.buffers[slot].admit(envelope, now, out)
    }

    /// Run the gap-recovery check over every category, appending released envelopes to `out`.
    pub fn sweep(
        &mut self,
        now: Instant,
        policy: &ReorderPolicy,
        out: &mut Vec<Envelope>,
        skips: &mut Vec<GapSkip>,
    ) {
        for category in Category::ALL {
            if let Some(skip) = self.buffers[category.index()].sweep(category, now, policy, out) {
                skips.push(skip);
            }
        }
    }

    /// Forget all ordering state; the server restarts its counters on every connection.
    pub fn reset(&mut self) {
        for buffer in &mut self.buffers {
            buffer.clear();
        }
    }

    pub fn buffer(&self, category: Category) -> &ReorderBuffer {
        &self.buffers[category.index()]
    }

    pub fn total_pending(&self) -> usize {
        self.buffers.iter().map(ReorderBuffer::pending_len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CAT: Category = Category::DownloadUpdate;

    fn env(seq: u64) -> Envelope {
        Envelope::sequenced(CAT, seq)
    }

    fn seqs(out: &[Envelope]) -> Vec<Option<u64>> {
        out.iter().map(|e| e.seq).collect()
    }

    fn feed(buffer: &mut ReorderBuffer, order: &[u64], now: Instant) -> Vec<Option<u64>> {
        let mut out = Vec::new();
        for &seq in order {
            buffer.admit(env(seq), now, &mut out);
        }
        seqs(&out)
    }

    #[test]
    fn out_of_order_arrival_is_released_in_order() {
        let mut buffer = ReorderBuffer::new();
        let now = Instant::now();
        let mut out = Vec::new();

        assert_eq!(buffer.admit(env(0), now, &mut out), AdmitOutcome::Baseline);
        assert_eq!(buffer.admit(env(2), now, &mut out), AdmitOutcome::Buffered);
        assert_eq!(seqs(&out), vec![Some(0)]);
        assert_eq!(buffer.pending_len(), 1);

        assert_eq!(buffer.admit(env(1), now, &mut out), AdmitOutcome::InOrder);
        assert_eq!(seqs(&out), vec![Some(0), Some(1), Some(2)]);
        assert_eq!(buffer.expected(), Some(3));
        assert_eq!(buffer.pending_len(), 0);
    }

    #[test]
    fn first_sequence_seeds_baseline_at_any_value() {
        let mut buffer = ReorderBuffer::new();
        let delivered = feed(&mut buffer, &[501, 503, 502], Instant::now());
        assert_eq!(delivered, vec![Some(501), Some(502), Some(503)]);
        assert_eq!(buffer.expected(), Some(504));
    }

    #[test]
    fn duplicates_are_dropped() {
        let mut buffer = ReorderBuffer::new();
        let now = Instant::now();
        let mut out = Vec::new();

        buffer.admit(env(0), now, &mut out);
        assert_eq!(
            buffer.admit(env(0), now, &mut out),
            AdmitOutcome::Stale { expected: 1 }
        );
        assert_eq!(seqs(&out), vec![Some(0)]);

        assert_eq!(buffer.admit(env(3), now, &mut out), AdmitOutcome::Buffered);
        assert_eq!(buffer.admit(env(3), now, &mut out), AdmitOutcome::Duplicate);
        assert_eq!(buffer.pending_len(), 1);
        assert!(AdmitOutcome::Duplicate.is_dropped());
    }

    #[test]
    fn last_representable_sequence_is_delivered_once() {
        let now = Instant::now();
        let mut out = Vec::new();

        let mut buffer = ReorderBuffer::new();
        assert_eq!(buffer.admit(env(u64::MAX), now, &mut out), AdmitOutcome::Baseline);
        assert_eq!(
            buffer.admit(env(u64::MAX), now, &mut out),
            AdmitOutcome::Stale { expected: u64::MAX }
        );
        assert_eq!(out.len(), 1);

        // Reached in order and through the parked drain.
        let mut buffer = ReorderBuffer::new();
        out.clear();
        buffer.admit(env(u64::MAX - 2), now, &mut out);
        assert_eq!(buffer.admit(env(u64::MAX), now, &mut out), AdmitOutcome::Buffered);
        assert_eq!(buffer.admit(env(u64::MAX - 1), now, &mut out), AdmitOutcome::InOrder);
        assert_eq!(out.len(), 3);
        for seq in [u64::MAX, u64::MAX - 1, 0] {
            assert!(buffer.admit(env(seq), now, &mut out).is_dropped());
        }
        assert_eq!(out.len(), 3);
        assert_eq!(buffer.pending_len(), 0);

        buffer.clear();
        out.clear();
        assert_eq!(buffer.admit(env(0), now, &mut out), AdmitOutcome::Baseline);
    }

    #[test]
    fn unordered_envelope_bypasses_pending_state() {
        let mut buffer = ReorderBuffer::new();
        let now = Instant::now();
        let mut out = Vec::new();

        buffer.admit(env(0), now, &mut out);
        buffer.admit(env(2), now, &mut out);
        assert_eq!(
            buffer.admit(Envelope::new(CAT), now, &mut out),
            AdmitOutcome::Unordered
        );
        assert_eq!(seqs(&out), vec![Some(0), None]);
        assert_eq!(buffer.expected(), Some(1));
        assert_eq!(buffer.pending_len(), 1);
    }

    #[test]
    fn every_permutation_without_skips_is_sorted_and_deduplicated() {
        // All orders of a small window whose first element is the baseline.
        let tail = [1u64, 2, 3, 4];
        let mut perms = Vec::new();
        permute(&mut tail.to_vec(), 0, &mut perms);
        let now = Instant::now();
        for perm in perms {
            let mut input = vec![0u64];
            input.extend(perm.iter().copied());
            // Replay a couple of items to exercise both stale and parked duplicates.
            input.push(perm[0]);
            input.insert(2, perm[perm.len() - 1]);
            let mut buffer = ReorderBuffer::new();
            let delivered = feed(&mut buffer, &input, now);
            assert_eq!(
                delivered,
                (0..=4).map(Some).collect::<Vec<_>>(),
                "input order {input:?}"
            );
        }
    }

    fn permute(items: &mut Vec<u64>, k: usize, acc: &mut Vec<Vec<u64>>) {
        if k == items.len() {
            acc.push(items.clone());
            return;
        }
        for i in k..items.len() {
            items.swap(k, i);
            permute(items, k + 1, acc);
            items.swap(k, i);
        }
    }

    #[test]
    fn sweep_skips_gap_after_timeout() {
        let policy = ReorderPolicy::default();
        let mut buffer = ReorderBuffer::new();
        let start = Instant::now();
        let mut out = Vec::new();

        buffer.admit(env(0), start, &mut out);
        buffer.admit(env(2), start, &mut out);

        // Within tolerance: untouched.
        assert!(
            buffer
                .sweep(CAT, start + Duration::from_millis(10), &policy, &mut out)
                .is_none()
        );
        assert_eq!(seqs(&out), vec![Some(0)]);

        let skip = buffer
            .sweep(CAT, start + Duration::from_millis(60), &policy, &mut out)
            .expect("timed-out gap must be skipped");
        assert_eq!(skip.skipped, 1..2);
        assert_eq!(skip.reason, GapReason::Timeout);
        assert_eq!(skip.category, CAT);
        assert_eq!(seqs(&out), vec![Some(0), Some(2)]);
        assert_eq!(buffer.expected(), Some(3));

        // A late arrival of the skipped sequence is now stale.
        assert_eq!(
            buffer.admit(env(1), start, &mut out),
            AdmitOutcome::Stale { expected: 3 }
        );
    }

    #[test]
    fn sweep_skips_gap_on_overflow_before_timeout() {
        let policy = ReorderPolicy::default();
        let mut buffer = ReorderBuffer::new();
        let now = Instant::now();
        let mut out = Vec::new();

        buffer.admit(env(0), now, &mut out);
        for seq in 5..=15 {
            buffer.admit(env(seq), now, &mut out);
        }
        assert_eq!(buffer.pending_len(), 11);

        let skip = buffer
            .sweep(CAT, now, &policy, &mut out)
            .expect("overflow must force progress");
        assert_eq!(skip.reason, GapReason::Overflow);
        assert_eq!(skip.skipped, 1..5);
        assert_eq!(skip.pending, 11);
        assert_eq!(out.len(), 12);
        assert_eq!(buffer.pending_len(), 0);
    }

    #[test]
    fn sweep_stops_at_next_hole() {
        let policy = ReorderPolicy::default();
        let mut buffer = ReorderBuffer::new();
        let start = Instant::now();
        let mut out = Vec::new();

        buffer.admit(env(0), start, &mut out);
        buffer.admit(env(2), start, &mut out);
        buffer.admit(env(5), start + Duration::from_millis(40), &mut out);

        let skip = buffer
            .sweep(CAT, start + Duration::from_millis(60), &policy, &mut out)
            .unwrap();
        assert_eq!(skip.skipped, 1..2);
        assert_eq!(seqs(&out), vec![Some(0), Some(2)]);
        assert_eq!(buffer.pending_seqs().collect::<Vec<_>>(), vec![5]);

        // 5 arrived 40ms in; it is not yet overdue at 60ms.
        assert!(
            buffer
                .sweep(CAT, start + Duration::from_millis(80), &policy, &mut out)
                .is_none()
        );
        let skip = buffer
            .sweep(CAT, start + Duration::from_millis(100), &policy, &mut out)
            .unwrap();
        assert_eq!(skip.skipped, 3..5);
    }

    #[test]
    fn tracker_orders_categories_independently_and_resets() {
        let mut tracker = SequenceTracker::new();
        let now = Instant::now();
        let mut out = Vec::new();

        tracker.admit(Envelope::sequenced(Category::UploadUpdate, 10), now, &mut out);
        tracker.admit(Envelope::sequenced(Category::DownloadUpdate, 3), now, &mut out);
        tracker.admit(Envelope::sequenced(Category::UploadUpdate, 12), now, &mut out);
        tracker.admit(Envelope::sequenced(Category::DownloadUpdate, 4), now, &mut out);
        assert_eq!(out.len(), 3);
        assert_eq!(tracker.total_pending(), 1);
        assert_eq!(tracker.buffer(Category::UploadUpdate).expected(), Some(11));
        assert_eq!(tracker.buffer(Category::DownloadUpdate).expected(), Some(5));

        tracker.reset();
        assert_eq!(tracker.total_pending(), 0);
        for category in Category::ALL {
            assert!(tracker.buffer(category).expected().is_none());
        }

        out.clear();
        assert_eq!(
            tracker.admit(Envelope::sequenced(Category::UploadUpdate, 0), now, &mut out),
            AdmitOutcome::Baseline
        );
    }

    #[test]
    fn tracker_sweep_reports_skips_per_category() {
        let policy = ReorderPolicy::default();
        let mut tracker = SequenceTracker::new();
        let start = Instant::now();
        let mut out = Vec::new();
        let mut skips = Vec::new();

        for category in [Category::UploadUpdate, Category::StatisticsUpdate] {
            tracker.admit(Envelope::sequenced(category, 1), start, &mut out);
            tracker.admit(Envelope::sequenced(category, 4), start, &mut out);
        }
        out.clear();
        tracker.sweep(start + Duration::from_millis(51), &policy, &mut out, &mut skips);
        assert_eq!(skips.len(), 2);
        assert!(skips.iter().all(|s| s.skipped == (2..4)));
        assert_eq!(out.len(), 2);
    }
}

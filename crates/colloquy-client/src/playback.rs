//! Gapless playback scheduling for audio buffers that arrive in
//! arbitrarily-sized chunks at arbitrary times.

#[cfg(feature = "audio")]
mod speaker;

#[cfg(feature = "audio")]
pub use speaker::{SpeakerOutput, SpeakerSink};

use std::collections::BTreeSet;

/// Accepts decoded samples for the output device.
pub trait PlaybackSink {
    fn sample_rate_hz(&self) -> u32;

    /// Queue samples behind everything already queued.
    fn enqueue(&mut self, samples: &[f32]);

    /// Drop everything queued but not yet played.
    fn clear(&mut self);
}

/// Handle for one scheduled buffer, in seconds on the output clock.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScheduledBuffer {
    pub id: u64,
    pub start_at: f64,
    pub end_at: f64,
}

/// Chains buffers back-to-back against a monotonic cursor.
///
/// Each buffer starts at `max(cursor, now)` and advances the cursor by
/// its duration, so buffers scheduled before the cursor is reached play
/// with no gap and no overlap. A buffer arriving after the cursor has
/// passed starts immediately; the silence before it is not corrected.
#[derive(Debug, Default)]
pub struct PlaybackScheduler {
    next_start: f64,
    next_id: u64,
    active: BTreeSet<u64>,
}

impl PlaybackScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, duration_secs: f64, now: f64) -> ScheduledBuffer {
        let start_at = self.next_start.max(now);
        let id = self.next_id;
        self.next_id += 1;
        self.active.insert(id);
        self.next_start = start_at + duration_secs;
        ScheduledBuffer {
            id,
            start_at,
            end_at: self.next_start,
        }
    }

    /// Marks a buffer as finished playing. Returns true when this
    /// completion drained the active set.
    pub fn complete(&mut self, id: u64) -> bool {
        self.active.remove(&id) && self.active.is_empty()
    }

    /// Stops tracking every buffer and rewinds the cursor to zero.
    /// Returns how many buffers were cancelled.
    pub fn cancel_all(&mut self) -> usize {
        let cancelled = self.active.len();
        self.active.clear();
        self.next_start = 0.0;
        cancelled
    }

    pub fn cursor(&self) -> f64 {
        self.next_start
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffers_chain_without_gap_or_overlap() {
        let mut scheduler = PlaybackScheduler::new();

        let a = scheduler.schedule(0.5, 0.0);
        let b = scheduler.schedule(0.25, 0.1);
        let c = scheduler.schedule(0.125, 0.4);

        assert_eq!(a.start_at, 0.0);
        assert_eq!(a.end_at, 0.5);
        assert_eq!(b.start_at, a.end_at);
        assert_eq!(c.start_at, b.end_at);
        assert_eq!(scheduler.cursor(), 0.875);

        // Total span equals the sum of durations.
        assert!((c.end_at - (0.5 + 0.25 + 0.125)).abs() < 1e-12);
    }

    #[test]
    fn late_arrival_starts_at_now() {
        let mut scheduler = PlaybackScheduler::new();
        scheduler.schedule(0.5, 0.0);

        // Arrives after the cursor has been passed by the clock.
        let late = scheduler.schedule(0.5, 0.7);
        assert_eq!(late.start_at, 0.7);
        assert_eq!(scheduler.cursor(), 1.2);
    }

    #[test]
    fn drained_only_when_every_buffer_completes() {
        let mut scheduler = PlaybackScheduler::new();
        let a = scheduler.schedule(0.1, 0.0);
        let b = scheduler.schedule(0.1, 0.0);

        assert!(!scheduler.complete(a.id));
        assert!(scheduler.complete(b.id));
        assert_eq!(scheduler.active_count(), 0);
    }

    #[test]
    fn completing_unknown_id_is_a_noop() {
        let mut scheduler = PlaybackScheduler::new();
        scheduler.schedule(0.1, 0.0);
        assert!(!scheduler.complete(999));
        assert_eq!(scheduler.active_count(), 1);
    }

    #[test]
    fn cancel_all_resets_cursor() {
        let mut scheduler = PlaybackScheduler::new();
        scheduler.schedule(1.0, 0.0);
        scheduler.schedule(1.0, 0.0);

        assert_eq!(scheduler.cancel_all(), 2);
        assert_eq!(scheduler.cursor(), 0.0);
        assert_eq!(scheduler.active_count(), 0);

        // Scheduling again after cancel starts fresh.
        let next = scheduler.schedule(0.5, 0.0);
        assert_eq!(next.start_at, 0.0);
    }
}

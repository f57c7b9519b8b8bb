use std::time::Duration;

use tokio::time::Instant;

/// Where and how long one fragment plays.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackSlot {
    pub start_at: Instant,
    /// Wall-clock length after applying the rate multiplier.
    pub effective: Duration,
}

/// Gapless sequential playback with drift correction.
///
/// Fragments are placed back to back at `max(now, previous end)`. If the
/// schedule has run more than `max_lead` ahead of now, the fragment starts
/// immediately instead, so the queue never accumulates silent debt.
#[derive(Debug)]
pub struct PlaybackScheduler {
    max_lead: Duration,
    playing: bool,
    scheduled_end: Option<Instant>,
}

impl PlaybackScheduler {
    pub fn new(max_lead: Duration) -> Self {
        Self {
            max_lead,
            playing: false,
            scheduled_end: None,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn scheduled_end(&self) -> Option<Instant> {
        self.scheduled_end
    }

    /// Pure projection: fragment duration + rate + clock -> slot.
    /// Marks the scheduler busy until `finish` is called.
    pub fn schedule(&mut self, now: Instant, duration: Duration, rate: f64) -> PlaybackSlot {
        let mut start_at = match self.scheduled_end {
            Some(end) if end > now => end,
            _ => now,
        };
        if start_at.duration_since(now) > self.max_lead {
            start_at = now;
        }

        let effective = duration.div_f64(rate.max(f64::EPSILON));
        self.scheduled_end = Some(start_at + effective);
        self.playing = true;

        PlaybackSlot { start_at, effective }
    }

    /// Completion callback from the sink.
    pub fn finish(&mut self) {
        self.playing = false;
    }

    pub fn reset(&mut self) {
        self.playing = false;
        self.scheduled_end = None;
    }
}

use std::time::Duration;

use tokio::time::Instant;

/// Throttle for draining the input queue.
///
/// The first entry after an idle period goes out immediately. While entries
/// remain, each following transmission waits for the fixed throttle interval
/// so bursts of commits leave at a steady rate.
#[derive(Debug)]
pub struct Dispatcher {
    throttle: Duration,
    next_at: Option<Instant>,
}

impl Dispatcher {
    pub fn new(throttle: Duration) -> Self {
        Self {
            throttle,
            next_at: None,
        }
    }

    /// Deadline of the pending throttled send, if one is scheduled.
    pub fn deadline(&self) -> Option<Instant> {
        self.next_at
    }

    pub fn is_ready(&self, now: Instant) -> bool {
        self.next_at.map_or(true, |at| now >= at)
    }

    /// Record a transmission. `remaining` is the queue depth after the dequeue.
    pub fn on_sent(&mut self, now: Instant, remaining: usize) {
        self.next_at = if remaining > 0 {
            Some(now + self.throttle)
        } else {
            None
        };
    }

    pub fn cancel(&mut self) {
        self.next_at = None;
    }
}

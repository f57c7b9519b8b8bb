use std::collections::VecDeque;
use std::time::Duration;

use serde::Serialize;

use super::event::GroupId;
use crate::kernel::time::duration_for_samples;

/// Little-endian PCM16 mono, ready for the remote.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedChunk {
    pub data: Vec<u8>,
    pub sample_rate: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueueEntry {
    pub group_id: GroupId,
    pub audio: EncodedChunk,
    pub target_languages: Vec<String>,
}

/// Committed phrases awaiting transmission. Strict FIFO.
#[derive(Debug, Default)]
pub struct InputQueue {
    entries: VecDeque<QueueEntry>,
}

impl InputQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: QueueEntry) {
        self.entries.push_back(entry);
    }

    pub fn pop(&mut self) -> Option<QueueEntry> {
        self.entries.pop_front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Decoded remote audio awaiting playback.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputFragment {
    pub group_id: GroupId,
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub duration: Duration,
}

impl OutputFragment {
    pub fn new(group_id: GroupId, samples: Vec<f32>, sample_rate: u32) -> Self {
        let duration = duration_for_samples(samples.len(), sample_rate);
        Self {
            group_id,
            samples,
            sample_rate,
            duration,
        }
    }

    pub fn duration_seconds(&self) -> f64 {
        self.duration.as_secs_f64()
    }
}

/// Fragments in arrival order. Never reordered, even when a later fragment
/// belongs to an earlier group.
#[derive(Debug, Default)]
pub struct OutputQueue {
    fragments: VecDeque<OutputFragment>,
}

impl OutputQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, fragment: OutputFragment) {
        self.fragments.push_back(fragment);
    }

    pub fn pop(&mut self) -> Option<OutputFragment> {
        self.fragments.pop_front()
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    pub fn clear(&mut self) {
        self.fragments.clear();
    }
}

/// Queue depths as shown to the UI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub total: u64,
    pub in_queue: u64,
    /// Committed phrases that left the input queue but whose turn the remote
    /// has not acknowledged yet.
    pub processing: u64,
    pub out_queue: u64,
}

impl QueueStats {
    pub fn compute(committed: u64, in_queue: usize, acknowledged_turns: u64, out_queue: usize) -> Self {
        let in_queue = in_queue as u64;
        let out_queue = out_queue as u64;
        let processing = committed.saturating_sub(in_queue + acknowledged_turns);
        Self {
            total: in_queue + processing + out_queue,
            in_queue,
            processing,
            out_queue,
        }
    }
}

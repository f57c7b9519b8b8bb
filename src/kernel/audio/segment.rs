use serde::{Deserialize, Serialize};

/// Audio of one voice-activity episode, or one forced sub-chunk of a long one.
///
/// Lives only inside the segmenter while recording. The group id is assigned
/// when the reactor commits it, and the start time is kept in the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Phrase {
    pub samples: Vec<f32>,
    /// Capture-timeline position (in samples) where this phrase started.
    pub start_sample: u64,
    /// True for forced splits: the transcript unit stays open.
    pub continuous: bool,
}

impl Phrase {
    pub fn new(start_sample: u64) -> Self {
        Self {
            samples: Vec::new(),
            start_sample,
            continuous: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

use crate::kernel::config::SegmenterConfig;
use crate::kernel::time::{ms_for_samples, samples_for_ms};

use super::segment::Phrase;

#[derive(Debug, Clone)]
pub enum SegmentEvent {
    /// A new phrase began recording. The reactor stamps the ledger for the next group id.
    Started,
    /// A phrase was finalized (natural end or forced split).
    Committed(Phrase),
}

/// What the segmenter made of one frame.
#[derive(Debug, Clone, Default)]
pub struct FrameReport {
    pub voiced: bool,
    pub rms: f32,
    pub frame_ms: u64,
    pub events: Vec<SegmentEvent>,
}

/// Energy-based VAD plus phrase chunking.
///
/// Idle until the first voiced frame, then every frame (voiced or not) is
/// buffered. The phrase is committed when silence since the last voiced frame
/// reaches the silence timeout, or split early (continuous) when the phrase
/// has run longer than the max phrase duration and the silence timeout has
/// not yet passed, voiced frame or not. Durations are measured on the
/// capture timeline.
pub struct Segmenter {
    // Configuration
    sample_rate: u32,
    threshold_rms: f32,
    silence_timeout: u64, // samples
    max_phrase: u64,      // samples

    // State
    clock: u64,          // samples seen so far
    last_voice_end: u64, // capture position right after the last voiced frame
    phrase: Option<Phrase>,
    last_rms: f32,
}

impl Segmenter {
    pub fn new(config: &SegmenterConfig) -> Self {
        Self {
            sample_rate: config.sample_rate,
            threshold_rms: config.vad_rms_threshold,
            silence_timeout: samples_for_ms(config.silence_timeout_ms, config.sample_rate),
            max_phrase: samples_for_ms(config.max_phrase_ms, config.sample_rate),
            clock: 0,
            last_voice_end: 0,
            phrase: None,
            last_rms: 0.0,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.phrase.is_some()
    }

    pub fn level(&self) -> f32 {
        self.last_rms
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Process one frame of mono samples.
    pub fn process(&mut self, samples: &[f32]) -> FrameReport {
        if samples.is_empty() {
            return FrameReport::default();
        }

        // 1. RMS energy
        let sq_sum: f32 = samples.iter().map(|&x| x * x).sum();
        let rms = (sq_sum / samples.len() as f32).sqrt();
        self.last_rms = rms;

        let frame_start = self.clock;
        self.clock += samples.len() as u64;
        let frame_end = self.clock;

        // 2. Classify
        let voiced = rms > self.threshold_rms;
        let mut events = Vec::new();

        // 3. State machine
        if voiced {
            self.last_voice_end = frame_end;
            if self.phrase.is_none() {
                self.phrase = Some(Phrase::new(frame_start));
                events.push(SegmentEvent::Started);
            }
        }

        if let Some(phrase) = self.phrase.as_mut() {
            phrase.samples.extend_from_slice(samples);

            let silence = frame_end - self.last_voice_end;
            let elapsed = frame_start - phrase.start_sample;

            if silence >= self.silence_timeout {
                if let Some(done) = self.phrase.take() {
                    events.push(SegmentEvent::Committed(done));
                }
            } else if elapsed > self.max_phrase {
                if let Some(mut done) = self.phrase.take() {
                    done.continuous = true;
                    events.push(SegmentEvent::Committed(done));
                }
                self.phrase = Some(Phrase::new(frame_end));
                events.push(SegmentEvent::Started);
            }
        }

        FrameReport {
            voiced,
            rms,
            frame_ms: ms_for_samples(samples.len() as u64, self.sample_rate),
            events,
        }
    }

    /// Commit whatever is buffered as a natural end (end of input).
    /// Returns None when nothing is recording or the buffer is empty.
    pub fn flush(&mut self) -> Option<Phrase> {
        self.phrase.take().filter(|p| !p.is_empty())
    }

    /// Drop any in-progress phrase and restart the capture timeline.
    pub fn reset(&mut self) {
        self.clock = 0;
        self.last_voice_end = 0;
        self.phrase = None;
        self.last_rms = 0.0;
    }
}

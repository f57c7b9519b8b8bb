use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::config::PacingConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PaceState {
    #[default]
    Normal,
    Accelerating,
}

/// Outcome of one pacing evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PacingDecision {
    pub pace: PaceState,
    pub rate: f64,
    /// Ask the remote to summarize and speed up (best effort).
    pub send_hint: bool,
}

/// Latency feedback loop.
///
/// Three thresholds: above `pace` the remote is nudged, above `pitch` local
/// playback speeds up one step per cycle, below `normal` it slows down one
/// step. Between `normal` and `pitch` the rate holds, which keeps a latency
/// sitting on a boundary from oscillating.
pub struct PacingController {
    config: PacingConfig,
    rng: StdRng,
}

impl PacingController {
    pub fn new(config: PacingConfig) -> Self {
        Self {
            config,
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic hint sampling, for tests and replays.
    pub fn with_seed(config: PacingConfig, seed: u64) -> Self {
        Self {
            config,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn hint_text(&self) -> &str {
        &self.config.hint_text
    }

    pub fn max_rate(&self) -> f64 {
        self.config.max_rate
    }

    pub fn evaluate(&mut self, latency_s: f64, current_rate: f64) -> PacingDecision {
        let cfg = &self.config;

        let (pace, send_hint) = if latency_s > cfg.pace_threshold_s {
            let hint = cfg.hint_probability > 0.0 && self.rng.gen_bool(cfg.hint_probability);
            (PaceState::Accelerating, hint)
        } else {
            (PaceState::Normal, false)
        };

        let rate = if latency_s > cfg.pitch_threshold_s {
            (current_rate + cfg.rate_step).min(cfg.max_rate)
        } else if latency_s < cfg.normal_threshold_s {
            (current_rate - cfg.rate_step).max(1.0)
        } else {
            current_rate
        };

        PacingDecision {
            pace,
            rate: round_rate(rate).clamp(1.0, cfg.max_rate),
            send_hint,
        }
    }
}

// Four decimals, so repeated steps do not accumulate float drift.
fn round_rate(rate: f64) -> f64 {
    (rate * 10_000.0).round() / 10_000.0
}

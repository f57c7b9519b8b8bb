use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use super::error::SessionError;

pub const API_KEY_ENV: &str = "PACER_API_KEY";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacerConfig {
    pub segmenter: SegmenterConfig,
    pub dispatch: DispatchConfig,
    pub pacing: PacingConfig,
    pub playback: PlaybackConfig,
    pub policy: PolicyConfig,
    pub session: SessionConfig,
    pub remote: RemoteConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    /// Pipeline (and upstream) sample rate.
    pub sample_rate: u32,
    pub frame_size: usize,
    pub vad_rms_threshold: f32,
    pub silence_timeout_ms: u64,
    pub max_phrase_ms: u64,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            frame_size: 4096,
            vad_rms_threshold: 0.008,
            silence_timeout_ms: 2000,
            max_phrase_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub throttle_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self { throttle_ms: 50 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    /// Below this latency (seconds) the playback rate relaxes toward 1.0.
    pub normal_threshold_s: f64,
    /// Above this latency the pace state is Accelerating.
    pub pace_threshold_s: f64,
    /// Above this latency local playback speeds up.
    pub pitch_threshold_s: f64,
    pub rate_step: f64,
    pub max_rate: f64,
    pub hint_probability: f64,
    pub hint_text: String,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            normal_threshold_s: 6.0,
            pace_threshold_s: 10.0,
            pitch_threshold_s: 20.0,
            rate_step: 0.05,
            max_rate: 1.2,
            hint_probability: 0.1,
            hint_text: "[SYSTEM: SUMMARIZE_AND_SPEED_UP]".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Sample rate of decoded remote audio.
    pub output_sample_rate: u32,
    /// Maximum look-ahead before the scheduler snaps back to "now".
    pub max_lead_ms: u64,
    pub idle_check_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            output_sample_rate: 24_000,
            max_lead_ms: 500,
            idle_check_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Room in which Transcribe mode auto-switches back to Translate.
    pub local_room: String,
    pub mic_auto_timeout_ms: u64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            local_room: "Lokalt i min mobil".to_string(),
            mic_auto_timeout_ms: 4000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub target_languages: Vec<String>,
    pub room: String,
    /// Drop ledger entries older than the group currently playing.
    pub evict_played_groups: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            target_languages: vec!["Svenska".to_string()],
            room: "Stora salen".to_string(),
            evict_played_groups: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteBackend {
    #[default]
    Loopback,
    Http,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub backend: RemoteBackend,
    pub base_url: String,
    pub api_key: Option<String>,
    pub request_timeout_ms: u64,
    pub loopback_delay_ms: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            backend: RemoteBackend::Loopback,
            base_url: "http://localhost:8080".to_string(),
            api_key: None,
            request_timeout_ms: 10_000,
            loopback_delay_ms: 800,
        }
    }
}

impl PacerConfig {
    /// Defaults, overlaid with the JSON file (if any) and the API key env var.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                serde_json::from_str::<PacerConfig>(&raw)
                    .with_context(|| format!("parsing config {}", path.display()))?
            }
            None => PacerConfig::default(),
        };

        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                config.remote.api_key = Some(key);
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Static sanity checks, independent of the session being started.
    pub fn validate(&self) -> Result<(), SessionError> {
        let seg = &self.segmenter;
        if seg.sample_rate == 0 || seg.frame_size == 0 {
            return Err(SessionError::Config("sample rate and frame size must be non-zero".into()));
        }
        if seg.vad_rms_threshold < 0.0 {
            return Err(SessionError::Config("VAD threshold must be non-negative".into()));
        }

        let p = &self.pacing;
        if !(p.normal_threshold_s <= p.pace_threshold_s && p.pace_threshold_s <= p.pitch_threshold_s) {
            return Err(SessionError::Config(
                "latency thresholds must satisfy normal <= pace <= pitch".into(),
            ));
        }
        if p.max_rate < 1.0 || p.rate_step <= 0.0 {
            return Err(SessionError::Config("max rate must be >= 1.0 and step positive".into()));
        }
        if !(0.0..=1.0).contains(&p.hint_probability) {
            return Err(SessionError::Config("hint probability must be within [0, 1]".into()));
        }

        if self.playback.output_sample_rate == 0 {
            return Err(SessionError::Config("output sample rate must be non-zero".into()));
        }
        Ok(())
    }

    /// Checks that must pass before any resource is acquired for a session.
    pub fn validate_for_connect(&self, target_languages: &[String]) -> Result<(), SessionError> {
        if target_languages.iter().all(|lang| lang.trim().is_empty()) {
            return Err(SessionError::Config("select at least one target language".into()));
        }
        if self.remote.backend == RemoteBackend::Http
            && self.remote.api_key.as_deref().map_or(true, |k| k.trim().is_empty())
        {
            return Err(SessionError::Config(format!("{} missing", API_KEY_ENV)));
        }
        Ok(())
    }
}

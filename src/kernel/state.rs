use serde::Serialize;

use super::event::{ConnectionStatus, Mode};
use super::pacing::PaceState;
use super::queue::QueueStats;

/// Strict state delta. This is the ONLY way session state mutates.
#[derive(Debug, Clone, PartialEq)]
pub enum StateDelta {
    Status(ConnectionStatus),
    Mode(Mode),
    Pacing { pace: PaceState, rate: f64 },
    Latency(f64),
    TargetLanguages(Vec<String>),
    Room(String),
    /// Replaces the previous message; no history is kept.
    Error(String),
    ClearError,
    PacketSent,
    PacketReceived,
    /// Back to disconnected defaults. Languages and room survive.
    Reset,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionState {
    pub status: ConnectionStatus,
    pub mode: Mode,
    /// Always within [1.0, max rate].
    pub playback_rate: f64,
    pub pace: PaceState,
    pub latency_seconds: f64,
    pub target_languages: Vec<String>,
    pub room: String,
    pub last_error: Option<String>,

    // Activity indicators, toggled per packet. Cosmetic.
    pub sending: bool,
    pub receiving: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            mode: Mode::Off,
            playback_rate: 1.0,
            pace: PaceState::Normal,
            latency_seconds: 0.0,
            target_languages: Vec::new(),
            room: String::new(),
            last_error: None,
            sending: false,
            receiving: false,
        }
    }
}

impl SessionState {
    pub fn new(target_languages: Vec<String>, room: String) -> Self {
        Self {
            target_languages,
            room,
            ..Self::default()
        }
    }

    /// Pure reduction: State + Delta -> Mutated State
    pub fn reduce(&mut self, delta: StateDelta) {
        match delta {
            StateDelta::Status(status) => self.status = status,
            StateDelta::Mode(mode) => self.mode = mode,
            StateDelta::Pacing { pace, rate } => {
                self.pace = pace;
                self.playback_rate = rate.max(1.0);
            }
            StateDelta::Latency(seconds) => self.latency_seconds = seconds.max(0.0),
            StateDelta::TargetLanguages(langs) => self.target_languages = langs,
            StateDelta::Room(room) => self.room = room,
            StateDelta::Error(msg) => self.last_error = Some(msg),
            StateDelta::ClearError => self.last_error = None,
            StateDelta::PacketSent => self.sending = !self.sending,
            StateDelta::PacketReceived => self.receiving = !self.receiving,
            StateDelta::Reset => {
                self.status = ConnectionStatus::Disconnected;
                self.playback_rate = 1.0;
                self.pace = PaceState::Normal;
                self.latency_seconds = 0.0;
                self.sending = false;
                self.receiving = false;
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }
}

/// Read-only view for the UI, published after every reactor step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub status: ConnectionStatus,
    pub mode: Mode,
    pub queue: QueueStats,
    pub playback_rate: f64,
    pub pace: PaceState,
    pub latency_seconds: f64,
    /// Input level, 0.0 - 1.0.
    pub level: f32,
    pub recording: bool,
    pub playing: bool,
    pub sending: bool,
    pub receiving: bool,
    pub last_error: Option<String>,
}

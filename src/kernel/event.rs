use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::SessionError;

/// Correlation id of one committed phrase. Strictly increasing per session, starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct GroupId(pub u64);

impl GroupId {
    pub fn next(self) -> Self {
        GroupId(self.0 + 1)
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Mode {
    #[default]
    Off,
    /// Speak the translation through the output device.
    Translate,
    /// Capture and transcribe only; translated audio is muted.
    Transcribe,
}

impl FromStr for Mode {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(Mode::Off),
            "translate" => Ok(Mode::Translate),
            "transcribe" => Ok(Mode::Transcribe),
            other => Err(SessionError::Config(format!("unknown mode '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// One fixed-size block of mono samples from the capture callback.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub samples: Vec<f32>,
}

impl AudioFrame {
    pub fn new(samples: Vec<f32>) -> Self {
        Self { samples }
    }
}

/// Synthesized audio as delivered by the remote, before decoding.
#[derive(Debug, Clone)]
pub enum AudioPayload {
    Base64(String),
    Pcm16(Vec<u8>),
}

/// Asynchronous notifications from the remote channel.
#[derive(Debug, Clone)]
pub enum RemoteEvent {
    Opened,
    /// `group_id` is set only when the remote echoes a correlation id.
    Audio {
        payload: AudioPayload,
        group_id: Option<GroupId>,
    },
    PartialText {
        text: String,
        is_final: bool,
    },
    TurnComplete,
    Closed,
    Error(String),
}

/// Requests from the UI / session control surface.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlCommand {
    SetMode(Mode),
    SetTargetLanguages(Vec<String>),
    SetRoom(String),
    Disconnect,
    /// Tear down and leave the driver loop.
    Shutdown,
}

#[derive(Debug, Clone)]
pub enum Event {
    /// Captured audio (capture thread).
    Frame(AudioFrame),
    /// Remote channel callbacks (network tasks).
    Remote(RemoteEvent),
    /// The sink finished playing the fragment it was last handed.
    PlaybackFinished { group_id: GroupId },
    Control(ControlCommand),
    /// A driver-side failure while executing a side effect.
    Fault(SessionError),
}

use thiserror::Error;

/// Every failure the session can observe, grouped by how it is handled.
///
/// `Device`, `Channel` and `Config` are fatal to the current session and funnel
/// into the reactor's teardown. `Decode` only drops the offending fragment.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Capture or output device could not be opened or died.
    #[error("audio device unavailable: {0}")]
    Device(String),

    /// Send/receive failure or unexpected close of the remote channel.
    #[error("connection interrupted: {0}")]
    Channel(String),

    /// Malformed audio payload from the remote.
    #[error("could not decode audio payload: {0}")]
    Decode(String),

    /// Missing credentials, empty language selection, bad thresholds.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl SessionError {
    pub fn is_fatal(&self) -> bool {
        !matches!(self, SessionError::Decode(_))
    }
}

use tokio::sync::mpsc;

use crate::kernel::config::{RemoteBackend, RemoteConfig};
use crate::kernel::error::SessionError;
use crate::kernel::event::{Event, Mode};
use crate::kernel::queue::QueueEntry;

pub mod http;
pub mod loopback;

/// Session parameters fixed at connect time.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenRequest {
    pub mode: Mode,
    pub target_languages: Vec<String>,
}

impl OpenRequest {
    /// Standing instruction for the remote interpreter.
    pub fn instruction(&self) -> String {
        let langs = self.target_languages.join(", ");
        match self.mode {
            Mode::Transcribe => "Transcribe the speaker verbatim. Do not translate.".to_string(),
            _ => format!(
                "You are a simultaneous interpreter. Translate everything the speaker says into {}. \
                 Speak only the translation, keep the speaker's tone, and never answer questions yourself.",
                langs
            ),
        }
    }
}

/// An open bidirectional session with the remote.
///
/// Sends hand the data to a background worker and return immediately.
/// Everything coming back (audio, text, turn completion, close, errors)
/// arrives on the reactor's event channel as `Event::Remote`.
pub trait RemoteChannel {
    fn send_audio(&mut self, entry: &QueueEntry) -> Result<(), SessionError>;
    /// Best effort; callers log and ignore failures.
    fn send_hint(&mut self, text: &str) -> Result<(), SessionError>;
    fn close(&mut self);
}

pub trait RemoteConnector {
    fn open(
        &mut self,
        request: OpenRequest,
        events: mpsc::Sender<Event>,
    ) -> Result<Box<dyn RemoteChannel>, SessionError>;
}

pub fn connector_for(config: &RemoteConfig, input_sample_rate: u32, output_sample_rate: u32) -> Box<dyn RemoteConnector> {
    match config.backend {
        RemoteBackend::Http => Box::new(http::HttpConnector::new(config.clone())),
        RemoteBackend::Loopback => Box::new(loopback::LoopbackConnector::new(
            std::time::Duration::from_millis(config.loopback_delay_ms),
            input_sample_rate,
            output_sample_rate,
        )),
    }
}

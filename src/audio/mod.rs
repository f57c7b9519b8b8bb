use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::kernel::error::SessionError;
use crate::kernel::event::Event;
use crate::kernel::queue::OutputFragment;

pub mod capture;
pub mod codec;
pub mod playback;
pub mod processing;
pub mod resample;

/// Microphone side. Frames are delivered as `Event::Frame` on `events`.
pub trait CaptureControl {
    fn start(&mut self, events: mpsc::Sender<Event>) -> Result<(), SessionError>;
    /// Must be safe to call when already stopped.
    fn stop(&mut self);
}

/// Speaker side. `play` returns once the fragment is scheduled; completion is
/// reported later as `Event::PlaybackFinished`.
pub trait AudioSink {
    fn start(&mut self) -> Result<(), SessionError>;
    fn stop(&mut self);
    fn set_muted(&mut self, muted: bool);
    fn play(
        &mut self,
        fragment: OutputFragment,
        start_at: Instant,
        rate: f64,
        events: mpsc::Sender<Event>,
    ) -> Result<(), SessionError>;
    fn beep(&mut self);
}

use tokio::time::Instant;

use super::event::Mode;
use super::queue::{OutputFragment, QueueEntry};

/// Everything the kernel wants done in the outside world.
/// The reactor only returns these; the driver executes them.
#[derive(Debug, Clone, PartialEq)]
pub enum SideEffect {
    OpenChannel {
        mode: Mode,
        target_languages: Vec<String>,
    },
    Transmit(QueueEntry),
    /// Out-of-band control text, best effort.
    SendHint(String),
    CloseChannel,
    StartCapture,
    StopCapture,
    StartOutput,
    StopOutput,
    SetOutputMuted(bool),
    StartPlayback {
        fragment: OutputFragment,
        start_at: Instant,
        rate: f64,
    },
    Beep,
}

use super::config::PolicyConfig;
use super::event::Mode;

/// What the policy may look at.
#[derive(Debug, Clone, Copy)]
pub struct PolicyContext<'a> {
    pub mode: Mode,
    pub room: &'a str,
}

/// Mode side effects that are not part of pacing: the reactor asks, the
/// policy answers with an optional mode to switch to. These are REQUESTS;
/// the reactor still validates them against the session state.
pub trait ModePolicy: Send {
    fn on_frame(&mut self, ctx: &PolicyContext<'_>, voiced: bool, frame_ms: u64) -> Option<Mode>;
    fn on_audio_arrival(&mut self, ctx: &PolicyContext<'_>) -> Option<Mode>;
    fn reset(&mut self) {}
}

/// Never switches.
#[derive(Debug, Default)]
pub struct NoopPolicy;

impl ModePolicy for NoopPolicy {
    fn on_frame(&mut self, _: &PolicyContext<'_>, _: bool, _: u64) -> Option<Mode> {
        None
    }

    fn on_audio_arrival(&mut self, _: &PolicyContext<'_>) -> Option<Mode> {
        None
    }
}

/// Phone-on-the-table setup: in the local room, Transcribe is a temporary
/// "listening" state. It falls back to Translate once the mic has been quiet
/// long enough, or as soon as translated audio shows up.
#[derive(Debug)]
pub struct LocalRoomPolicy {
    room: String,
    timeout_ms: u64,
    quiet_ms: u64,
}

impl LocalRoomPolicy {
    pub fn new(config: &PolicyConfig) -> Self {
        Self {
            room: config.local_room.clone(),
            timeout_ms: config.mic_auto_timeout_ms,
            quiet_ms: 0,
        }
    }

    fn applies(&self, ctx: &PolicyContext<'_>) -> bool {
        ctx.mode == Mode::Transcribe && ctx.room == self.room
    }
}

impl ModePolicy for LocalRoomPolicy {
    fn on_frame(&mut self, ctx: &PolicyContext<'_>, voiced: bool, frame_ms: u64) -> Option<Mode> {
        if voiced {
            self.quiet_ms = 0;
            return None;
        }
        self.quiet_ms += frame_ms;

        if self.applies(ctx) && self.quiet_ms > self.timeout_ms {
            self.quiet_ms = 0;
            return Some(Mode::Translate);
        }
        None
    }

    fn on_audio_arrival(&mut self, ctx: &PolicyContext<'_>) -> Option<Mode> {
        self.applies(ctx).then_some(Mode::Translate)
    }

    fn reset(&mut self) {
        self.quiet_ms = 0;
    }
}

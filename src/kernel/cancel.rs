use super::effect::SideEffect;
use super::event::Mode;

/// Which external resources the current session holds.
///
/// Teardown asks the registry what to release; anything already released is
/// skipped, which makes repeated teardowns no-ops.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ResourceRegistry {
    channel: bool,
    capture: bool,
    output: bool,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire everything a session needs. Returns the effects to run,
    /// channel first.
    pub fn acquire_all(&mut self, mode: Mode, target_languages: &[String]) -> Vec<SideEffect> {
        let mut effects = Vec::new();
        if !self.channel {
            self.channel = true;
            effects.push(SideEffect::OpenChannel {
                mode,
                target_languages: target_languages.to_vec(),
            });
        }
        if !self.capture {
            self.capture = true;
            effects.push(SideEffect::StartCapture);
        }
        if !self.output {
            self.output = true;
            effects.push(SideEffect::StartOutput);
        }
        effects
    }

    pub fn channel_open(&self) -> bool {
        self.channel
    }

    pub fn capture_active(&self) -> bool {
        self.capture
    }

    pub fn output_active(&self) -> bool {
        self.output
    }

    pub fn is_idle(&self) -> bool {
        !(self.channel || self.capture || self.output)
    }

    /// Capture stops first so no new frames arrive, then output, then the channel.
    pub fn release_all(&mut self) -> Vec<SideEffect> {
        let mut effects = Vec::new();
        if self.capture {
            self.capture = false;
            effects.push(SideEffect::StopCapture);
        }
        if self.output {
            self.output = false;
            effects.push(SideEffect::StopOutput);
        }
        if self.channel {
            self.channel = false;
            effects.push(SideEffect::CloseChannel);
        }
        effects
    }
}

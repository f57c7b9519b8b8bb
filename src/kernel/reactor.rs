use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::audio::segment::Phrase;
use super::audio::segmenter::{SegmentEvent, Segmenter};
use super::cancel::ResourceRegistry;
use super::config::PacerConfig;
use super::dispatch::Dispatcher;
use super::effect::SideEffect;
use super::error::SessionError;
use super::event::{ConnectionStatus, ControlCommand, Event, GroupId, Mode, RemoteEvent};
use super::ledger::CorrelationLedger;
use super::pacing::{PacingController, PacingDecision};
use super::policy::{LocalRoomPolicy, ModePolicy, PolicyContext};
use super::queue::{EncodedChunk, InputQueue, OutputFragment, OutputQueue, QueueEntry, QueueStats};
use super::scheduler::PlaybackScheduler;
use super::state::{SessionSnapshot, SessionState, StateDelta};
use super::telemetry::event::TelemetryEvent;
use super::telemetry::recorder::TelemetryRecorder;
use super::time::ms_for_samples;
use super::transcript::TranscriptLog;

use crate::audio::codec;
use crate::audio::{AudioSink, CaptureControl};
use crate::services::remote::{OpenRequest, RemoteChannel, RemoteConnector};

/// Single owner of every queue, counter and pacing value.
///
/// Capture, network and playback callbacks never touch this state directly;
/// they send `Event`s and the reactor folds them in one at a time.
pub struct Reactor {
    pub receiver: mpsc::Receiver<Event>,
    // Handed to drivers that report back (capture, remote, sink)
    tx_clone: mpsc::Sender<Event>,
    pub config: PacerConfig,
    pub state: SessionState,
    pub segmenter: Segmenter,
    pub ledger: CorrelationLedger,
    pub input_queue: InputQueue,
    pub output_queue: OutputQueue,
    pub dispatcher: Dispatcher,
    pub pacing: PacingController,
    pub playback: PlaybackScheduler,
    pub transcript: TranscriptLog,
    pub telemetry: TelemetryRecorder,
    pub resources: ResourceRegistry,
    policy: Box<dyn ModePolicy>,
    acknowledged_turns: u64,
    played_group: GroupId,
    shutdown: bool,
    snapshot_tx: watch::Sender<SessionSnapshot>,
}

impl Reactor {
    pub fn new(receiver: mpsc::Receiver<Event>, tx: mpsc::Sender<Event>, config: PacerConfig) -> Self {
        let state = SessionState::new(
            config.session.target_languages.clone(),
            config.session.room.clone(),
        );
        let segmenter = Segmenter::new(&config.segmenter);
        let (snapshot_tx, _) = watch::channel(Self::initial_snapshot(&state));

        Self {
            receiver,
            tx_clone: tx,
            state,
            segmenter,
            ledger: CorrelationLedger::new(),
            input_queue: InputQueue::new(),
            output_queue: OutputQueue::new(),
            dispatcher: Dispatcher::new(Duration::from_millis(config.dispatch.throttle_ms)),
            pacing: PacingController::new(config.pacing.clone()),
            playback: PlaybackScheduler::new(Duration::from_millis(config.playback.max_lead_ms)),
            transcript: TranscriptLog::new(),
            telemetry: TelemetryRecorder::new(),
            resources: ResourceRegistry::new(),
            policy: Box::new(LocalRoomPolicy::new(&config.policy)),
            acknowledged_turns: 0,
            played_group: GroupId::default(),
            shutdown: false,
            snapshot_tx,
            config,
        }
    }

    pub fn with_policy(mut self, policy: Box<dyn ModePolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_pacing(mut self, pacing: PacingController) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn sender(&self) -> mpsc::Sender<Event> {
        self.tx_clone.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn played_group(&self) -> GroupId {
        self.played_group
    }

    pub fn acknowledged_turns(&self) -> u64 {
        self.acknowledged_turns
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown
    }

    /// Pure Step: folds events into state. Returns SideEffects to be executed by the driver.
    /// MUST NOT await I/O or timers; `now` is the only clock it sees.
    pub fn step(&mut self, now: Instant, events: Vec<Event>) -> Vec<SideEffect> {
        let mut effects = Vec::new();

        for event in events {
            match event {
                Event::Frame(frame) => self.on_frame(now, &frame.samples, &mut effects),
                Event::Remote(remote) => self.on_remote(now, remote, &mut effects),
                Event::PlaybackFinished { group_id } => {
                    if self.playback.is_playing() && group_id == self.played_group {
                        debug!("Fragment {} finished", group_id);
                        self.playback.finish();
                        self.try_play(now, &mut effects);
                    } else {
                        debug!("Ignoring stale completion for group {}", group_id);
                    }
                }
                Event::Control(cmd) => self.on_control(cmd, &mut effects),
                Event::Fault(err) => {
                    if err.is_fatal() {
                        error!("Session fault: {}", err);
                        self.teardown(true, Some(err.to_string()), &mut effects);
                    } else {
                        warn!("Recoverable fault: {}", err);
                    }
                }
            }
        }

        // Throttled drain of the input queue
        if self.dispatcher.is_ready(now) {
            self.dispatch_cycle(now, &mut effects);
        }

        effects
    }

    /// Commit whatever the segmenter is holding (end of input).
    pub fn flush_phrase(&mut self, now: Instant) -> Vec<SideEffect> {
        let mut effects = Vec::new();
        if let Some(phrase) = self.segmenter.flush() {
            self.commit_phrase(phrase);
        }
        if self.dispatcher.is_ready(now) {
            self.dispatch_cycle(now, &mut effects);
        }
        effects
    }

    /// Periodic check: once everything has drained and every committed phrase
    /// has been heard, the conversation has caught up and latency is zero.
    pub fn idle_check(&mut self) {
        let idle = self.input_queue.is_empty()
            && self.output_queue.is_empty()
            && !self.playback.is_playing()
            && !self.segmenter.is_recording()
            && self.state.latency_seconds > 0.0;

        if !idle {
            return;
        }

        let pending = self.ledger.current().0 as i64 - self.played_group.0 as i64;
        if pending <= 0 {
            debug!("Idle with nothing pending, latency reset");
            self.state.reduce(StateDelta::Latency(0.0));
            self.telemetry.record(TelemetryEvent::LatencyReset);
        }
    }

    pub fn queue_stats(&self) -> QueueStats {
        QueueStats::compute(
            self.ledger.current().0,
            self.input_queue.len(),
            self.acknowledged_turns,
            self.output_queue.len(),
        )
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            status: self.state.status,
            mode: self.state.mode,
            queue: self.queue_stats(),
            playback_rate: self.state.playback_rate,
            pace: self.state.pace,
            latency_seconds: self.state.latency_seconds,
            level: (self.segmenter.level() * 5.0).min(1.0),
            recording: self.segmenter.is_recording(),
            playing: self.playback.is_playing(),
            sending: self.state.sending,
            receiving: self.state.receiving,
            last_error: self.state.last_error.clone(),
        }
    }

    fn initial_snapshot(state: &SessionState) -> SessionSnapshot {
        SessionSnapshot {
            status: state.status,
            mode: state.mode,
            queue: QueueStats::default(),
            playback_rate: state.playback_rate,
            pace: state.pace,
            latency_seconds: state.latency_seconds,
            level: 0.0,
            recording: false,
            playing: false,
            sending: false,
            receiving: false,
            last_error: None,
        }
    }

    // === Input side ===

    fn on_frame(&mut self, now: Instant, samples: &[f32], effects: &mut Vec<SideEffect>) {
        if self.state.mode == Mode::Off || !self.resources.capture_active() {
            return;
        }

        let report = self.segmenter.process(samples);
        for event in report.events {
            match event {
                SegmentEvent::Started => {
                    let id = self.ledger.mark_started(now);
                    debug!("Phrase recording started (anticipating group {})", id);
                }
                SegmentEvent::Committed(phrase) => self.commit_phrase(phrase),
            }
        }

        let ctx = PolicyContext {
            mode: self.state.mode,
            room: &self.state.room,
        };
        if let Some(mode) = self.policy.on_frame(&ctx, report.voiced, report.frame_ms) {
            info!("Mic quiet in local room, switching to {:?}", mode);
            self.switch_mode(mode, true, effects);
        }
    }

    fn commit_phrase(&mut self, phrase: Phrase) {
        if phrase.is_empty() {
            return;
        }

        let group_id = self.ledger.commit();
        let sample_rate = self.segmenter.sample_rate();
        let duration_ms = ms_for_samples(phrase.samples.len() as u64, sample_rate);

        self.input_queue.push(QueueEntry {
            group_id,
            audio: EncodedChunk {
                data: codec::encode_pcm16(&phrase.samples),
                sample_rate,
            },
            target_languages: self.state.target_languages.clone(),
        });

        // A forced split keeps the transcript unit open for the next chunk
        if !phrase.continuous {
            self.transcript.close_unit();
        }

        debug!(
            "Committed group {} ({} ms, continuous: {})",
            group_id, duration_ms, phrase.continuous
        );
        self.telemetry.record(TelemetryEvent::PhraseCommitted {
            group_id,
            duration_ms,
            continuous: phrase.continuous,
        });
    }

    fn dispatch_cycle(&mut self, now: Instant, effects: &mut Vec<SideEffect>) {
        if self.input_queue.is_empty() || !self.state.is_connected() {
            return;
        }

        let decision = self
            .pacing
            .evaluate(self.state.latency_seconds, self.state.playback_rate);
        self.apply_pacing(decision, effects);

        let Some(entry) = self.input_queue.pop() else {
            return;
        };

        self.state.reduce(StateDelta::PacketSent);
        self.dispatcher.on_sent(now, self.input_queue.len());
        self.telemetry.record(TelemetryEvent::ChunkTransmitted {
            group_id: entry.group_id,
            queued_after: self.input_queue.len() as u64,
        });
        debug!("Transmitting group {}", entry.group_id);
        effects.push(SideEffect::Transmit(entry));
    }

    fn apply_pacing(&mut self, decision: PacingDecision, effects: &mut Vec<SideEffect>) {
        if decision.pace != self.state.pace {
            info!(
                "Pace {:?} -> {:?} (latency {:.1}s)",
                self.state.pace, decision.pace, self.state.latency_seconds
            );
            self.telemetry.record(TelemetryEvent::PaceTransition {
                from: self.state.pace,
                to: decision.pace,
            });
        }
        if decision.rate != self.state.playback_rate {
            debug!("Playback rate {:.2} -> {:.2}", self.state.playback_rate, decision.rate);
            self.telemetry.record(TelemetryEvent::RateAdjusted {
                from: self.state.playback_rate,
                to: decision.rate,
            });
        }

        self.state.reduce(StateDelta::Pacing {
            pace: decision.pace,
            rate: decision.rate,
        });

        if decision.send_hint {
            debug!("Asking remote to summarize and speed up");
            self.telemetry.record(TelemetryEvent::HintSent);
            effects.push(SideEffect::SendHint(self.pacing.hint_text().to_string()));
        }
    }

    // === Output side ===

    fn on_remote(&mut self, now: Instant, event: RemoteEvent, effects: &mut Vec<SideEffect>) {
        // Late callbacks from a channel we already tore down
        if self.state.status == ConnectionStatus::Disconnected {
            debug!("Ignoring remote event while disconnected");
            return;
        }

        match event {
            RemoteEvent::Opened => {
                if self.state.status == ConnectionStatus::Connecting {
                    info!("Remote channel open");
                    self.state.reduce(StateDelta::Status(ConnectionStatus::Connected));
                }
            }
            RemoteEvent::Audio { payload, group_id } => {
                let samples = match codec::decode_payload(&payload) {
                    Ok(samples) => samples,
                    Err(e) => {
                        warn!("Dropping fragment: {}", e);
                        self.telemetry.record(TelemetryEvent::FragmentDropped);
                        return;
                    }
                };

                // Without an echoed id, attribute to the newest committed group
                let group_id = group_id.unwrap_or_else(|| self.ledger.current());
                let fragment =
                    OutputFragment::new(group_id, samples, self.config.playback.output_sample_rate);

                self.telemetry.record(TelemetryEvent::FragmentQueued {
                    group_id,
                    duration_ms: fragment.duration.as_millis() as u64,
                });
                self.output_queue.push(fragment);

                let ctx = PolicyContext {
                    mode: self.state.mode,
                    room: &self.state.room,
                };
                if let Some(mode) = self.policy.on_audio_arrival(&ctx) {
                    info!("Translation audio arrived, switching to {:?}", mode);
                    self.switch_mode(mode, true, effects);
                }

                self.try_play(now, effects);
            }
            RemoteEvent::PartialText { text, is_final } => {
                self.transcript.append(self.ledger.current(), &text);
                if is_final {
                    self.transcript.close_unit();
                }
            }
            RemoteEvent::TurnComplete => {
                self.acknowledged_turns += 1;
            }
            RemoteEvent::Closed => {
                info!("Remote closed the session");
                self.teardown(true, None, effects);
            }
            RemoteEvent::Error(msg) => {
                error!("Remote error: {}", msg);
                self.teardown(true, Some(msg), effects);
            }
        }
    }

    fn try_play(&mut self, now: Instant, effects: &mut Vec<SideEffect>) {
        if self.playback.is_playing() || !self.resources.output_active() {
            return;
        }
        let Some(fragment) = self.output_queue.pop() else {
            return;
        };

        self.state.reduce(StateDelta::PacketReceived);

        let latency_ms = self.ledger.started_at(fragment.group_id).map(|start| {
            let latency = now.saturating_duration_since(start);
            self.state.reduce(StateDelta::Latency(latency.as_secs_f64()));
            latency.as_millis() as u64
        });

        self.played_group = fragment.group_id;
        if self.config.session.evict_played_groups {
            self.ledger.evict_before(fragment.group_id);
        }

        let rate = self.state.playback_rate;
        let slot = self.playback.schedule(now, fragment.duration, rate);

        self.telemetry.record(TelemetryEvent::FragmentStarted {
            group_id: fragment.group_id,
            latency_ms,
            rate,
        });
        debug!(
            "Playing group {} at x{:.2} for {:?}",
            fragment.group_id, rate, slot.effective
        );

        effects.push(SideEffect::StartPlayback {
            fragment,
            start_at: slot.start_at,
            rate,
        });
    }

    // === Session control ===

    fn on_control(&mut self, cmd: ControlCommand, effects: &mut Vec<SideEffect>) {
        match cmd {
            ControlCommand::SetMode(mode) => self.set_mode(mode, effects),
            ControlCommand::SetTargetLanguages(langs) => {
                let langs: Vec<String> = langs
                    .into_iter()
                    .map(|l| l.trim().to_string())
                    .filter(|l| !l.is_empty())
                    .collect();
                if langs.is_empty() {
                    warn!("Ignoring empty target language selection");
                    self.state
                        .reduce(StateDelta::Error("select at least one target language".into()));
                } else {
                    info!("Target languages: {}", langs.join(", "));
                    self.state.reduce(StateDelta::TargetLanguages(langs));
                }
            }
            ControlCommand::SetRoom(room) => {
                info!("Room: {}", room);
                self.state.reduce(StateDelta::Room(room));
            }
            ControlCommand::Disconnect => self.teardown(false, None, effects),
            ControlCommand::Shutdown => {
                self.teardown(false, None, effects);
                self.shutdown = true;
            }
        }
    }

    fn set_mode(&mut self, mode: Mode, effects: &mut Vec<SideEffect>) {
        if mode == Mode::Off {
            self.teardown(false, None, effects);
            return;
        }

        if self.state.status == ConnectionStatus::Disconnected {
            if let Err(e) = self.connect(mode, effects) {
                error!("Cannot start session: {}", e);
                self.state.reduce(StateDelta::Error(e.to_string()));
                self.state.reduce(StateDelta::Mode(Mode::Off));
            }
            return;
        }

        self.switch_mode(mode, false, effects);
    }

    fn connect(&mut self, mode: Mode, effects: &mut Vec<SideEffect>) -> Result<(), SessionError> {
        // Nothing is acquired until configuration checks out
        self.config.validate_for_connect(&self.state.target_languages)?;

        info!(
            "Connecting in {:?} mode ({})",
            mode,
            self.state.target_languages.join(", ")
        );

        self.transcript.clear();
        self.state.reduce(StateDelta::ClearError);
        self.state.reduce(StateDelta::Status(ConnectionStatus::Connecting));
        self.state.reduce(StateDelta::Mode(mode));

        effects.extend(self.resources.acquire_all(mode, &self.state.target_languages));
        effects.push(SideEffect::SetOutputMuted(mode == Mode::Transcribe));

        self.telemetry.record(TelemetryEvent::ModeSwitched {
            from: Mode::Off,
            to: mode,
            automatic: false,
        });
        Ok(())
    }

    fn switch_mode(&mut self, mode: Mode, automatic: bool, effects: &mut Vec<SideEffect>) {
        let previous = self.state.mode;
        if previous == mode || mode == Mode::Off {
            return;
        }

        self.state.reduce(StateDelta::Mode(mode));
        if previous == Mode::Transcribe && mode == Mode::Translate {
            effects.push(SideEffect::Beep);
        }
        effects.push(SideEffect::SetOutputMuted(mode == Mode::Transcribe));

        self.telemetry.record(TelemetryEvent::ModeSwitched {
            from: previous,
            to: mode,
            automatic,
        });
    }

    /// The one teardown path for user stops and fatal errors. Idempotent:
    /// a second call finds nothing to release and lands in the same state.
    fn teardown(&mut self, fatal: bool, message: Option<String>, effects: &mut Vec<SideEffect>) {
        let was_active =
            !self.resources.is_idle() || self.state.status != ConnectionStatus::Disconnected;

        effects.extend(self.resources.release_all());

        // In-flight data is discarded, not drained
        self.input_queue.clear();
        self.output_queue.clear();
        self.segmenter.reset();
        self.ledger.reset();
        self.dispatcher.cancel();
        self.playback.reset();
        self.policy.reset();
        self.transcript.close_unit();
        self.acknowledged_turns = 0;
        self.played_group = GroupId::default();

        self.state.reduce(StateDelta::Reset);
        self.state.reduce(StateDelta::Mode(Mode::Off));
        if let Some(msg) = message {
            self.state.reduce(StateDelta::Error(msg));
        }

        if was_active {
            info!("Session torn down (fatal: {})", fatal);
            self.telemetry.record(TelemetryEvent::Teardown { fatal });
        }
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.snapshot());
    }

    /// Execute effects against the bindings, then publish a snapshot.
    /// Failures loop back in as faults until nothing is left to do.
    pub fn execute_all(&mut self, bindings: &mut Bindings, mut effects: Vec<SideEffect>) {
        while !effects.is_empty() {
            let mut faults = Vec::new();
            for effect in effects {
                if let Err(e) = bindings.execute(effect, &self.tx_clone) {
                    faults.push(Event::Fault(e));
                }
            }
            effects = if faults.is_empty() {
                Vec::new()
            } else {
                self.step(Instant::now(), faults)
            };
        }

        self.publish();
    }

    /// Async Driver Loop
    pub async fn run(&mut self, bindings: &mut Bindings) {
        info!(
            "Reactor started. Throttle: {}ms, idle check: {}ms",
            self.config.dispatch.throttle_ms, self.config.playback.idle_check_ms
        );

        let mut idle = interval(Duration::from_millis(self.config.playback.idle_check_ms.max(1)));
        idle.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let deadline = self.dispatcher.deadline();
            let mut events: Vec<Event> = Vec::new();
            let mut idle_due = false;

            tokio::select! {
                maybe = self.receiver.recv() => match maybe {
                    Some(event) => events.push(event),
                    None => {
                        info!("Event channel closed, stopping reactor");
                        break;
                    }
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {}
                _ = idle.tick() => idle_due = true,
            }

            // Drain whatever else is already waiting
            while let Ok(event) = self.receiver.try_recv() {
                events.push(event);
            }

            if idle_due {
                self.idle_check();
            }

            let effects = self.step(Instant::now(), events);
            self.execute_all(bindings, effects);

            if self.shutdown {
                info!("Reactor shut down");
                break;
            }
        }
    }
}

/// The outside world as seen by the driver loop.
pub struct Bindings {
    pub connector: Box<dyn RemoteConnector>,
    pub capture: Box<dyn CaptureControl>,
    pub sink: Box<dyn AudioSink>,
    channel: Option<Box<dyn RemoteChannel>>,
}

impl Bindings {
    pub fn new(
        connector: Box<dyn RemoteConnector>,
        capture: Box<dyn CaptureControl>,
        sink: Box<dyn AudioSink>,
    ) -> Self {
        Self {
            connector,
            capture,
            sink,
            channel: None,
        }
    }

    pub fn execute(&mut self, effect: SideEffect, events: &mpsc::Sender<Event>) -> Result<(), SessionError> {
        match effect {
            SideEffect::OpenChannel { mode, target_languages } => {
                let channel = self.connector.open(
                    OpenRequest {
                        mode,
                        target_languages,
                    },
                    events.clone(),
                )?;
                self.channel = Some(channel);
            }
            SideEffect::Transmit(entry) => match self.channel.as_mut() {
                Some(channel) => channel.send_audio(&entry)?,
                None => return Err(SessionError::Channel("no open channel".into())),
            },
            SideEffect::SendHint(text) => {
                if let Some(channel) = self.channel.as_mut() {
                    if let Err(e) = channel.send_hint(&text) {
                        debug!("Hint dropped: {}", e);
                    }
                }
            }
            SideEffect::CloseChannel => {
                if let Some(mut channel) = self.channel.take() {
                    channel.close();
                }
            }
            SideEffect::StartCapture => self.capture.start(events.clone())?,
            SideEffect::StopCapture => self.capture.stop(),
            SideEffect::StartOutput => self.sink.start()?,
            SideEffect::StopOutput => self.sink.stop(),
            SideEffect::SetOutputMuted(muted) => self.sink.set_muted(muted),
            SideEffect::StartPlayback {
                fragment,
                start_at,
                rate,
            } => self.sink.play(fragment, start_at, rate, events.clone())?,
            SideEffect::Beep => self.sink.beep(),
        }
        Ok(())
    }
}

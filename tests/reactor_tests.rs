use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use pacer::audio::codec::encode_pcm16;
use pacer::kernel::config::{PacerConfig, RemoteBackend};
use pacer::kernel::effect::SideEffect;
use pacer::kernel::error::SessionError;
use pacer::kernel::event::{
    AudioFrame, AudioPayload, ConnectionStatus, ControlCommand, Event, GroupId, Mode, RemoteEvent,
};
use pacer::kernel::pacing::{PaceState, PacingController};
use pacer::kernel::policy::NoopPolicy;
use pacer::kernel::state::StateDelta;
use pacer::Reactor;

const FRAME: usize = 4096;

fn setup(config: PacerConfig) -> Reactor {
    let (tx, rx) = mpsc::channel(100);
    Reactor::new(rx, tx, config).with_policy(Box::new(NoopPolicy))
}

fn control(cmd: ControlCommand) -> Event {
    Event::Control(cmd)
}

fn connect(reactor: &mut Reactor, now: Instant) {
    reactor.step(now, vec![control(ControlCommand::SetMode(Mode::Translate))]);
    reactor.step(now, vec![Event::Remote(RemoteEvent::Opened)]);
    assert_eq!(reactor.state.status, ConnectionStatus::Connected);
}

fn voiced(n: usize) -> Vec<Event> {
    (0..n)
        .map(|_| Event::Frame(AudioFrame::new(vec![0.1; FRAME])))
        .collect()
}

fn audio(group: Option<u64>, samples: usize) -> Event {
    Event::Remote(RemoteEvent::Audio {
        payload: AudioPayload::Pcm16(encode_pcm16(&vec![0.2; samples])),
        group_id: group.map(GroupId),
    })
}

fn transmitted(effects: &[SideEffect]) -> Vec<GroupId> {
    effects
        .iter()
        .filter_map(|e| match e {
            SideEffect::Transmit(entry) => Some(entry.group_id),
            _ => None,
        })
        .collect()
}

fn started(effects: &[SideEffect]) -> Vec<(GroupId, usize)> {
    effects
        .iter()
        .filter_map(|e| match e {
            SideEffect::StartPlayback { fragment, .. } => Some((fragment.group_id, fragment.samples.len())),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_connect_acquires_resources() {
    let mut reactor = setup(PacerConfig::default());
    let now = Instant::now();

    let effects = reactor.step(now, vec![control(ControlCommand::SetMode(Mode::Translate))]);

    assert_eq!(
        effects,
        vec![
            SideEffect::OpenChannel {
                mode: Mode::Translate,
                target_languages: vec!["Svenska".to_string()],
            },
            SideEffect::StartCapture,
            SideEffect::StartOutput,
            SideEffect::SetOutputMuted(false),
        ]
    );
    assert_eq!(reactor.state.status, ConnectionStatus::Connecting);
    assert_eq!(reactor.state.mode, Mode::Translate);

    reactor.step(now, vec![Event::Remote(RemoteEvent::Opened)]);
    assert!(reactor.state.is_connected());
}

#[tokio::test]
async fn test_frames_ignored_when_off() {
    let mut reactor = setup(PacerConfig::default());
    let effects = reactor.step(Instant::now(), voiced(20));

    assert!(effects.is_empty());
    assert_eq!(reactor.ledger.current(), GroupId(0));
    assert!(!reactor.segmenter.is_recording());
}

#[tokio::test]
async fn test_phrases_wait_for_open_channel() {
    let mut reactor = setup(PacerConfig::default());
    let t0 = Instant::now();

    reactor.step(t0, vec![control(ControlCommand::SetMode(Mode::Translate))]);
    let effects = reactor.step(t0, voiced(10));
    assert!(transmitted(&effects).is_empty(), "Nothing leaves while connecting");
    assert_eq!(reactor.input_queue.len(), 2);

    let effects = reactor.step(t0, vec![Event::Remote(RemoteEvent::Opened)]);
    assert_eq!(transmitted(&effects), vec![GroupId(1)]);
}

#[tokio::test]
async fn test_dispatch_is_throttled() {
    let mut reactor = setup(PacerConfig::default());
    let t0 = Instant::now();
    connect(&mut reactor, t0);

    // Two forced splits in one burst
    let effects = reactor.step(t0, voiced(10));
    assert_eq!(transmitted(&effects), vec![GroupId(1)]);
    assert_eq!(reactor.dispatcher.deadline(), Some(t0 + Duration::from_millis(50)));

    let effects = reactor.step(t0 + Duration::from_millis(20), vec![]);
    assert!(transmitted(&effects).is_empty());

    let effects = reactor.step(t0 + Duration::from_millis(50), vec![]);
    assert_eq!(transmitted(&effects), vec![GroupId(2)]);
    assert!(reactor.input_queue.is_empty());
    assert_eq!(reactor.dispatcher.deadline(), None);
}

#[tokio::test]
async fn test_language_change_applies_to_later_phrases() {
    let mut reactor = setup(PacerConfig::default());
    let t0 = Instant::now();
    connect(&mut reactor, t0);

    reactor.step(t0, vec![control(ControlCommand::SetTargetLanguages(vec![
        "English".into(),
        "Deutsch".into(),
    ]))]);
    reactor.step(t0, voiced(2));
    let effects = reactor.flush_phrase(t0);

    match &effects[..] {
        [SideEffect::Transmit(entry)] => {
            assert_eq!(entry.target_languages, vec!["English".to_string(), "Deutsch".to_string()]);
            assert_eq!(entry.audio.sample_rate, 16_000);
            assert_eq!(entry.audio.data.len(), FRAME * 2 * 2);
        }
        other => panic!("unexpected effects {:?}", other),
    }
}

#[tokio::test]
async fn test_latency_measured_from_recording_start() {
    let mut reactor = setup(PacerConfig::default());
    let t0 = Instant::now();
    connect(&mut reactor, t0);

    reactor.step(t0, voiced(2));
    reactor.flush_phrase(t0);

    // No echoed id: attributed to the newest committed group
    let effects = reactor.step(t0 + Duration::from_secs(3), vec![audio(None, 2400)]);

    assert_eq!(started(&effects), vec![(GroupId(1), 2400)]);
    assert_eq!(reactor.state.latency_seconds, 3.0);
    assert_eq!(reactor.played_group(), GroupId(1));

    let stats = reactor.telemetry.snapshot();
    assert_eq!(stats.playback_stats.measured, 1);
    assert_eq!(stats.playback_stats.max_latency_ms, 3000);
}

#[tokio::test]
async fn test_explicit_group_id_wins_over_counter() {
    let mut reactor = setup(PacerConfig::default());
    let t0 = Instant::now();
    connect(&mut reactor, t0);

    reactor.step(t0, voiced(2));
    reactor.flush_phrase(t0);
    let t1 = t0 + Duration::from_secs(1);
    reactor.step(t1, voiced(2));
    reactor.flush_phrase(t1);
    assert_eq!(reactor.ledger.current(), GroupId(2));

    let effects = reactor.step(t0 + Duration::from_secs(5), vec![audio(Some(1), 2400)]);
    assert_eq!(started(&effects), vec![(GroupId(1), 2400)]);
    assert_eq!(reactor.state.latency_seconds, 5.0);

    reactor.step(
        t0 + Duration::from_secs(5),
        vec![Event::PlaybackFinished { group_id: GroupId(1) }],
    );
    let effects = reactor.step(t0 + Duration::from_secs(6), vec![audio(None, 2400)]);
    assert_eq!(started(&effects), vec![(GroupId(2), 2400)]);
    assert_eq!(reactor.state.latency_seconds, 5.0);

    // Older groups are no longer needed once a newer one plays
    assert!(reactor.ledger.started_at(GroupId(1)).is_none());
    assert!(reactor.ledger.started_at(GroupId(2)).is_some());
}

#[tokio::test]
async fn test_playback_follows_enqueue_order() {
    let mut reactor = setup(PacerConfig::default());
    let t0 = Instant::now();
    connect(&mut reactor, t0);

    let effects = reactor.step(
        t0,
        vec![audio(Some(5), 2400), audio(Some(5), 1200), audio(Some(6), 4800)],
    );
    assert_eq!(started(&effects), vec![(GroupId(5), 2400)]);
    assert_eq!(reactor.output_queue.len(), 2);

    // Nothing else starts while a fragment is playing
    let effects = reactor.step(t0, vec![audio(Some(7), 100)]);
    assert!(started(&effects).is_empty());

    let mut order = vec![(GroupId(5), 2400)];
    let mut now = t0;
    for _ in 0..3 {
        now += Duration::from_millis(100);
        let effects = reactor.step(now, vec![Event::PlaybackFinished { group_id: order[order.len() - 1].0 }]);
        order.extend(started(&effects));
    }

    assert_eq!(
        order,
        vec![
            (GroupId(5), 2400),
            (GroupId(5), 1200),
            (GroupId(6), 4800),
            (GroupId(7), 100),
        ]
    );
}

#[tokio::test]
async fn test_playback_uses_current_rate() {
    let mut reactor = setup(PacerConfig::default());
    let t0 = Instant::now();
    connect(&mut reactor, t0);

    reactor.state.reduce(StateDelta::Pacing {
        pace: PaceState::Accelerating,
        rate: 1.2,
    });
    let effects = reactor.step(t0, vec![audio(Some(1), 24_000)]);

    match &effects[..] {
        [SideEffect::StartPlayback { start_at, rate, fragment }] => {
            assert_eq!(*rate, 1.2);
            assert_eq!(*start_at, t0);
            assert_eq!(fragment.duration, Duration::from_secs(1));
        }
        other => panic!("unexpected effects {:?}", other),
    }
}

#[tokio::test]
async fn test_malformed_fragment_is_dropped() {
    let mut reactor = setup(PacerConfig::default());
    let t0 = Instant::now();
    connect(&mut reactor, t0);

    let effects = reactor.step(
        t0,
        vec![
            Event::Remote(RemoteEvent::Audio {
                payload: AudioPayload::Pcm16(vec![1, 2, 3]),
                group_id: None,
            }),
            Event::Remote(RemoteEvent::Audio {
                payload: AudioPayload::Base64("not base64!".into()),
                group_id: None,
            }),
        ],
    );

    assert!(started(&effects).is_empty());
    assert!(reactor.output_queue.is_empty());
    assert!(reactor.state.is_connected(), "A bad fragment does not end the session");
    assert_eq!(reactor.telemetry.snapshot().playback_stats.dropped, 2);
}

#[tokio::test]
async fn test_latency_spike_accelerates_one_step() {
    let config = PacerConfig::default();
    let pacing = PacingController::with_seed(config.pacing.clone(), 1);
    let mut reactor = setup(config).with_pacing(pacing);
    let t0 = Instant::now();
    connect(&mut reactor, t0);

    reactor.state.reduce(StateDelta::Latency(25.0));
    reactor.step(t0, voiced(2));
    let effects = reactor.flush_phrase(t0);

    assert_eq!(transmitted(&effects), vec![GroupId(1)]);
    assert_eq!(reactor.state.pace, PaceState::Accelerating);
    assert_eq!(reactor.state.playback_rate, 1.05);
}

#[tokio::test]
async fn test_hint_goes_out_before_chunk() {
    let mut config = PacerConfig::default();
    config.pacing.hint_probability = 1.0;
    let pacing = PacingController::with_seed(config.pacing.clone(), 1);
    let mut reactor = setup(config).with_pacing(pacing);
    let t0 = Instant::now();
    connect(&mut reactor, t0);

    reactor.state.reduce(StateDelta::Latency(12.0));
    reactor.step(t0, voiced(2));
    let effects = reactor.flush_phrase(t0);

    assert_eq!(effects.len(), 2);
    assert_eq!(
        effects[0],
        SideEffect::SendHint("[SYSTEM: SUMMARIZE_AND_SPEED_UP]".to_string())
    );
    assert!(matches!(effects[1], SideEffect::Transmit(_)));
    assert_eq!(reactor.state.playback_rate, 1.0, "12 s is below the pitch threshold");
}

#[tokio::test]
async fn test_idle_resets_latency() {
    let mut reactor = setup(PacerConfig::default());
    let t0 = Instant::now();
    connect(&mut reactor, t0);

    reactor.state.reduce(StateDelta::Latency(4.2));

    // Two idle checks, 1000 ms apart
    reactor.idle_check();
    reactor.idle_check();

    assert_eq!(reactor.state.latency_seconds, 0.0);
    assert_eq!(reactor.telemetry.snapshot().pacing_stats.latency_resets, 1);
}

#[tokio::test]
async fn test_idle_keeps_latency_while_phrases_pending() {
    let mut reactor = setup(PacerConfig::default());
    let t0 = Instant::now();
    connect(&mut reactor, t0);

    reactor.step(t0, voiced(2));
    reactor.flush_phrase(t0);
    reactor.state.reduce(StateDelta::Latency(4.2));

    // Group 1 went out but nothing came back yet
    reactor.idle_check();
    assert_eq!(reactor.state.latency_seconds, 4.2);

    let t1 = t0 + Duration::from_secs(2);
    reactor.step(t1, vec![audio(None, 2400)]);
    reactor.idle_check();
    assert_eq!(reactor.state.latency_seconds, 2.0, "Still playing");

    reactor.step(t1, vec![Event::PlaybackFinished { group_id: GroupId(1) }]);
    reactor.idle_check();
    assert_eq!(reactor.state.latency_seconds, 0.0);
}

#[tokio::test]
async fn test_queue_stats_track_acknowledged_turns() {
    let mut reactor = setup(PacerConfig::default());
    let t0 = Instant::now();
    connect(&mut reactor, t0);

    reactor.step(t0, voiced(10));
    let stats = reactor.queue_stats();
    assert_eq!(stats.in_queue, 1);
    assert_eq!(stats.processing, 1);
    assert_eq!(stats.out_queue, 0);
    assert_eq!(stats.total, 2);

    reactor.step(t0, vec![Event::Remote(RemoteEvent::TurnComplete)]);
    let stats = reactor.queue_stats();
    assert_eq!(stats.processing, 0);
    assert_eq!(stats.total, 1);
    assert_eq!(reactor.snapshot().queue, stats);
}

#[tokio::test]
async fn test_remote_error_tears_down() {
    let mut reactor = setup(PacerConfig::default());
    let t0 = Instant::now();
    connect(&mut reactor, t0);
    reactor.step(t0, voiced(10));

    let effects = reactor.step(t0, vec![Event::Remote(RemoteEvent::Error("socket reset".into()))]);

    assert_eq!(
        effects,
        vec![SideEffect::StopCapture, SideEffect::StopOutput, SideEffect::CloseChannel]
    );
    assert_eq!(reactor.state.mode, Mode::Off);
    assert_eq!(reactor.state.status, ConnectionStatus::Disconnected);
    assert_eq!(reactor.state.last_error.as_deref(), Some("socket reset"));
    assert!(reactor.input_queue.is_empty());
    assert_eq!(reactor.ledger.current(), GroupId(0));
    assert_eq!(reactor.telemetry.snapshot().session_stats.fatal_teardowns, 1);

    // Late callbacks from the dead channel change nothing
    let effects = reactor.step(t0, vec![audio(Some(1), 2400), Event::Remote(RemoteEvent::Opened)]);
    assert!(effects.is_empty());
    assert!(reactor.output_queue.is_empty());
    assert_eq!(reactor.state.status, ConnectionStatus::Disconnected);
}

#[tokio::test]
async fn test_remote_close_tears_down_without_message() {
    let mut reactor = setup(PacerConfig::default());
    let t0 = Instant::now();
    connect(&mut reactor, t0);

    reactor.step(t0, vec![Event::Remote(RemoteEvent::Closed)]);

    assert_eq!(reactor.state.mode, Mode::Off);
    assert_eq!(reactor.state.last_error, None);
}

#[tokio::test]
async fn test_driver_faults() {
    let mut reactor = setup(PacerConfig::default());
    let t0 = Instant::now();
    connect(&mut reactor, t0);

    reactor.step(t0, vec![Event::Fault(SessionError::Decode("truncated".into()))]);
    assert!(reactor.state.is_connected(), "Decode faults are not fatal");

    let effects = reactor.step(t0, vec![Event::Fault(SessionError::Device("mic unplugged".into()))]);
    assert!(effects.contains(&SideEffect::StopCapture));
    assert_eq!(reactor.state.mode, Mode::Off);
    assert_eq!(
        reactor.state.last_error.as_deref(),
        Some("audio device unavailable: mic unplugged")
    );
}

#[tokio::test]
async fn test_missing_api_key_blocks_connect() {
    let mut config = PacerConfig::default();
    config.remote.backend = RemoteBackend::Http;
    config.remote.api_key = None;
    let mut reactor = setup(config);
    let t0 = Instant::now();

    let effects = reactor.step(t0, vec![control(ControlCommand::SetMode(Mode::Translate))]);

    assert!(effects.is_empty(), "No resource is acquired");
    assert_eq!(reactor.state.mode, Mode::Off);
    assert_eq!(reactor.state.status, ConnectionStatus::Disconnected);
    assert!(reactor
        .state
        .last_error
        .as_deref()
        .is_some_and(|e| e.contains("PACER_API_KEY")));

    reactor.config.remote.api_key = Some("secret".into());
    let effects = reactor.step(t0, vec![control(ControlCommand::SetMode(Mode::Translate))]);
    assert!(!effects.is_empty());
    assert_eq!(reactor.state.last_error, None);
}

#[tokio::test]
async fn test_empty_language_selection_rejected() {
    let mut reactor = setup(PacerConfig::default());

    reactor.step(
        Instant::now(),
        vec![control(ControlCommand::SetTargetLanguages(vec![" ".into()]))],
    );

    assert_eq!(reactor.state.target_languages, vec!["Svenska".to_string()]);
    assert!(reactor.state.last_error.is_some());
}

#[tokio::test]
async fn test_mode_switch_while_connected() {
    let mut reactor = setup(PacerConfig::default());
    let t0 = Instant::now();
    connect(&mut reactor, t0);

    let effects = reactor.step(t0, vec![control(ControlCommand::SetMode(Mode::Transcribe))]);
    assert_eq!(effects, vec![SideEffect::SetOutputMuted(true)]);

    let effects = reactor.step(t0, vec![control(ControlCommand::SetMode(Mode::Translate))]);
    assert_eq!(effects, vec![SideEffect::Beep, SideEffect::SetOutputMuted(false)]);

    let effects = reactor.step(t0, vec![control(ControlCommand::SetMode(Mode::Translate))]);
    assert!(effects.is_empty());
    assert!(reactor.state.is_connected());
}

#[tokio::test]
async fn test_shutdown_stops_driver() {
    let mut reactor = setup(PacerConfig::default());
    let t0 = Instant::now();
    connect(&mut reactor, t0);

    let effects = reactor.step(t0, vec![control(ControlCommand::Shutdown)]);

    assert_eq!(effects.len(), 3);
    assert!(reactor.is_shutdown());
    assert_eq!(reactor.state.mode, Mode::Off);
}

#[tokio::test]
async fn test_transcript_spans_forced_splits() {
    let mut reactor = setup(PacerConfig::default());
    let t0 = Instant::now();
    connect(&mut reactor, t0);

    let text = |s: &str, is_final: bool| {
        Event::Remote(RemoteEvent::PartialText {
            text: s.to_string(),
            is_final,
        })
    };

    reactor.step(t0, vec![text("Hello ", false)]);
    // Forced split at the 5th frame keeps the unit open
    reactor.step(t0, voiced(6));
    reactor.step(t0, vec![text("world", false)]);

    let items = reactor.transcript.items();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].text, "Hello world");
    assert!(items[0].open);

    // Natural end closes it
    reactor.flush_phrase(t0);
    assert!(!reactor.transcript.items()[0].open);

    reactor.step(t0, vec![text("Again", true)]);
    let items = reactor.transcript.items();
    assert_eq!(items.len(), 2);
    assert_eq!(items[1].group_id, GroupId(2));
    assert!(!items[1].open, "Final text closes the unit");

    // Reconnecting starts a fresh log
    reactor.step(t0, vec![control(ControlCommand::Disconnect)]);
    assert_eq!(reactor.transcript.items().len(), 2);
    connect(&mut reactor, t0);
    assert!(reactor.transcript.items().is_empty());
}

#[tokio::test]
async fn test_completion_for_other_group_is_ignored() {
    let mut reactor = setup(PacerConfig::default());
    let t0 = Instant::now();
    connect(&mut reactor, t0);

    let effects = reactor.step(t0, vec![audio(Some(4), 2400), audio(Some(5), 2400)]);
    assert_eq!(started(&effects), vec![(GroupId(4), 2400)]);

    // Left over from a fragment that is no longer in flight
    let effects = reactor.step(t0, vec![Event::PlaybackFinished { group_id: GroupId(1) }]);
    assert!(started(&effects).is_empty());
    assert_eq!(reactor.output_queue.len(), 1);
    assert!(reactor.snapshot().playing);

    let effects = reactor.step(
        t0 + Duration::from_millis(100),
        vec![Event::PlaybackFinished { group_id: GroupId(4) }],
    );
    assert_eq!(started(&effects), vec![(GroupId(5), 2400)]);
}

use tokio::sync::mpsc;
use tokio::time::Instant;

use pacer::audio::codec::encode_pcm16;
use pacer::kernel::config::PacerConfig;
use pacer::kernel::error::SessionError;
use pacer::kernel::event::{
    AudioFrame, AudioPayload, ConnectionStatus, ControlCommand, Event, GroupId, Mode, RemoteEvent,
};
use pacer::kernel::state::StateDelta;
use pacer::Reactor;

fn busy_session() -> (Reactor, Instant) {
    let (tx, rx) = mpsc::channel(100);
    let mut reactor = Reactor::new(rx, tx, PacerConfig::default());
    let t0 = Instant::now();

    reactor.step(t0, vec![Event::Control(ControlCommand::SetMode(Mode::Translate))]);
    reactor.step(t0, vec![Event::Remote(RemoteEvent::Opened)]);

    // Queued input, a phrase mid-recording, queued and playing output
    let frames = (0..12)
        .map(|_| Event::Frame(AudioFrame::new(vec![0.1; 4096])))
        .collect();
    reactor.step(t0, frames);
    let fragments = (0..3)
        .map(|_| {
            Event::Remote(RemoteEvent::Audio {
                payload: AudioPayload::Pcm16(encode_pcm16(&[0.3; 480])),
                group_id: None,
            })
        })
        .collect();
    reactor.step(t0, fragments);
    reactor.state.reduce(StateDelta::Latency(7.5));

    assert!(!reactor.input_queue.is_empty());
    assert!(!reactor.output_queue.is_empty());
    assert!(reactor.segmenter.is_recording());
    assert!(reactor.playback.is_playing());

    (reactor, t0)
}

#[tokio::test]
async fn test_disconnect_resets_everything() {
    let (mut reactor, t0) = busy_session();

    reactor.step(t0, vec![Event::Control(ControlCommand::Disconnect)]);

    assert_eq!(reactor.state.status, ConnectionStatus::Disconnected);
    assert_eq!(reactor.state.mode, Mode::Off);
    assert_eq!(reactor.state.latency_seconds, 0.0);
    assert_eq!(reactor.state.playback_rate, 1.0);
    assert!(reactor.input_queue.is_empty());
    assert!(reactor.output_queue.is_empty());
    assert!(!reactor.segmenter.is_recording());
    assert!(!reactor.playback.is_playing());
    assert!(reactor.ledger.is_empty());
    assert_eq!(reactor.ledger.current(), GroupId(0));
    assert!(reactor.resources.is_idle());
    assert!(!reactor.resources.channel_open());
    assert_eq!(reactor.dispatcher.deadline(), None);

    // Languages and room are preferences, not session state
    assert_eq!(reactor.state.target_languages, vec!["Svenska".to_string()]);
    assert_eq!(reactor.state.room, "Stora salen");
}

#[tokio::test]
async fn test_teardown_twice_is_a_noop() {
    let (mut reactor, t0) = busy_session();

    let first = reactor.step(t0, vec![Event::Control(ControlCommand::Disconnect)]);
    assert_eq!(first.len(), 3);
    let state = reactor.state.clone();
    let snapshot = reactor.snapshot();
    let teardowns = reactor.telemetry.snapshot().session_stats.teardowns;

    let second = reactor.step(t0, vec![Event::Control(ControlCommand::SetMode(Mode::Off))]);
    let third = reactor.step(t0, vec![Event::Control(ControlCommand::Disconnect)]);

    assert!(second.is_empty());
    assert!(third.is_empty());
    assert_eq!(reactor.state, state);
    assert_eq!(reactor.snapshot(), snapshot);
    assert_eq!(reactor.telemetry.snapshot().session_stats.teardowns, teardowns);
}

#[tokio::test]
async fn test_repeated_fault_lands_in_same_state() {
    let (mut reactor, t0) = busy_session();
    let fault = || Event::Fault(SessionError::Channel("broken pipe".into()));

    let first = reactor.step(t0, vec![fault()]);
    assert!(!first.is_empty());
    let state = reactor.state.clone();
    let snapshot = reactor.snapshot();

    let second = reactor.step(t0, vec![fault()]);
    assert!(second.is_empty());
    assert_eq!(reactor.state, state);
    assert_eq!(reactor.snapshot(), snapshot);
    assert_eq!(
        reactor.state.last_error.as_deref(),
        Some("connection interrupted: broken pipe")
    );
}

#[tokio::test]
async fn test_reconnect_starts_fresh_counter() {
    let (mut reactor, t0) = busy_session();
    reactor.step(t0, vec![Event::Control(ControlCommand::Disconnect)]);

    reactor.step(t0, vec![Event::Control(ControlCommand::SetMode(Mode::Translate))]);
    reactor.step(t0, vec![Event::Remote(RemoteEvent::Opened)]);
    reactor.step(t0, vec![Event::Frame(AudioFrame::new(vec![0.1; 4096]))]);
    let effects = reactor.flush_phrase(t0);

    assert_eq!(reactor.ledger.current(), GroupId(1));
    assert_eq!(effects.len(), 1);
}

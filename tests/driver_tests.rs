use std::time::Duration;

use tokio::sync::mpsc;

use pacer::audio::capture::ManualCapture;
use pacer::audio::playback::ClockSink;
use pacer::kernel::config::PacerConfig;
use pacer::kernel::event::{AudioFrame, ConnectionStatus, ControlCommand, Event, GroupId, Mode};
use pacer::services::remote::connector_for;
use pacer::{Bindings, Reactor};

fn fast_config() -> PacerConfig {
    let mut config = PacerConfig::default();
    // 100 ms frames, short pauses
    config.segmenter.frame_size = 1600;
    config.segmenter.silence_timeout_ms = 200;
    config.remote.loopback_delay_ms = 20;
    config
}

#[tokio::test]
async fn test_loopback_round_trip() {
    let config = fast_config();
    let (tx, rx) = mpsc::channel(100);

    let sink = ClockSink::new();
    let played = sink.played();
    let mut bindings = Bindings::new(
        connector_for(
            &config.remote,
            config.segmenter.sample_rate,
            config.playback.output_sample_rate,
        ),
        Box::new(ManualCapture),
        Box::new(sink),
    );
    let mut reactor = Reactor::new(rx, tx.clone(), config);
    let mut snapshots = reactor.subscribe();

    // Speak, pause, then give the pipeline time to finish
    tokio::spawn(async move {
        let _ = tx.send(Event::Control(ControlCommand::SetMode(Mode::Translate))).await;
        for _ in 0..3 {
            let _ = tx.send(Event::Frame(AudioFrame::new(vec![0.1; 1600]))).await;
        }
        for _ in 0..3 {
            let _ = tx.send(Event::Frame(AudioFrame::new(vec![0.0; 1600]))).await;
        }
        tokio::time::sleep(Duration::from_millis(1500)).await;
        let _ = tx.send(Event::Control(ControlCommand::Shutdown)).await;
    });

    tokio::time::timeout(Duration::from_secs(10), reactor.run(&mut bindings))
        .await
        .expect("reactor should stop on shutdown");

    assert!(reactor.is_shutdown());
    assert_eq!(played.lock().unwrap().as_slice(), &[GroupId(1)]);

    let stats = reactor.telemetry.snapshot();
    assert_eq!(stats.phrase_stats.committed, 1);
    assert_eq!(stats.phrase_stats.transmitted, 1);
    assert_eq!(stats.playback_stats.started, 1);
    assert_eq!(stats.playback_stats.measured, 1);

    assert_eq!(reactor.transcript.items().len(), 1);

    // Last published snapshot reflects the shutdown
    let last = snapshots.borrow_and_update().clone();
    assert_eq!(last.status, ConnectionStatus::Disconnected);
    assert_eq!(last.mode, Mode::Off);
}

#[tokio::test]
async fn test_shutdown_command_ends_run() {
    let config = PacerConfig::default();
    let (tx, rx) = mpsc::channel(100);
    let mut bindings = Bindings::new(
        connector_for(&config.remote, 16_000, 24_000),
        Box::new(ManualCapture),
        Box::new(ClockSink::new()),
    );
    let mut reactor = Reactor::new(rx, tx, config);

    // The reactor's own sender keeps the channel open, so only Shutdown ends the loop
    let control = reactor.sender();
    control
        .send(Event::Control(ControlCommand::Shutdown))
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(5), reactor.run(&mut bindings))
        .await
        .expect("reactor should stop");
    assert!(reactor.is_shutdown());
}

//! Offline replay: feeds a WAV file through the full pipeline in real time,
//! with the loopback remote and a clock-only sink, then prints telemetry.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use pacer::audio::capture::ManualCapture;
use pacer::audio::playback::ClockSink;
use pacer::audio::resample::resample;
use pacer::kernel::config::RemoteBackend;
use pacer::kernel::event::{AudioFrame, ConnectionStatus, ControlCommand, Event, Mode};
use pacer::kernel::time::duration_for_samples;
use pacer::services::remote::connector_for;
use pacer::{Bindings, PacerConfig, Reactor};

#[derive(Parser, Debug)]
#[command(name = "simulate")]
struct Cli {
    /// Input recording (any rate, any channel count)
    wav: PathBuf,

    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = "translate")]
    mode: Mode,

    /// Feed faster than real time
    #[arg(long, default_value_t = 1.0)]
    speed: f64,
}

fn read_wav(path: &Path, target_rate: u32) -> Result<Vec<f32>> {
    if !path.exists() {
        bail!("Audio file not found: {}", path.display());
    }

    let mut reader = hound::WavReader::open(path)?;
    let format = reader.spec();
    tracing::info!(
        "Audio format: {} Hz, {} channels, {} bits",
        format.sample_rate,
        format.channels,
        format.bits_per_sample
    );

    let interleaved: Vec<f32> = match format.sample_format {
        hound::SampleFormat::Int => {
            let max_val = (1i64 << (format.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<Result<_, _>>()?
        }
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
    };

    let channels = format.channels.max(1) as usize;
    let mono: Vec<f32> = interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect();

    resample(&mono, format.sample_rate as f64, target_rate as f64)
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();
    if cli.mode == Mode::Off {
        bail!("mode must be translate or transcribe");
    }
    if cli.speed <= 0.0 {
        bail!("speed must be positive");
    }

    let mut config = PacerConfig::load(cli.config.as_deref())?;
    config.remote.backend = RemoteBackend::Loopback;

    let samples = read_wav(&cli.wav, config.segmenter.sample_rate)
        .with_context(|| format!("reading {}", cli.wav.display()))?;
    let frame_size = config.segmenter.frame_size;
    let frame_duration = duration_for_samples(frame_size, config.segmenter.sample_rate).div_f64(cli.speed);

    let (tx, rx) = mpsc::channel(256);
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

    let effects = reactor.step(
        Instant::now(),
        vec![Event::Control(ControlCommand::SetMode(cli.mode))],
    );
    reactor.execute_all(&mut bindings, effects);
    if let Some(err) = reactor.state.last_error.clone() {
        bail!("could not start session: {}", err);
    }

    // 1. Feed
    let mut ticker = interval(frame_duration);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);

    for chunk in samples.chunks(frame_size) {
        ticker.tick().await;

        let mut events = Vec::new();
        while let Ok(event) = reactor.receiver.try_recv() {
            events.push(event);
        }
        events.push(Event::Frame(AudioFrame::new(chunk.to_vec())));

        let effects = reactor.step(Instant::now(), events);
        reactor.execute_all(&mut bindings, effects);
    }

    // 2. End of input
    let effects = reactor.flush_phrase(Instant::now());
    reactor.execute_all(&mut bindings, effects);
    tracing::info!("Input exhausted, waiting for the pipeline to drain");

    // 3. Drain, then stop
    let mut snapshots = reactor.subscribe();
    let stop_tx = tx.clone();
    tokio::spawn(async move {
        while snapshots.changed().await.is_ok() {
            let snap = snapshots.borrow().clone();
            let drained = snap.queue.total == 0 && !snap.playing && !snap.recording;
            if drained || snap.status == ConnectionStatus::Disconnected {
                let _ = stop_tx.send(Event::Control(ControlCommand::Shutdown)).await;
                break;
            }
        }
    });

    reactor.run(&mut bindings).await;

    // 4. Report
    if let Ok(order) = played.lock() {
        let ids: Vec<String> = order.iter().map(|id| id.to_string()).collect();
        println!("Playback order: {}", ids.join(" "));
    }
    for item in reactor.transcript.items() {
        println!("{} {}", item.group_id, item.text.trim());
    }
    println!("{}", serde_json::to_string_pretty(&reactor.telemetry.snapshot())?);
    Ok(())
}

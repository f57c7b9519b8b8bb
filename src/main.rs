use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use pacer::audio::capture::CpalCapture;
use pacer::audio::playback::CpalSink;
use pacer::kernel::config::RemoteBackend;
use pacer::kernel::event::{ControlCommand, Event, Mode};
use pacer::services::remote::connector_for;
use pacer::{Bindings, PacerConfig, Reactor};

/// Live interpreter: microphone in, translated speech out.
#[derive(Parser, Debug)]
#[command(name = "pacer", version)]
struct Cli {
    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Start immediately in this mode (translate, transcribe)
    #[arg(long)]
    mode: Option<Mode>,

    /// Target language; repeat or comma-separate for several
    #[arg(long, value_delimiter = ',')]
    lang: Vec<String>,

    #[arg(long)]
    room: Option<String>,

    #[arg(long, value_enum)]
    backend: Option<Backend>,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum Backend {
    Loopback,
    Http,
}

fn parse_command(line: &str) -> Option<ControlCommand> {
    let (head, rest) = match line.split_once(' ') {
        Some((head, rest)) => (head, rest.trim()),
        None => (line, ""),
    };

    match head.to_ascii_lowercase().as_str() {
        "translate" => Some(ControlCommand::SetMode(Mode::Translate)),
        "transcribe" => Some(ControlCommand::SetMode(Mode::Transcribe)),
        "off" | "stop" => Some(ControlCommand::SetMode(Mode::Off)),
        "lang" => Some(ControlCommand::SetTargetLanguages(
            rest.split(',').map(|l| l.trim().to_string()).collect(),
        )),
        "room" => Some(ControlCommand::SetRoom(rest.to_string())),
        "disconnect" => Some(ControlCommand::Disconnect),
        "quit" | "exit" => Some(ControlCommand::Shutdown),
        _ => None,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Setup Logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();

    // 2. Configuration
    let mut config = PacerConfig::load(cli.config.as_deref())?;
    if !cli.lang.is_empty() {
        config.session.target_languages = cli.lang.clone();
    }
    if let Some(room) = cli.room.clone() {
        config.session.room = room;
    }
    match cli.backend {
        Some(Backend::Http) => config.remote.backend = RemoteBackend::Http,
        Some(Backend::Loopback) => config.remote.backend = RemoteBackend::Loopback,
        None => {}
    }

    tracing::info!(
        "Starting pacer. Backend: {:?}, languages: {}, room: {}",
        config.remote.backend,
        config.session.target_languages.join(", "),
        config.session.room
    );

    // 3. Reactor + Channels
    let (tx, rx) = mpsc::channel(256);
    let mut bindings = Bindings::new(
        connector_for(
            &config.remote,
            config.segmenter.sample_rate,
            config.playback.output_sample_rate,
        ),
        Box::new(CpalCapture::new(&config.segmenter)),
        Box::new(CpalSink::new()),
    );
    let mut reactor = Reactor::new(rx, tx.clone(), config);

    // 4. Status watcher
    let mut snapshots = reactor.subscribe();
    tokio::spawn(async move {
        let mut last = snapshots.borrow().clone();
        while snapshots.changed().await.is_ok() {
            let snap = snapshots.borrow().clone();
            if snap.status != last.status || snap.mode != last.mode || snap.last_error != last.last_error {
                tracing::info!(
                    "Status: {:?} / {:?}{}",
                    snap.status,
                    snap.mode,
                    snap.last_error
                        .as_deref()
                        .map(|e| format!(" ({})", e))
                        .unwrap_or_default()
                );
            }
            if snap.pace != last.pace || snap.playback_rate != last.playback_rate {
                tracing::info!(
                    "Pace: {:?} x{:.2}, latency {:.1}s, queue {:?}",
                    snap.pace, snap.playback_rate, snap.latency_seconds, snap.queue
                );
            }
            last = snap;
        }
    });

    // 5. Console + Ctrl-C
    let console_tx = tx.clone();
    tokio::spawn(async move {
        let reader = BufReader::new(tokio::io::stdin());
        let mut lines = reader.lines();

        println!("Commands: translate | transcribe | off | lang <a,b> | room <name> | quit");

        while let Ok(Some(line)) = lines.next_line().await {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match parse_command(line) {
                Some(cmd) => {
                    if console_tx.send(Event::Control(cmd)).await.is_err() {
                        break;
                    }
                }
                None => println!("Unknown command: {}", line),
            }
        }
    });

    let signal_tx = tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = signal_tx.send(Event::Control(ControlCommand::Shutdown)).await;
        }
    });

    if let Some(mode) = cli.mode {
        tx.send(Event::Control(ControlCommand::SetMode(mode))).await?;
    }

    // 6. Drive
    reactor.run(&mut bindings).await;

    let stats = reactor.telemetry.snapshot();
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

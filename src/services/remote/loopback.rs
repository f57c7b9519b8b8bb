use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{OpenRequest, RemoteChannel, RemoteConnector};
use crate::audio::codec;
use crate::audio::resample::resample;
use crate::kernel::error::SessionError;
use crate::kernel::event::{AudioPayload, Event, RemoteEvent};
use crate::kernel::queue::QueueEntry;
use crate::kernel::time::ms_for_samples;

/// Stand-in remote that speaks every phrase back after a fixed delay.
pub struct LoopbackConnector {
    delay: Duration,
    input_rate: u32,
    output_rate: u32,
}

impl LoopbackConnector {
    pub fn new(delay: Duration, input_rate: u32, output_rate: u32) -> Self {
        Self {
            delay,
            input_rate,
            output_rate,
        }
    }
}

impl RemoteConnector for LoopbackConnector {
    fn open(
        &mut self,
        request: OpenRequest,
        events: mpsc::Sender<Event>,
    ) -> Result<Box<dyn RemoteChannel>, SessionError> {
        debug!("Loopback open: {}", request.instruction());

        let (tx, rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();
        tokio::spawn(echo(
            rx,
            events,
            self.delay,
            self.input_rate,
            self.output_rate,
            token.clone(),
        ));

        Ok(Box::new(LoopbackChannel { tx, token }))
    }
}

async fn echo(
    mut rx: mpsc::UnboundedReceiver<QueueEntry>,
    events: mpsc::Sender<Event>,
    delay: Duration,
    input_rate: u32,
    output_rate: u32,
    token: CancellationToken,
) {
    if events.send(Event::Remote(RemoteEvent::Opened)).await.is_err() {
        return;
    }

    loop {
        let entry = tokio::select! {
            _ = token.cancelled() => break,
            entry = rx.recv() => match entry {
                Some(entry) => entry,
                None => break,
            },
        };

        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }

        let samples = match codec::decode_pcm16(&entry.audio.data) {
            Ok(s) => s,
            Err(e) => {
                warn!("Loopback skipped group {}: {}", entry.group_id, e);
                continue;
            }
        };
        let rate = if entry.audio.sample_rate > 0 { entry.audio.sample_rate } else { input_rate };
        let reply = match resample(&samples, rate as f64, output_rate as f64) {
            Ok(s) => s,
            Err(e) => {
                warn!("Loopback resample failed: {}", e);
                continue;
            }
        };

        let spoken_ms = ms_for_samples(samples.len() as u64, rate);
        let outgoing = [
            RemoteEvent::PartialText {
                text: format!("[{} ms of speech] ", spoken_ms),
                is_final: false,
            },
            RemoteEvent::Audio {
                payload: AudioPayload::Pcm16(codec::encode_pcm16(&reply)),
                group_id: Some(entry.group_id),
            },
            RemoteEvent::TurnComplete,
        ];
        for event in outgoing {
            if events.send(Event::Remote(event)).await.is_err() {
                return;
            }
        }
    }

    debug!("Loopback worker stopped");
}

pub struct LoopbackChannel {
    tx: mpsc::UnboundedSender<QueueEntry>,
    token: CancellationToken,
}

impl RemoteChannel for LoopbackChannel {
    fn send_audio(&mut self, entry: &QueueEntry) -> Result<(), SessionError> {
        self.tx
            .send(entry.clone())
            .map_err(|_| SessionError::Channel("loopback worker stopped".into()))
    }

    fn send_hint(&mut self, text: &str) -> Result<(), SessionError> {
        debug!("Loopback ignores hint: {}", text);
        Ok(())
    }

    fn close(&mut self) {
        self.token.cancel();
    }
}

impl Drop for LoopbackChannel {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

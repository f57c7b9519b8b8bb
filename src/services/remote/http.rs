use std::time::Duration;

use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{OpenRequest, RemoteChannel, RemoteConnector};
use crate::audio::codec;
use crate::kernel::config::RemoteConfig;
use crate::kernel::error::SessionError;
use crate::kernel::event::{AudioPayload, Event, GroupId, Mode, RemoteEvent};
use crate::kernel::queue::QueueEntry;

#[derive(Serialize)]
struct InterpretRequest<'a> {
    group_id: GroupId,
    mode: Mode,
    instruction: &'a str,
    target_languages: &'a [String],
    /// Base64 little-endian PCM16 mono.
    audio: String,
    sample_rate: u32,
}

#[derive(Deserialize)]
struct InterpretResponse {
    #[serde(default)]
    transcript: Option<String>,
    /// Base64 PCM16 fragments, in playback order.
    #[serde(default)]
    audio: Vec<String>,
    #[serde(default)]
    group_id: Option<GroupId>,
    #[serde(default)]
    turn_complete: bool,
}

#[derive(Serialize)]
struct HintRequest<'a> {
    text: &'a str,
}

enum Outbound {
    Audio(QueueEntry),
    Hint(String),
}

/// JSON-over-HTTP interpreter service.
#[derive(Clone)]
pub struct HttpService {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HttpService {
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| anyhow!("API key missing"))?;

        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    pub async fn health(&self) -> Result<()> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("Health check failed: {}", response.status()));
        }
        Ok(())
    }

    async fn interpret(&self, entry: &QueueEntry, request: &OpenRequest, instruction: &str) -> Result<InterpretResponse> {
        let body = InterpretRequest {
            group_id: entry.group_id,
            mode: request.mode,
            instruction,
            target_languages: &entry.target_languages,
            audio: codec::encode_base64(&entry.audio.data),
            sample_rate: entry.audio.sample_rate,
        };

        let response = self
            .client
            .post(format!("{}/v1/interpret", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("Interpreter Server Error: {}", response.status()));
        }

        Ok(response.json().await?)
    }

    async fn hint(&self, text: &str) -> Result<()> {
        let response = self
            .client
            .post(format!("{}/v1/hint", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&HintRequest { text })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("Hint rejected: {}", response.status()));
        }
        Ok(())
    }
}

/// One worker per session. Requests run strictly one at a time, so replies
/// come back in the order chunks were sent.
async fn worker(
    service: HttpService,
    request: OpenRequest,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    events: mpsc::Sender<Event>,
    token: CancellationToken,
) {
    let emit = |event: RemoteEvent| {
        let events = events.clone();
        async move {
            let _ = events.send(Event::Remote(event)).await;
        }
    };

    tokio::select! {
        _ = token.cancelled() => return,
        result = service.health() => match result {
            Ok(()) => {
                info!("Interpreter service reachable at {}", service.base_url);
                emit(RemoteEvent::Opened).await;
            }
            Err(e) => {
                emit(RemoteEvent::Error(format!("connection failed: {}", e))).await;
                return;
            }
        }
    }

    let instruction = request.instruction();

    loop {
        let next = tokio::select! {
            _ = token.cancelled() => break,
            next = outbound.recv() => next,
        };
        let Some(message) = next else { break };

        match message {
            Outbound::Audio(entry) => {
                let result = tokio::select! {
                    _ = token.cancelled() => break,
                    result = service.interpret(&entry, &request, &instruction) => result,
                };

                match result {
                    Ok(reply) => {
                        let group_id = reply.group_id.or(Some(entry.group_id));
                        if let Some(text) = reply.transcript.filter(|t| !t.is_empty()) {
                            emit(RemoteEvent::PartialText {
                                text,
                                is_final: reply.turn_complete,
                            })
                            .await;
                        }
                        for audio in reply.audio {
                            emit(RemoteEvent::Audio {
                                payload: AudioPayload::Base64(audio),
                                group_id,
                            })
                            .await;
                        }
                        if reply.turn_complete {
                            emit(RemoteEvent::TurnComplete).await;
                        }
                    }
                    Err(e) => {
                        emit(RemoteEvent::Error(format!("request for group {} failed: {}", entry.group_id, e))).await;
                        break;
                    }
                }
            }
            Outbound::Hint(text) => {
                if let Err(e) = service.hint(&text).await {
                    warn!("Hint not delivered: {}", e);
                }
            }
        }
    }

    debug!("HTTP worker stopped");
}

pub struct HttpConnector {
    config: RemoteConfig,
}

impl HttpConnector {
    pub fn new(config: RemoteConfig) -> Self {
        Self { config }
    }
}

impl RemoteConnector for HttpConnector {
    fn open(
        &mut self,
        request: OpenRequest,
        events: mpsc::Sender<Event>,
    ) -> Result<Box<dyn RemoteChannel>, SessionError> {
        let service = HttpService::new(&self.config).map_err(|e| SessionError::Config(e.to_string()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();
        tokio::spawn(worker(service, request, rx, events, token.clone()));

        Ok(Box::new(HttpChannel { tx, token }))
    }
}

pub struct HttpChannel {
    tx: mpsc::UnboundedSender<Outbound>,
    token: CancellationToken,
}

impl RemoteChannel for HttpChannel {
    fn send_audio(&mut self, entry: &QueueEntry) -> Result<(), SessionError> {
        self.tx
            .send(Outbound::Audio(entry.clone()))
            .map_err(|_| SessionError::Channel("interpreter worker stopped".into()))
    }

    fn send_hint(&mut self, text: &str) -> Result<(), SessionError> {
        self.tx
            .send(Outbound::Hint(text.to_string()))
            .map_err(|_| SessionError::Channel("interpreter worker stopped".into()))
    }

    fn close(&mut self) {
        self.token.cancel();
    }
}

impl Drop for HttpChannel {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

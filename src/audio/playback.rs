use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use tokio::sync::mpsc;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::resample::resample;
use super::AudioSink;
use crate::kernel::error::SessionError;
use crate::kernel::event::{Event, GroupId};
use crate::kernel::queue::OutputFragment;

const BEEP_MS: u64 = 100;
const BEEP_FROM_HZ: f32 = 440.0;
const BEEP_TO_HZ: f32 = 880.0;

/// Short rising tone, used as the audible cue when output is unmuted.
pub fn beep_samples(sample_rate: u32) -> Vec<f32> {
    let len = (sample_rate as u64 * BEEP_MS / 1000) as usize;
    let mut phase = 0.0f32;
    (0..len)
        .map(|i| {
            let t = i as f32 / len as f32;
            let freq = BEEP_FROM_HZ + (BEEP_TO_HZ - BEEP_FROM_HZ) * t;
            phase += std::f32::consts::TAU * freq / sample_rate as f32;
            // Linear fade out avoids a click at the end
            0.1 * phase.sin() * (1.0 - t)
        })
        .collect()
}

struct OutputStream {
    _stream: cpal::Stream,
    producer: Arc<Mutex<HeapProd<f32>>>,
    sample_rate: u32,
    token: CancellationToken,
}

fn open_output(muted: Arc<AtomicBool>) -> Result<OutputStream, anyhow::Error> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| anyhow::anyhow!("No output device available"))?;

    info!("Audio Output Device: {}", device.name().unwrap_or_default());

    let config = device.default_output_config()?;
    let sample_rate = config.sample_rate().0;
    let channels = config.channels().max(1) as usize;

    // Ten seconds of queued speech at the device rate
    let rb = HeapRb::<f32>::new(sample_rate as usize * 10);
    let (producer, mut consumer) = rb.split();

    let err_fn = |err| error!("an error occurred on output stream: {}", err);

    let stream = match config.sample_format() {
        cpal::SampleFormat::F32 => {
            let muted = muted.clone();
            device.build_output_stream(
                &config.into(),
                move |data: &mut [f32], _: &_| {
                    write_output(data, channels, &mut consumer, &muted, |s| s)
                },
                err_fn,
                None,
            )?
        }
        cpal::SampleFormat::I16 => {
            let muted = muted.clone();
            device.build_output_stream(
                &config.into(),
                move |data: &mut [i16], _: &_| {
                    write_output(data, channels, &mut consumer, &muted, |s| {
                        (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
                    })
                },
                err_fn,
                None,
            )?
        }
        _ => return Err(anyhow::anyhow!("Unsupported sample format")),
    };

    stream.play()?;
    info!("Output Config: Rate={}Hz, Channels={}", sample_rate, channels);

    Ok(OutputStream {
        _stream: stream,
        producer: Arc::new(Mutex::new(producer)),
        sample_rate,
        token: CancellationToken::new(),
    })
}

// Muted output still drains the ring so the schedule keeps moving.
fn write_output<T: Copy>(
    data: &mut [T],
    channels: usize,
    consumer: &mut HeapCons<f32>,
    muted: &AtomicBool,
    convert: impl Fn(f32) -> T,
) {
    let silent = muted.load(Ordering::Relaxed);
    for frame in data.chunks_mut(channels) {
        let sample = consumer.try_pop().unwrap_or(0.0);
        let value = convert(if silent { 0.0 } else { sample });
        for out in frame.iter_mut() {
            *out = value;
        }
    }
}

/// Default output device.
///
/// The rate multiplier is applied by resampling: a fragment at `rate` is
/// treated as if it were recorded at `rate` times its sample rate, so it
/// plays shorter and higher.
pub struct CpalSink {
    muted: Arc<AtomicBool>,
    output: Option<OutputStream>,
}

impl CpalSink {
    pub fn new() -> Self {
        Self {
            muted: Arc::new(AtomicBool::new(false)),
            output: None,
        }
    }
}

impl Default for CpalSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioSink for CpalSink {
    fn start(&mut self) -> Result<(), SessionError> {
        if self.output.is_none() {
            let output =
                open_output(self.muted.clone()).map_err(|e| SessionError::Device(e.to_string()))?;
            self.output = Some(output);
        }
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(output) = self.output.take() {
            output.token.cancel();
            info!("Output stopped");
        }
    }

    fn set_muted(&mut self, muted: bool) {
        self.muted.store(muted, Ordering::Relaxed);
    }

    fn play(
        &mut self,
        fragment: OutputFragment,
        start_at: Instant,
        rate: f64,
        events: mpsc::Sender<Event>,
    ) -> Result<(), SessionError> {
        let Some(output) = self.output.as_ref() else {
            return Err(SessionError::Device("output not started".into()));
        };

        let samples = resample(
            &fragment.samples,
            fragment.sample_rate as f64 * rate,
            output.sample_rate as f64,
        )
        .map_err(|e| SessionError::Device(e.to_string()))?;

        let effective = fragment.duration.div_f64(rate.max(f64::EPSILON));
        let producer = output.producer.clone();
        let token = output.token.clone();
        let group_id = fragment.group_id;

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = sleep_until(start_at) => {}
            }

            let pushed = match producer.lock() {
                Ok(mut producer) => producer.push_slice(&samples),
                Err(_) => 0,
            };
            if pushed < samples.len() {
                warn!("Output ring full, dropped {} samples", samples.len() - pushed);
            }

            tokio::select! {
                _ = token.cancelled() => {}
                _ = sleep(effective) => {
                    let _ = events.send(Event::PlaybackFinished { group_id }).await;
                }
            }
        });
        Ok(())
    }

    fn beep(&mut self) {
        if let Some(output) = self.output.as_ref() {
            let tone = beep_samples(output.sample_rate);
            if let Ok(mut producer) = output.producer.lock() {
                producer.push_slice(&tone);
            }
        }
    }
}

/// Device-free sink that only keeps time.
///
/// Each fragment "plays" for its effective duration on the tokio clock and is
/// logged in order. Used by the simulator and in tests.
#[derive(Debug, Default)]
pub struct ClockSink {
    played: Arc<Mutex<Vec<GroupId>>>,
    muted: bool,
    token: Option<CancellationToken>,
}

impl ClockSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared log of group ids in the order they started.
    pub fn played(&self) -> Arc<Mutex<Vec<GroupId>>> {
        self.played.clone()
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }
}

impl AudioSink for ClockSink {
    fn start(&mut self) -> Result<(), SessionError> {
        if self.token.is_none() {
            self.token = Some(CancellationToken::new());
        }
        Ok(())
    }

    fn stop(&mut self) {
        // Pending completions belong to the stopped session
        if let Some(token) = self.token.take() {
            token.cancel();
        }
    }

    fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    fn play(
        &mut self,
        fragment: OutputFragment,
        start_at: Instant,
        rate: f64,
        events: mpsc::Sender<Event>,
    ) -> Result<(), SessionError> {
        let Some(token) = self.token.clone() else {
            return Err(SessionError::Device("output not started".into()));
        };

        if let Ok(mut played) = self.played.lock() {
            played.push(fragment.group_id);
        }

        let end = start_at + fragment.duration.div_f64(rate.max(f64::EPSILON));
        let group_id = fragment.group_id;
        debug!("Clock sink: group {} until {:?}", group_id, end);

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = sleep_until(end) => {
                    let _ = events.send(Event::PlaybackFinished { group_id }).await;
                }
            }
        });
        Ok(())
    }

    fn beep(&mut self) {
        debug!("Beep");
    }
}

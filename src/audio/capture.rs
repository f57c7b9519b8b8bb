use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::traits::{Producer, Split};
use ringbuf::HeapRb;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::processing::FrameReader;
use super::CaptureControl;
use crate::kernel::config::SegmenterConfig;
use crate::kernel::error::SessionError;
use crate::kernel::event::Event;

/// Open input stream. Samples are downmixed to mono and pushed into the ring.
pub struct AudioCapture {
    _stream: cpal::Stream,
    pub sample_rate: u32,
}

impl AudioCapture {
    pub fn new<P>(mut producer: P, preferred_rate: u32) -> Result<Self, anyhow::Error>
    where
        P: Producer<Item = f32> + Send + 'static,
    {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| anyhow::anyhow!("No input device available"))?;

        info!("Audio Input Device: {}", device.name().unwrap_or_default());

        // Prefer the segmenter rate so no resampling is needed
        let target_rates = [preferred_rate, 48000, 44100, 32000];
        let mut selected_config = None;

        for &rate in &target_rates {
            let configs = device.supported_input_configs()?;
            for config_range in configs {
                if config_range.min_sample_rate().0 <= rate && config_range.max_sample_rate().0 >= rate {
                    selected_config = Some(config_range.with_sample_rate(cpal::SampleRate(rate)));
                    break;
                }
            }
            if selected_config.is_some() {
                break;
            }
        }

        let config = match selected_config {
            Some(c) => c,
            None => device.default_input_config()?,
        };
        let sample_rate = config.sample_rate().0;
        let channels = config.channels().max(1) as usize;

        info!("Audio Config Selected: Rate={}Hz, Channels={}", sample_rate, channels);

        let err_fn = |err| error!("an error occurred on input stream: {}", err);

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => device.build_input_stream(
                &config.into(),
                move |data: &[f32], _: &_| write_input_data(data, channels, &mut producer),
                err_fn,
                None,
            )?,
            cpal::SampleFormat::I16 => device.build_input_stream(
                &config.into(),
                move |data: &[i16], _: &_| write_input_data_i16(data, channels, &mut producer),
                err_fn,
                None,
            )?,
            _ => return Err(anyhow::anyhow!("Unsupported sample format")),
        };

        stream.play()?;

        Ok(Self {
            _stream: stream,
            sample_rate,
        })
    }
}

// Full ring means the reader fell behind; samples are dropped (lossy).
fn write_input_data<P>(input: &[f32], channels: usize, producer: &mut P)
where
    P: Producer<Item = f32>,
{
    if channels == 1 {
        producer.push_slice(input);
        return;
    }
    for frame in input.chunks(channels) {
        let mono = frame.iter().sum::<f32>() / frame.len() as f32;
        let _ = producer.try_push(mono);
    }
}

fn write_input_data_i16<P>(input: &[i16], channels: usize, producer: &mut P)
where
    P: Producer<Item = f32>,
{
    for frame in input.chunks(channels) {
        let sum: f32 = frame.iter().map(|&s| s as f32 / i16::MAX as f32).sum();
        let _ = producer.try_push(sum / frame.len() as f32);
    }
}

struct ActiveCapture {
    _capture: AudioCapture,
    token: CancellationToken,
    reader: JoinHandle<()>,
}

/// Default microphone, framed and resampled for the segmenter.
pub struct CpalCapture {
    sample_rate: u32,
    frame_size: usize,
    active: Option<ActiveCapture>,
}

impl CpalCapture {
    pub fn new(config: &SegmenterConfig) -> Self {
        Self {
            sample_rate: config.sample_rate,
            frame_size: config.frame_size,
            active: None,
        }
    }
}

impl CaptureControl for CpalCapture {
    fn start(&mut self, events: mpsc::Sender<Event>) -> Result<(), SessionError> {
        if self.active.is_some() {
            return Ok(());
        }

        // Two seconds of headroom at the highest rate we might get
        let rb = HeapRb::<f32>::new(48000 * 2);
        let (producer, consumer) = rb.split();

        let capture = AudioCapture::new(producer, self.sample_rate)
            .map_err(|e| SessionError::Device(e.to_string()))?;

        let token = CancellationToken::new();
        let reader = FrameReader::new(
            consumer,
            events,
            capture.sample_rate,
            self.sample_rate,
            self.frame_size,
            token.clone(),
        );
        let reader = std::thread::Builder::new()
            .name("pacer-capture".into())
            .spawn(move || reader.run())
            .map_err(|e| SessionError::Device(format!("capture thread: {}", e)))?;

        self.active = Some(ActiveCapture {
            _capture: capture,
            token,
            reader,
        });
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(active) = self.active.take() {
            active.token.cancel();
            if active.reader.join().is_err() {
                warn!("Capture reader panicked");
            }
            info!("Capture stopped");
        }
    }
}

/// No device. Frames are fed by the caller, e.g. from a WAV file.
#[derive(Debug, Default)]
pub struct ManualCapture;

impl CaptureControl for ManualCapture {
    fn start(&mut self, _events: mpsc::Sender<Event>) -> Result<(), SessionError> {
        Ok(())
    }

    fn stop(&mut self) {}
}

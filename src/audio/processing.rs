use std::time::Duration;

use ringbuf::traits::{Consumer, Observer};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::resample::resample;
use crate::kernel::error::SessionError;
use crate::kernel::event::{AudioFrame, Event};

const POLL: Duration = Duration::from_millis(10);

/// Reader thread between the capture ring and the reactor.
///
/// Pops fixed device-rate blocks, converts them to the segmenter rate and
/// forwards them as `Event::Frame`. Runs until cancelled or the reactor goes away.
/// Never parks on a full channel, so cancellation is seen within one poll.
pub struct FrameReader<C>
where
    C: Consumer<Item = f32> + Send,
{
    consumer: C,
    tx: mpsc::Sender<Event>,
    device_rate: u32,
    target_rate: u32,
    frame_size: usize,
    token: CancellationToken,
}

impl<C> FrameReader<C>
where
    C: Consumer<Item = f32> + Send,
{
    pub fn new(
        consumer: C,
        tx: mpsc::Sender<Event>,
        device_rate: u32,
        target_rate: u32,
        frame_size: usize,
        token: CancellationToken,
    ) -> Self {
        Self {
            consumer,
            tx,
            device_rate,
            target_rate,
            frame_size,
            token,
        }
    }

    /// Device samples needed for one segmenter frame.
    fn device_frame_len(&self) -> usize {
        let len = self.frame_size as u64 * self.device_rate as u64 / self.target_rate.max(1) as u64;
        (len as usize).max(1)
    }

    pub fn run(mut self) {
        let device_len = self.device_frame_len();
        info!(
            "Frame reader started. Device: {}Hz, Target: {}Hz, Frame: {}",
            self.device_rate, self.target_rate, self.frame_size
        );

        let mut buf: Vec<f32> = vec![0.0; device_len];

        while !self.token.is_cancelled() {
            if self.consumer.occupied_len() < device_len {
                std::thread::sleep(POLL);
                continue;
            }

            let _ = self.consumer.pop_slice(&mut buf);

            let samples = if self.device_rate == self.target_rate {
                buf.clone()
            } else {
                match resample(&buf, self.device_rate as f64, self.target_rate as f64) {
                    Ok(s) => s,
                    Err(e) => {
                        warn!("Capture resample failed: {}", e);
                        self.forward(Event::Fault(SessionError::Device(e.to_string())));
                        break;
                    }
                }
            };

            if !self.forward(Event::Frame(AudioFrame::new(samples))) {
                break;
            }
        }

        info!("Frame reader stopped");
    }

    /// Hand one event to the reactor, waiting out a full channel.
    /// Returns false once the reader should stop.
    fn forward(&self, mut event: Event) -> bool {
        loop {
            match self.tx.try_send(event) {
                Ok(()) => return true,
                Err(TrySendError::Closed(_)) => {
                    debug!("Reactor gone, frame reader exiting");
                    return false;
                }
                Err(TrySendError::Full(back)) => {
                    if self.token.is_cancelled() {
                        return false;
                    }
                    event = back;
                    std::thread::sleep(POLL);
                }
            }
        }
    }
}

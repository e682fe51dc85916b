//! cpal microphone capture. The device callback downmixes to mono,
//! resamples to the wire rate, and hands fixed-size chunks to a bounded
//! channel; the receiving side never touches the device thread.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SizedSample;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::audio::{
    AudioChunk, LinearResampler, CAPTURE_CHUNK_SAMPLES, CAPTURE_SAMPLE_RATE_HZ,
};
use crate::error::{LiveError, Result};

/// Chunks buffered between the capture thread and the session task.
const CAPTURE_CHANNEL_DEPTH: usize = 32;

/// Owns the live input stream; dropping it releases the device.
pub struct MicCapture {
    _stream: cpal::Stream,
}

impl MicCapture {
    /// Opens the default input device with its default config and
    /// starts capturing immediately.
    pub fn open() -> Result<(MicCapture, mpsc::Receiver<AudioChunk>)> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| LiveError::Device("no default input device available".to_string()))?;
        let supported = device
            .default_input_config()
            .map_err(|e| LiveError::Device(e.to_string()))?;
        debug!(
            device = device.name().unwrap_or_else(|_| "unknown".to_string()),
            rate = supported.sample_rate().0,
            channels = supported.channels(),
            "input device"
        );

        let sample_format = supported.sample_format();
        let config: cpal::StreamConfig = supported.into();
        let (tx, rx) = mpsc::channel(CAPTURE_CHANNEL_DEPTH);

        let stream = match sample_format {
            cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config, tx, |s| s),
            cpal::SampleFormat::I16 => {
                build_stream::<i16>(&device, &config, tx, |s| f32::from(s) / 32768.0)
            }
            cpal::SampleFormat::U16 => {
                build_stream::<u16>(&device, &config, tx, |s| (f32::from(s) - 32768.0) / 32768.0)
            }
            format => {
                return Err(LiveError::Device(format!(
                    "unsupported input sample format {format:?}"
                )))
            }
        }?;
        stream
            .play()
            .map_err(|e| LiveError::Device(e.to_string()))?;

        Ok((MicCapture { _stream: stream }, rx))
    }
}

fn build_stream<T: SizedSample + Send + 'static>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    tx: mpsc::Sender<AudioChunk>,
    to_f32: fn(T) -> f32,
) -> Result<cpal::Stream> {
    let channels = usize::from(config.channels).max(1);
    let mut resampler = LinearResampler::new(config.sample_rate.0, CAPTURE_SAMPLE_RATE_HZ);
    let mut mono: Vec<f32> = Vec::new();
    let mut resampled: Vec<f32> = Vec::new();
    let mut pending: Vec<f32> = Vec::with_capacity(CAPTURE_CHUNK_SAMPLES * 2);

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                mono.clear();
                for frame in data.chunks(channels) {
                    let sum: f32 = frame.iter().map(|&s| to_f32(s)).sum();
                    mono.push(sum / frame.len() as f32);
                }

                resampler.process_into(&mono, &mut resampled);
                pending.extend_from_slice(&resampled);

                while pending.len() >= CAPTURE_CHUNK_SAMPLES {
                    let samples: Vec<f32> = pending.drain(..CAPTURE_CHUNK_SAMPLES).collect();
                    let chunk = AudioChunk {
                        samples,
                        sample_rate_hz: CAPTURE_SAMPLE_RATE_HZ,
                    };
                    if tx.try_send(chunk).is_err() {
                        // Receiver is slow or gone; shed the backlog
                        // rather than stall the device thread.
                        pending.clear();
                        break;
                    }
                }
            },
            move |err| warn!(error = %err, "input stream error"),
            None,
        )
        .map_err(|e| LiveError::Device(e.to_string()))
}

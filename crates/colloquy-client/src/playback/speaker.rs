//! cpal output device fed through a lock-free ring buffer. The device
//! callback pops mono samples and fans them out across the device's
//! channels; the async side pushes through [`SpeakerSink`].

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::traits::*;
use ringbuf::{HeapProd, HeapRb};
use tracing::warn;

use crate::audio::PLAYBACK_SAMPLE_RATE_HZ;
use crate::error::{LiveError, Result};
use crate::playback::PlaybackSink;

/// Owns the live output stream; dropping it releases the device.
pub struct SpeakerOutput {
    _stream: cpal::Stream,
    sample_rate_hz: u32,
}

/// Producer half handed to the session controller.
pub struct SpeakerSink {
    producer: HeapProd<f32>,
    queued: Arc<AtomicUsize>,
    flush: Arc<AtomicBool>,
    sample_rate_hz: u32,
}

impl SpeakerOutput {
    /// Opens the default output device, preferring a mono config at the
    /// inbound wire rate. `max_buffer_secs` bounds the ring buffer.
    pub fn open(max_buffer_secs: f64) -> Result<(SpeakerOutput, SpeakerSink)> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| LiveError::Device("no default output device available".to_string()))?;

        let mut config_ranges = device
            .supported_output_configs()
            .map_err(|e| LiveError::Device(e.to_string()))?;
        let config_range = match config_ranges.find(|c| c.channels() == 1) {
            Some(range) => range,
            None => device
                .supported_output_configs()
                .map_err(|e| LiveError::Device(e.to_string()))?
                .next()
                .ok_or_else(|| LiveError::Device("no usable output config".to_string()))?,
        };

        let sample_rate = cpal::SampleRate(PLAYBACK_SAMPLE_RATE_HZ).clamp(
            config_range.min_sample_rate(),
            config_range.max_sample_rate(),
        );
        let config: cpal::StreamConfig = config_range.with_sample_rate(sample_rate).into();
        let channels = usize::from(config.channels);
        let sample_rate_hz = config.sample_rate.0;

        let capacity = ((sample_rate_hz as f64 * max_buffer_secs) as usize).max(sample_rate_hz as usize);
        let (producer, mut consumer) = HeapRb::<f32>::new(capacity).split();

        let queued = Arc::new(AtomicUsize::new(0));
        let flush = Arc::new(AtomicBool::new(false));
        let queued_cb = queued.clone();
        let flush_cb = flush.clone();

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    data.fill(0.0);

                    if flush_cb.swap(false, Ordering::AcqRel) {
                        while consumer.try_pop().is_some() {}
                        queued_cb.store(0, Ordering::Release);
                        return;
                    }

                    let mut popped = 0usize;
                    for frame in data.chunks_mut(channels.max(1)) {
                        let Some(sample) = consumer.try_pop() else {
                            break;
                        };
                        for slot in frame {
                            *slot = sample;
                        }
                        popped += 1;
                    }

                    if popped > 0 {
                        let _ = queued_cb.fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| {
                            Some(v.saturating_sub(popped))
                        });
                    }
                },
                move |err| warn!(error = %err, "output stream error"),
                None,
            )
            .map_err(|e| LiveError::Device(e.to_string()))?;
        stream
            .play()
            .map_err(|e| LiveError::Device(e.to_string()))?;

        let sink = SpeakerSink {
            producer,
            queued,
            flush,
            sample_rate_hz,
        };
        Ok((
            SpeakerOutput {
                _stream: stream,
                sample_rate_hz,
            },
            sink,
        ))
    }

    pub fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }
}

impl SpeakerSink {
    pub fn queued_samples(&self) -> usize {
        self.queued.load(Ordering::Acquire)
    }
}

impl PlaybackSink for SpeakerSink {
    fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }

    fn enqueue(&mut self, samples: &[f32]) {
        let pushed = self.producer.push_slice(samples);
        self.queued.fetch_add(pushed, Ordering::AcqRel);
        if pushed < samples.len() {
            warn!(
                dropped = samples.len() - pushed,
                "output buffer full, dropping audio"
            );
        }
    }

    fn clear(&mut self) {
        self.flush.store(true, Ordering::Release);
    }
}

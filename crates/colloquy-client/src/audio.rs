use tokio::sync::mpsc;

use crate::error::Result;
use crate::playback::PlaybackSink;

#[cfg(feature = "audio")]
pub mod mic;

#[cfg(feature = "audio")]
pub use mic::MicCapture;

/// Rate of outbound microphone audio on the wire.
pub const CAPTURE_SAMPLE_RATE_HZ: u32 = 16_000;
/// Rate of inbound model audio on the wire.
pub const PLAYBACK_SAMPLE_RATE_HZ: u32 = 24_000;
/// Samples per outbound message.
pub const CAPTURE_CHUNK_SAMPLES: usize = 4096;

/// A contiguous block of mono samples at a fixed rate. Immutable once produced.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioChunk {
    pub samples: Vec<f32>,
    pub sample_rate_hz: u32,
}

impl AudioChunk {
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate_hz as f64
    }
}

/// Seam between the session controller and the local audio devices.
///
/// Capture audio arrives through a bounded channel fed from the device
/// callback thread; the playback half accepts decoded samples for the
/// speaker. The backend keeps the device handles alive until `close`.
pub trait AudioBackend {
    type Playback: PlaybackSink;

    fn open_capture(&mut self) -> Result<mpsc::Receiver<AudioChunk>>;

    fn open_playback(&mut self) -> Result<Self::Playback>;

    /// Release every acquired device. Must be idempotent.
    fn close(&mut self);
}

/// Streaming linear interpolator between two fixed sample rates.
///
/// Carries fractional read position across calls so chunk boundaries do
/// not introduce discontinuities.
pub struct LinearResampler {
    step: f64,
    pos: f64,
    buf: Vec<f32>,
}

impl LinearResampler {
    pub fn new(in_rate_hz: u32, out_rate_hz: u32) -> Self {
        Self {
            step: f64::from(in_rate_hz) / f64::from(out_rate_hz.max(1)),
            pos: 0.0,
            buf: Vec::new(),
        }
    }

    pub fn process_into(&mut self, input: &[f32], out: &mut Vec<f32>) {
        out.clear();
        self.buf.extend_from_slice(input);

        while self.pos + 1.0 < self.buf.len() as f64 {
            let i = self.pos.floor() as usize;
            let frac = (self.pos - i as f64) as f32;
            let a = self.buf[i];
            let b = self.buf[i + 1];
            out.push(a + (b - a) * frac);
            self.pos += self.step;
        }

        // The loop can overshoot the buffered input when step > 2, so
        // clamp before draining to keep the position consistent.
        let consumed = (self.pos.floor() as usize).min(self.buf.len());
        if consumed > 0 {
            self.buf.drain(..consumed);
            self.pos -= consumed as f64;
        }
    }
}

/// Default cpal-backed implementation of [`AudioBackend`].
#[cfg(feature = "audio")]
pub struct CpalBackend {
    mic: Option<MicCapture>,
    speaker: Option<crate::playback::SpeakerOutput>,
    max_buffer_secs: f64,
}

#[cfg(feature = "audio")]
impl CpalBackend {
    pub fn new() -> Self {
        Self {
            mic: None,
            speaker: None,
            max_buffer_secs: 120.0,
        }
    }
}

#[cfg(feature = "audio")]
impl Default for CpalBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "audio")]
impl AudioBackend for CpalBackend {
    type Playback = crate::playback::SpeakerSink;

    fn open_capture(&mut self) -> Result<mpsc::Receiver<AudioChunk>> {
        let (mic, chunks) = MicCapture::open()?;
        self.mic = Some(mic);
        Ok(chunks)
    }

    fn open_playback(&mut self) -> Result<Self::Playback> {
        let (speaker, sink) = crate::playback::SpeakerOutput::open(self.max_buffer_secs)?;
        self.speaker = Some(speaker);
        Ok(sink)
    }

    fn close(&mut self) {
        self.mic = None;
        self.speaker = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_duration() {
        let chunk = AudioChunk {
            samples: vec![0.0; 24_000],
            sample_rate_hz: PLAYBACK_SAMPLE_RATE_HZ,
        };
        assert!((chunk.duration_secs() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn resampler_halves_rate() {
        let mut resampler = LinearResampler::new(32_000, 16_000);
        let input: Vec<f32> = (0..3200).map(|i| (i as f32 / 3200.0).sin()).collect();
        let mut out = Vec::new();
        let mut total = 0usize;
        for chunk in input.chunks(321) {
            resampler.process_into(chunk, &mut out);
            total += out.len();
        }
        // Half the input rate, minus edge samples held for interpolation.
        assert!(total >= 1595 && total <= 1600, "got {total}");
    }

    #[test]
    fn resampler_keeps_position_across_overshooting_chunks() {
        // 48 kHz down to 16 kHz decimates by 3; chunk lengths that are
        // not a multiple of 3 make the read position overshoot the
        // buffered input at every chunk boundary.
        let mut resampler = LinearResampler::new(48_000, 16_000);
        let input: Vec<f32> = (0..330).map(|i| i as f32).collect();
        let mut produced = Vec::new();
        let mut out = Vec::new();
        for chunk in input.chunks(11) {
            resampler.process_into(chunk, &mut out);
            produced.extend_from_slice(&out);
        }

        // A ramp decimated by 3 must stay on multiples of 3; any drift
        // in the carried position shifts the whole stream.
        assert!(produced.len() >= 100);
        for (k, sample) in produced.iter().enumerate() {
            let want = (3 * k) as f32;
            assert!(
                (sample - want).abs() < 1e-3,
                "output {k} should be {want}, got {sample}"
            );
        }
    }

    #[test]
    fn resampler_preserves_constant_signal() {
        let mut resampler = LinearResampler::new(48_000, 16_000);
        let mut out = Vec::new();
        resampler.process_into(&[0.5; 480], &mut out);
        assert!(!out.is_empty());
        assert!(out.iter().all(|&s| (s - 0.5).abs() < 1e-6));
    }
}

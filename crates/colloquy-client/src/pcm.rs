//! Conversion between device-native f32 samples and the 16-bit
//! little-endian PCM carried on the wire, plus the base64 transport
//! coding used to embed raw bytes in text frames.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::audio::AudioChunk;
use crate::error::{LiveError, Result};

pub const CAPTURE_MIME_TYPE: &str = "audio/pcm;rate=16000";

/// Base64 PCM payload plus its codec/rate tag.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireEnvelope {
    pub payload: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
}

/// Encode captured samples for the outbound media message.
///
/// Samples are scaled by 32768 and truncated to i16. Out-of-range input
/// wraps per fixed-width integer semantics rather than clamping, so a
/// full-scale 1.0 maps to -32768 exactly like the upstream protocol.
pub fn encode_outbound(samples: &[f32]) -> WireEnvelope {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let value = (sample * 32768.0) as i32 as i16;
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    WireEnvelope {
        payload: BASE64.encode(&bytes),
        mime_type: CAPTURE_MIME_TYPE.to_string(),
    }
}

/// Decode an inbound base64 PCM payload into a device-ready chunk.
///
/// Bytes are read as interleaved 16-bit little-endian frames and only the
/// first channel is kept. Trailing bytes that do not fill a whole frame
/// are dropped deterministically.
pub fn decode_inbound(payload: &str, sample_rate_hz: u32, channels: u16) -> Result<AudioChunk> {
    let bytes = BASE64
        .decode(payload)
        .map_err(|e| LiveError::Decode(e.to_string()))?;

    let frame_bytes = 2 * usize::from(channels.max(1));
    let usable = bytes.len() - bytes.len() % frame_bytes;

    let mut samples = Vec::with_capacity(usable / frame_bytes);
    for frame in bytes[..usable].chunks_exact(frame_bytes) {
        let value = i16::from_le_bytes([frame[0], frame[1]]);
        samples.push(f32::from(value) / 32768.0);
    }

    Ok(AudioChunk {
        samples,
        sample_rate_hz,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::PLAYBACK_SAMPLE_RATE_HZ;

    #[test]
    fn roundtrip_within_quantization_error() {
        let input = vec![-1.0f32, -0.5, -0.001, 0.0, 0.25, 0.5, 0.999];
        let envelope = encode_outbound(&input);
        let decoded = decode_inbound(&envelope.payload, 16_000, 1).expect("decode should succeed");

        assert_eq!(decoded.samples.len(), input.len());
        for (orig, got) in input.iter().zip(&decoded.samples) {
            assert!(
                (orig - got).abs() <= 1.0 / 32768.0,
                "{orig} decoded as {got}"
            );
        }
    }

    #[test]
    fn full_scale_positive_wraps() {
        let envelope = encode_outbound(&[1.0]);
        let decoded = decode_inbound(&envelope.payload, 16_000, 1).unwrap();
        assert_eq!(decoded.samples, vec![-1.0]);
    }

    #[test]
    fn outbound_mime_tag() {
        let envelope = encode_outbound(&[0.0; 4]);
        assert_eq!(envelope.mime_type, "audio/pcm;rate=16000");
    }

    #[test]
    fn trailing_partial_sample_is_dropped() {
        let payload = BASE64.encode([0x00u8, 0x40, 0x00, 0xc0, 0x7f]);
        let decoded = decode_inbound(&payload, PLAYBACK_SAMPLE_RATE_HZ, 1).unwrap();
        assert_eq!(decoded.samples.len(), 2);
        assert!((decoded.samples[0] - 0.5).abs() < 1e-6);
        assert!((decoded.samples[1] + 0.5).abs() < 1e-6);
    }

    #[test]
    fn multichannel_reads_first_channel() {
        // Two stereo frames: (0.5, -0.5) and (0.25, -0.25).
        let mut bytes = Vec::new();
        for value in [16384i16, -16384, 8192, -8192] {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        let decoded = decode_inbound(&BASE64.encode(&bytes), PLAYBACK_SAMPLE_RATE_HZ, 2).unwrap();
        assert_eq!(decoded.samples.len(), 2);
        assert!((decoded.samples[0] - 0.5).abs() < 1e-6);
        assert!((decoded.samples[1] - 0.25).abs() < 1e-6);
    }

    #[test]
    fn invalid_base64_is_decode_error() {
        let err = decode_inbound("not base64!!!", PLAYBACK_SAMPLE_RATE_HZ, 1).unwrap_err();
        assert!(matches!(err, LiveError::Decode(_)));
    }
}

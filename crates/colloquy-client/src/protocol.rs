//! JSON wire messages exchanged with the remote live-session endpoint,
//! and the typed event stream the session controller consumes.

use serde::{Deserialize, Serialize};

use crate::error::{LiveError, Result};
use crate::pcm::WireEnvelope;

/// Session open request, sent as the first frame after connecting.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSetup {
    pub response_modality: ResponseModality,
    pub voice: String,
    pub system_prompt: String,
    pub request_inbound_transcription: bool,
    pub request_outbound_transcription: bool,
}

#[derive(Clone, Copy, Debug, Serialize)]
pub enum ResponseModality {
    #[serde(rename = "AUDIO")]
    Audio,
}

/// Client -> server frames. Externally tagged, so a media message
/// serializes as `{"media":{"payload":...,"mimeType":...}}`.
#[derive(Clone, Debug, Serialize)]
pub enum ClientMessage {
    #[serde(rename = "setup")]
    Setup(SessionSetup),
    #[serde(rename = "media")]
    Media(WireEnvelope),
}

/// Server -> client frame: a bag of optional parts, any subset present.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerMessage {
    pub input_transcription: Option<TranscriptionFragment>,
    pub output_transcription: Option<TranscriptionFragment>,
    pub turn_complete: bool,
    pub audio: Option<WireEnvelope>,
    pub error: Option<ServerError>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TranscriptionFragment {
    pub text: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ServerError {
    pub message: String,
}

/// One typed inbound event, in dispatch order.
#[derive(Clone, Debug, PartialEq)]
pub enum ServerEvent {
    OutputTranscription(String),
    InputTranscription(String),
    TurnComplete,
    Audio(WireEnvelope),
    TransportError(String),
    Closed,
}

impl ServerMessage {
    /// Flatten one frame into events. Parts of a single frame dispatch
    /// in a fixed order: model transcript fragment, user transcript
    /// fragment, turn boundary, inline audio, then any error.
    pub fn into_events(self) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        if let Some(fragment) = self.output_transcription {
            events.push(ServerEvent::OutputTranscription(fragment.text));
        }
        if let Some(fragment) = self.input_transcription {
            events.push(ServerEvent::InputTranscription(fragment.text));
        }
        if self.turn_complete {
            events.push(ServerEvent::TurnComplete);
        }
        if let Some(envelope) = self.audio {
            events.push(ServerEvent::Audio(envelope));
        }
        if let Some(error) = self.error {
            events.push(ServerEvent::TransportError(error.message));
        }
        events
    }
}

pub fn parse_server_frame(text: &str) -> Result<Vec<ServerEvent>> {
    let message: ServerMessage =
        serde_json::from_str(text).map_err(|e| LiveError::Transport(e.to_string()))?;
    Ok(message.into_events())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn setup_frame_shape() {
        let setup = SessionSetup {
            response_modality: ResponseModality::Audio,
            voice: "Zephyr".to_string(),
            system_prompt: "be brief".to_string(),
            request_inbound_transcription: true,
            request_outbound_transcription: true,
        };
        let value = serde_json::to_value(ClientMessage::Setup(setup)).unwrap();
        assert_eq!(
            value,
            json!({
                "setup": {
                    "responseModality": "AUDIO",
                    "voice": "Zephyr",
                    "systemPrompt": "be brief",
                    "requestInboundTranscription": true,
                    "requestOutboundTranscription": true,
                }
            })
        );
    }

    #[test]
    fn media_frame_shape() {
        let envelope = WireEnvelope {
            payload: "AAAA".to_string(),
            mime_type: "audio/pcm;rate=16000".to_string(),
        };
        let value = serde_json::to_value(ClientMessage::Media(envelope)).unwrap();
        assert_eq!(
            value,
            json!({"media": {"payload": "AAAA", "mimeType": "audio/pcm;rate=16000"}})
        );
    }

    #[test]
    fn combined_frame_dispatch_order() {
        let events = parse_server_frame(
            r#"{
                "outputTranscription": {"text": "Hello"},
                "inputTranscription": {"text": "Hi"},
                "turnComplete": true,
                "audio": {"payload": "AAAA", "mimeType": "audio/pcm;rate=24000"}
            }"#,
        )
        .unwrap();

        assert_eq!(events.len(), 4);
        assert_eq!(events[0], ServerEvent::OutputTranscription("Hello".into()));
        assert_eq!(events[1], ServerEvent::InputTranscription("Hi".into()));
        assert_eq!(events[2], ServerEvent::TurnComplete);
        assert!(matches!(events[3], ServerEvent::Audio(_)));
    }

    #[test]
    fn empty_frame_yields_no_events() {
        assert!(parse_server_frame("{}").unwrap().is_empty());
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let events = parse_server_frame(r#"{"sessionId": "abc", "turnComplete": true}"#).unwrap();
        assert_eq!(events, vec![ServerEvent::TurnComplete]);
    }

    #[test]
    fn error_part_becomes_transport_error() {
        let events = parse_server_frame(r#"{"error": {"message": "quota"}}"#).unwrap();
        assert_eq!(events, vec![ServerEvent::TransportError("quota".into())]);
    }

    #[test]
    fn malformed_frame_is_transport_error() {
        assert!(parse_server_frame("not json").is_err());
    }
}

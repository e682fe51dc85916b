//! Client library for voice-driven live sessions: microphone capture,
//! the PCM wire codec, a websocket link to the remote service, and a
//! session controller that turns inbound events into transcript and
//! status updates plus gapless audio playback.

mod error;

pub mod audio;
pub mod pcm;
pub mod playback;
pub mod protocol;
pub mod session;
pub mod transcript;
pub mod ws;

pub use audio::{AudioBackend, AudioChunk};
#[cfg(feature = "audio")]
pub use audio::CpalBackend;
pub use error::{LiveError, Result};
pub use session::{SessionConfig, SessionController, SessionUpdate};
pub use transcript::{SessionStatus, Speaker, TranscriptEntry};

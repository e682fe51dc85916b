use thiserror::Error;

pub type Result<T> = std::result::Result<T, LiveError>;

#[derive(Debug, Error)]
pub enum LiveError {
    #[error("capture device unavailable: {0}")]
    Device(String),

    #[error("failed to open remote session: {0}")]
    RemoteOpen(String),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("malformed inbound audio: {0}")]
    Decode(String),
}

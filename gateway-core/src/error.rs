use thiserror::Error;

/// All errors produced by gateway-core.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("malformed event: {0}")]
    Codec(String),

    #[error("invalid event: {0}")]
    Validation(String),

    #[error("audio format error: {0}")]
    AudioFormat(String),

    #[error("session capacity exceeded")]
    Capacity,

    #[error("unknown session id: {0}")]
    UnknownSession(String),

    #[error("transcription request failed: {0}")]
    Transcription(String),

    #[error("transport write failed: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, GatewayError>;

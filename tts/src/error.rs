//! Error types for the TTS pipeline.

use thiserror::Error;

/// Result type alias for TTS operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for TTS operations.
///
/// Only `NotInitialized` is ever returned to callers of
/// [`TtsClient::speak`](crate::TtsClient::speak). Per-segment failures are
/// reported as [`Event::Error`](crate::Event::Error) on the event stream.
#[derive(Error, Debug)]
pub enum Error {
    /// The client has not been initialized, or was shut down.
    #[error("tts client is not initialized")]
    NotInitialized,

    /// The synthesis service returned no audio for the segment.
    #[error("no audio data received")]
    NoAudioData,

    /// Error status returned by the synthesis service.
    #[error("synthesis service: {message} (status={status})")]
    Api { status: u16, message: String },

    /// HTTP transport error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The audio sink failed to play a segment.
    #[error("playback failed: {0}")]
    Playback(String),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Creates a new API error.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Error::Api {
            status,
            message: message.into(),
        }
    }

    /// Returns true if the service produced an empty result.
    pub fn is_no_audio(&self) -> bool {
        matches!(self, Error::NoAudioData)
    }

    /// Returns true if this is a rate limit error.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Error::Api { status: 429, .. })
    }

    /// Returns true if this is a server-side error.
    pub fn is_server_error(&self) -> bool {
        matches!(self, Error::Api { status, .. } if *status >= 500)
    }

    /// Returns true if the request can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Http(e) => e.is_timeout() || e.is_connect(),
            _ => self.is_rate_limit() || self.is_server_error(),
        }
    }
}

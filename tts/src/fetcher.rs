//! Audio fetching interface.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Default MIME type of synthesized audio.
pub const DEFAULT_MIME_TYPE: &str = "audio/mpeg";

/// Parameters of one synthesis call.
///
/// `rate` and `pitch` are multipliers, nominally within [0.5, 2.0] and
/// [0.5, 1.5]. They are sent to the service unclamped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisRequest {
    /// Language tag of the text.
    pub lang: String,
    /// Text to synthesize.
    pub text: String,
    /// Voice identifier.
    pub voice: String,
    /// Speaking rate multiplier.
    pub rate: f64,
    /// Pitch multiplier.
    pub pitch: f64,
}

/// A playable audio resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Audio {
    /// Encoded audio bytes.
    pub data: Bytes,
    /// MIME type of `data`.
    pub mime_type: String,
}

impl Audio {
    /// Creates an audio resource.
    pub fn new(data: impl Into<Bytes>, mime_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            mime_type: mime_type.into(),
        }
    }

    /// Returns the number of encoded bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if there is no audio.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns a file extension matching the MIME type.
    pub fn extension(&self) -> &'static str {
        let mime = self.mime_type.split(';').next().unwrap_or_default().trim();
        match mime {
            "audio/mpeg" | "audio/mp3" => "mp3",
            "audio/wav" | "audio/x-wav" | "audio/wave" => "wav",
            "audio/ogg" | "audio/opus" => "ogg",
            "audio/webm" => "webm",
            "audio/flac" => "flac",
            "audio/pcm" | "audio/l16" => "pcm",
            _ => "bin",
        }
    }
}

/// Produces audio for a piece of text.
///
/// Implementations must return [`Error::NoAudioData`](crate::Error::NoAudioData)
/// when the service answers with an empty result, and a distinct error for
/// every other failure. Nothing is cached between calls.
#[async_trait]
pub trait AudioFetcher: Send + Sync {
    /// Synthesizes the request.
    async fn fetch_audio(&self, request: &SynthesisRequest) -> Result<Audio>;
}

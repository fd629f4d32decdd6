//! Text-to-speech playback for multilingual reading.
//!
//! This crate provides:
//! - [`Segmenter`]: splits SSML into per-language [`Segment`]s
//! - [`VoiceResolver`] and [`PreferredVoices`]: voice selection per language
//! - [`AudioFetcher`] and [`HttpFetcher`]: audio synthesis
//! - [`AudioSink`] and [`FileSink`]: audio output
//! - [`TtsClient`]: sequenced playback with boundary/end/error [`Event`]s
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use lingua_tts::{HttpFetcher, TtsClient};
//!
//! let fetcher = HttpFetcher::builder("https://tts.example.com").api_key(key).build()?;
//! let client = TtsClient::builder(Arc::new(fetcher)).build();
//! if client.init().await {
//!     let mut events = client.speak(r#"<speak><lang xml:lang="de-DE">Guten Tag</lang></speak>"#)?;
//!     while let Some(event) = events.recv().await {
//!         println!("{} {:?}", event.code(), event.mark());
//!     }
//! }
//! ```

mod client;
mod error;
mod event;
mod fetcher;
pub mod http;
mod prefs;
mod sequencer;
mod sink;
pub mod ssml;
mod voice;

pub use client::{EventStream, TtsClient, TtsClientBuilder, DEFAULT_CLIENT_NAME, DEFAULT_PRIMARY_LANG};
pub use error::{Error, Result};
pub use event::{ErrorKind, Event};
pub use fetcher::{Audio, AudioFetcher, SynthesisRequest, DEFAULT_MIME_TYPE};
pub use http::{HttpFetcher, HttpFetcherBuilder};
pub use prefs::PreferredVoices;
pub use sequencer::{State, Status};
pub use sink::{AudioSink, FileSink, NullSink, Playback, DEFAULT_BYTES_PER_SECOND};
pub use ssml::{Segment, Segmenter, DEFAULT_MAX_SEGMENT_CHARS};
pub use voice::{
    builtin_voices, language_of_voice, primary_subtag, resolve_voice, sort_voices,
    voices_for_lang, Voice, VoiceResolver, DEFAULT_VOICE_ID,
};

#[cfg(test)]
mod tests;

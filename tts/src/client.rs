//! TTS client facade.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::event::Event;
use crate::fetcher::{AudioFetcher, SynthesisRequest};
use crate::prefs::PreferredVoices;
use crate::sequencer::{Command, Sequencer, SharedSink, Status};
use crate::sink::{AudioSink, FileSink};
use crate::ssml::{is_ssml, wrap_plain, Segmenter, DEFAULT_MAX_SEGMENT_CHARS};
use crate::voice::{builtin_voices, voices_for_lang, Voice, VoiceResolver, DEFAULT_VOICE_ID};

/// Default client name, used as key in the preferred-voice cache.
pub const DEFAULT_CLIENT_NAME: &str = "edge-tts";

/// Default primary language.
pub const DEFAULT_PRIMARY_LANG: &str = "en";

/// Events of one utterance, in playback order.
///
/// The stream ends after the last segment, after an `Error` event, or when
/// the utterance is superseded.
pub struct EventStream {
    rx: mpsc::Receiver<Event>,
}

impl EventStream {
    fn new(rx: mpsc::Receiver<Event>) -> Self {
        Self { rx }
    }

    /// Receives the next event. Returns `None` when the utterance is over.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }
}

impl Stream for EventStream {
    type Item = Event;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Event>> {
        self.rx.poll_recv(cx)
    }
}

struct ActiveSession {
    cancel: CancellationToken,
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

struct Inner {
    initialized: bool,
    /// Catalog installed by `init`.
    available: Arc<Vec<Voice>>,
    /// Installed catalog; empty until initialized.
    catalog: Arc<Vec<Voice>>,
    voice_id: String,
    primary_lang: String,
    rate: f64,
    pitch: f64,
    session: Option<ActiveSession>,
}

/// Speaks SSML or plain text through a fetcher and a sink.
///
/// The client must be initialized with [`init`](Self::init) before use.
/// Starting a new utterance cancels the one in progress.
///
/// ```ignore
/// let client = TtsClient::builder(Arc::new(HttpFetcher::new(url)?)).build();
/// client.init().await;
/// let mut events = client.speak("Hello")?;
/// while let Some(event) = events.recv().await {
///     println!("{}: {}", event.code(), event.message());
/// }
/// ```
pub struct TtsClient {
    name: String,
    fetcher: Arc<dyn AudioFetcher>,
    sink: SharedSink,
    prefs: Arc<PreferredVoices>,
    segmenter: Segmenter,
    status: Arc<watch::Sender<Status>>,
    inner: Mutex<Inner>,
}

impl TtsClient {
    /// Creates a builder.
    pub fn builder(fetcher: Arc<dyn AudioFetcher>) -> TtsClientBuilder {
        TtsClientBuilder::new(fetcher)
    }

    /// Returns the client name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Checks that the synthesis service is reachable and installs the voice
    /// catalog. Returns whether the client is usable.
    pub async fn init(&self) -> bool {
        let request = {
            let inner = self.inner.lock();
            if inner.initialized {
                return true;
            }
            SynthesisRequest {
                lang: "en".to_string(),
                text: "test".to_string(),
                voice: DEFAULT_VOICE_ID.to_string(),
                rate: inner.rate,
                pitch: inner.pitch,
            }
        };

        if let Err(e) = self.fetcher.fetch_audio(&request).await {
            error!(client = %self.name, error = %e, "tts: init failed");
            return false;
        }

        let mut inner = self.inner.lock();
        inner.catalog = inner.available.clone();
        let resolver = VoiceResolver::new(&self.name, inner.catalog.clone(), self.prefs.clone());
        inner.voice_id = resolver.resolve(&inner.primary_lang);
        inner.initialized = true;
        info!(
            client = %self.name,
            voices = inner.catalog.len(),
            voice = %inner.voice_id,
            "tts: initialized"
        );
        true
    }

    /// Returns true once [`init`](Self::init) succeeded and until shutdown.
    pub fn is_initialized(&self) -> bool {
        self.inner.lock().initialized
    }

    /// Returns every known voice. Voices are marked disabled while the
    /// client is not initialized.
    pub fn all_voices(&self) -> Vec<Voice> {
        let inner = self.inner.lock();
        if inner.initialized {
            return inner.catalog.to_vec();
        }
        inner
            .available
            .iter()
            .cloned()
            .map(|mut v| {
                v.disabled = true;
                v
            })
            .collect()
    }

    /// Returns the voices able to speak `lang`.
    pub fn voices(&self, lang: &str) -> Vec<Voice> {
        voices_for_lang(&self.all_voices(), lang)
    }

    /// Selects the voice `id` for its language and remembers the choice.
    /// Returns false for unknown or disabled voices.
    pub fn set_voice(&self, id: &str) -> bool {
        let mut inner = self.inner.lock();
        let Some(voice) = inner
            .catalog
            .iter()
            .find(|v| v.id == id && !v.disabled)
            .cloned()
        else {
            debug!(voice = %id, "tts: unknown voice");
            return false;
        };

        inner.voice_id = voice.id.clone();
        drop(inner);
        self.prefs.set(&self.name, &voice.lang, &voice.id);
        true
    }

    /// Returns the voice currently speaking, or the selected voice when idle.
    pub fn voice_id(&self) -> String {
        if let Some(voice) = self.status.borrow().voice.clone() {
            return voice;
        }
        let inner = self.inner.lock();
        if inner.voice_id.is_empty() {
            DEFAULT_VOICE_ID.to_string()
        } else {
            inner.voice_id.clone()
        }
    }

    /// Returns the language currently spoken, or the primary language when
    /// idle.
    pub fn speaking_lang(&self) -> String {
        if let Some(lang) = self.status.borrow().lang.clone() {
            return lang;
        }
        self.inner.lock().primary_lang.clone()
    }

    /// Sets the language of plain text and unlabelled SSML.
    pub fn set_primary_lang(&self, lang: impl Into<String>) {
        self.inner.lock().primary_lang = lang.into();
    }

    /// Sets the speaking rate for subsequent utterances.
    pub fn set_rate(&self, rate: f64) {
        self.inner.lock().rate = rate;
    }

    /// Sets the pitch for subsequent utterances.
    pub fn set_pitch(&self, pitch: f64) {
        self.inner.lock().pitch = pitch;
    }

    /// Returns the current pipeline status.
    pub fn status(&self) -> Status {
        self.status.borrow().clone()
    }

    /// Subscribes to pipeline status changes.
    pub fn subscribe(&self) -> watch::Receiver<Status> {
        self.status.subscribe()
    }

    /// Starts speaking `input`, which is either an SSML document or plain
    /// text in the primary language.
    ///
    /// Any utterance in progress is aborted first, and its event stream ends
    /// before the new one begins. Input without speakable text only aborts
    /// and yields an empty stream. Must be called within a tokio runtime.
    pub fn speak(&self, input: &str) -> Result<EventStream> {
        let mut inner = self.inner.lock();
        if !inner.initialized {
            return Err(Error::NotInitialized);
        }

        let markup = if is_ssml(input) {
            input.to_string()
        } else {
            wrap_plain(input, &inner.primary_lang)
        };
        let segments = self.segmenter.segment(&markup, &inner.primary_lang);
        if segments.is_empty() {
            debug!("tts: nothing to speak");
            if let Some(session) = &inner.session {
                session.cancel.cancel();
            }
            let (_, rx) = mpsc::channel(1);
            return Ok(EventStream::new(rx));
        }

        let previous = inner.session.take().map(|previous| {
            previous.cancel.cancel();
            previous.task
        });

        let cancel = CancellationToken::new();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        // Two events per segment plus a terminal error never block the sender.
        let (event_tx, event_rx) = mpsc::channel(segments.len() * 2 + 1);

        let sequencer = Sequencer {
            fetcher: self.fetcher.clone(),
            sink: self.sink.clone(),
            resolver: VoiceResolver::new(&self.name, inner.catalog.clone(), self.prefs.clone()),
            rate: inner.rate,
            pitch: inner.pitch,
            status: self.status.clone(),
        };
        let session_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            // The superseded session tears down before this one takes the sink.
            if let Some(previous) = previous {
                if let Err(e) = previous.await {
                    warn!(error = %e, "tts: session task failed");
                }
            }
            sequencer
                .run(segments, session_cancel, command_rx, event_tx)
                .await;
        });
        inner.session = Some(ActiveSession {
            cancel,
            commands: command_tx,
            task,
        });

        Ok(EventStream::new(event_rx))
    }

    /// Pauses the current segment. No-op when nothing is playing.
    pub fn pause(&self) {
        self.send(Command::Pause);
    }

    /// Resumes a paused segment. No-op when nothing is paused.
    pub fn resume(&self) {
        self.send(Command::Resume);
    }

    /// Aborts the current utterance. Idempotent.
    pub fn stop(&self) {
        if let Some(session) = &self.inner.lock().session {
            session.cancel.cancel();
        }
    }

    /// Stops playback, waits for the session to wind down, releases the
    /// sink and forgets the voice catalog. The client must be initialized
    /// again before it can speak.
    pub async fn shutdown(&self) {
        let session = self.inner.lock().session.take();
        if let Some(session) = session {
            session.cancel.cancel();
            if let Err(e) = session.task.await {
                warn!(error = %e, "tts: session task failed");
            }
        }
        self.sink.lock().await.stop();

        let mut inner = self.inner.lock();
        inner.initialized = false;
        inner.catalog = Arc::new(Vec::new());
        inner.available = Arc::new(Vec::new());
        info!(client = %self.name, "tts: shut down");
    }

    fn send(&self, command: Command) {
        if let Some(session) = &self.inner.lock().session {
            // The session may already be over.
            let _ = session.commands.send(command);
        }
    }
}

impl Drop for TtsClient {
    fn drop(&mut self) {
        if let Some(session) = self.inner.get_mut().session.take() {
            session.cancel.cancel();
        }
    }
}

/// Builder for [`TtsClient`].
pub struct TtsClientBuilder {
    fetcher: Arc<dyn AudioFetcher>,
    name: String,
    catalog: Vec<Voice>,
    prefs: Option<Arc<PreferredVoices>>,
    sink: Option<Box<dyn AudioSink>>,
    primary_lang: String,
    rate: f64,
    pitch: f64,
    max_segment_chars: usize,
}

impl TtsClientBuilder {
    /// Creates a new builder.
    pub fn new(fetcher: Arc<dyn AudioFetcher>) -> Self {
        Self {
            fetcher,
            name: DEFAULT_CLIENT_NAME.to_string(),
            catalog: builtin_voices(),
            prefs: None,
            sink: None,
            primary_lang: DEFAULT_PRIMARY_LANG.to_string(),
            rate: 1.0,
            pitch: 1.0,
            max_segment_chars: DEFAULT_MAX_SEGMENT_CHARS,
        }
    }

    /// Sets the client name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Replaces the voice catalog.
    pub fn catalog(mut self, voices: Vec<Voice>) -> Self {
        self.catalog = voices;
        self
    }

    /// Sets the preferred-voice cache. Defaults to an in-memory cache.
    pub fn preferred_voices(mut self, prefs: Arc<PreferredVoices>) -> Self {
        self.prefs = Some(prefs);
        self
    }

    /// Sets the audio sink. Defaults to a sink that discards audio.
    pub fn sink(mut self, sink: impl AudioSink + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    /// Sets the language of plain text and unlabelled SSML.
    pub fn primary_lang(mut self, lang: impl Into<String>) -> Self {
        self.primary_lang = lang.into();
        self
    }

    /// Sets the speaking rate.
    pub fn rate(mut self, rate: f64) -> Self {
        self.rate = rate;
        self
    }

    /// Sets the pitch.
    pub fn pitch(mut self, pitch: f64) -> Self {
        self.pitch = pitch;
        self
    }

    /// Sets the maximum number of characters per segment.
    pub fn max_segment_chars(mut self, max: usize) -> Self {
        self.max_segment_chars = max;
        self
    }

    /// Builds the client. It is not usable until initialized.
    pub fn build(self) -> TtsClient {
        let sink: Box<dyn AudioSink> = self.sink.unwrap_or_else(|| Box::new(FileSink::discard()));
        let (status, _) = watch::channel(Status::default());

        TtsClient {
            name: self.name,
            fetcher: self.fetcher,
            sink: Arc::new(tokio::sync::Mutex::new(sink)),
            prefs: self
                .prefs
                .unwrap_or_else(|| Arc::new(PreferredVoices::in_memory())),
            segmenter: Segmenter::new(self.max_segment_chars),
            status: Arc::new(status),
            inner: Mutex::new(Inner {
                initialized: false,
                available: Arc::new(self.catalog),
                catalog: Arc::new(Vec::new()),
                voice_id: String::new(),
                primary_lang: self.primary_lang,
                rate: self.rate,
                pitch: self.pitch,
                session: None,
            }),
        }
    }
}

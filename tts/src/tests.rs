//! Playback pipeline tests.

use super::*;
use async_trait::async_trait;
use futures::{FutureExt, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Mock Implementations
// ============================================================================

/// Synthesizes `"<voice>:<text>"` as audio.
///
/// Text containing `[silent]` yields no audio, `[offline]` fails like a
/// network error.
#[derive(Default)]
struct MockFetcher {
    requests: Mutex<Vec<SynthesisRequest>>,
    fail_init: bool,
    delay: Duration,
}

impl MockFetcher {
    fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    /// Requests made after the init smoke test.
    fn spoken(&self) -> Vec<SynthesisRequest> {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.text != "test")
            .cloned()
            .collect()
    }
}

#[async_trait]
impl AudioFetcher for MockFetcher {
    async fn fetch_audio(&self, request: &SynthesisRequest) -> Result<Audio> {
        self.requests.lock().push(request.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if request.text == "test" && self.fail_init {
            return Err(Error::api(503, "service unavailable"));
        }
        if request.text.contains("[silent]") {
            return Err(Error::NoAudioData);
        }
        if request.text.contains("[offline]") {
            return Err(Error::Other("network unreachable".to_string()));
        }
        Ok(Audio::new(
            format!("{}:{}", request.voice, request.text).into_bytes(),
            "audio/mpeg",
        ))
    }
}

/// Records sink operations. Audio containing `[broken]` fails to play.
struct MockSink {
    log: Arc<Mutex<Vec<String>>>,
    inner: FileSink,
}

impl MockSink {
    fn new() -> (Self, Arc<Mutex<Vec<String>>>) {
        Self::paced(0)
    }

    fn paced(bytes_per_second: u64) -> (Self, Arc<Mutex<Vec<String>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Self {
            log: log.clone(),
            inner: FileSink::discard().paced(bytes_per_second),
        };
        (sink, log)
    }
}

impl AudioSink for MockSink {
    fn play(&mut self, audio: Audio) -> Result<Playback> {
        let text = String::from_utf8_lossy(&audio.data).to_string();
        self.log.lock().push(format!("play {text}"));
        if text.contains("[broken]") {
            return Ok(Playback::finished(Err(Error::Playback(
                "device lost".to_string(),
            ))));
        }
        self.inner.play(audio)
    }

    fn pause(&mut self) -> Option<Duration> {
        self.log.lock().push("pause".to_string());
        self.inner.pause()
    }

    fn resume(&mut self, offset: Duration) -> Result<()> {
        self.log.lock().push(format!("resume {}ms", offset.as_millis()));
        self.inner.resume(offset)
    }

    fn stop(&mut self) {
        self.log.lock().push("stop".to_string());
        self.inner.stop();
    }
}

// ============================================================================
// Helpers
// ============================================================================

async fn ready_client(
    fetcher: Arc<MockFetcher>,
    sink: MockSink,
) -> TtsClient {
    let client = TtsClient::builder(fetcher).sink(sink).build();
    assert!(client.init().await);
    client
}

async fn collect(mut events: EventStream) -> Vec<Event> {
    let mut out = Vec::new();
    while let Some(event) = events.recv().await {
        out.push(event);
    }
    out
}

fn summary(events: &[Event]) -> Vec<String> {
    events
        .iter()
        .map(|e| format!("{} {}", e.code(), e.mark().unwrap_or("-")))
        .collect()
}

fn plays(log: &Mutex<Vec<String>>) -> Vec<String> {
    log.lock()
        .iter()
        .filter(|op| op.starts_with("play "))
        .cloned()
        .collect()
}

const BILINGUAL: &str = r#"<speak version="1.0" xml:lang="en-US">Hello there. <lang xml:lang="de-DE">Guten Tag.</lang></speak>"#;

// ============================================================================
// Utterances
// ============================================================================

#[tokio::test]
async fn test_bilingual_utterance() {
    let fetcher = Arc::new(MockFetcher::default());
    let (sink, log) = MockSink::new();
    let client = ready_client(fetcher.clone(), sink).await;

    let events = collect(client.speak(BILINGUAL).unwrap()).await;
    assert_eq!(
        summary(&events),
        vec!["boundary seg-0", "end seg-0", "boundary seg-1", "end seg-1"]
    );
    assert_eq!(events[0].message(), "Start chunk: seg-0");
    assert_eq!(events[3].message(), "Chunk finished: seg-1");

    let requests = fetcher.spoken();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].lang, "en-US");
    assert_eq!(requests[0].voice, "en-US-AriaNeural");
    assert_eq!(requests[0].text, "Hello there.");
    assert_eq!(requests[1].lang, "de-DE");
    assert!(requests[1].voice.starts_with("de-DE-"));

    assert_eq!(
        plays(&log),
        vec![
            "play en-US-AriaNeural:Hello there.".to_string(),
            format!("play {}:Guten Tag.", requests[1].voice),
        ]
    );
    assert_eq!(client.status().state, State::Idle);
}

#[tokio::test]
async fn test_empty_audio_is_skipped() {
    let fetcher = Arc::new(MockFetcher::default());
    let (sink, log) = MockSink::new();
    let client = ready_client(fetcher.clone(), sink).await;

    let ssml = r#"<speak xml:lang="en-US"><mark name="a"/>One. <mark name="b"/>[silent] <mark name="c"/>Three.</speak>"#;
    let events = collect(client.speak(ssml).unwrap()).await;

    assert_eq!(
        summary(&events),
        vec!["boundary a", "end a", "boundary b", "end b", "boundary c", "end c"]
    );
    assert!(matches!(&events[3], Event::End { skipped: true, .. }));
    assert!(matches!(&events[5], Event::End { skipped: false, .. }));
    assert_eq!(plays(&log).len(), 2);
}

#[tokio::test]
async fn test_fetch_failure_ends_utterance() {
    let fetcher = Arc::new(MockFetcher::default());
    let (sink, log) = MockSink::new();
    let client = ready_client(fetcher.clone(), sink).await;

    let ssml = r#"<speak xml:lang="en-US"><mark name="a"/>[offline] <mark name="b"/>Two. <mark name="c"/>Three.</speak>"#;
    let events = collect(client.speak(ssml).unwrap()).await;

    assert_eq!(summary(&events), vec!["boundary a", "error a"]);
    match &events[1] {
        Event::Error { kind, message, .. } => {
            assert_eq!(*kind, ErrorKind::FetchFailed);
            assert!(message.contains("network unreachable"));
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert_eq!(fetcher.spoken().len(), 1);
    assert!(plays(&log).is_empty());
    assert_eq!(log.lock().last().map(String::as_str), Some("stop"));
}

#[tokio::test]
async fn test_playback_failure_ends_utterance() {
    let fetcher = Arc::new(MockFetcher::default());
    let (sink, _log) = MockSink::new();
    let client = ready_client(fetcher.clone(), sink).await;

    let ssml = r#"<speak xml:lang="en-US"><mark name="a"/>[broken] <mark name="b"/>Two.</speak>"#;
    let events = collect(client.speak(ssml).unwrap()).await;

    assert_eq!(summary(&events), vec!["boundary a", "error a"]);
    assert!(events[1].is_failure());
    assert!(matches!(
        &events[1],
        Event::Error { kind: ErrorKind::PlaybackFailed, .. }
    ));
    assert_eq!(fetcher.spoken().len(), 1);
}

#[tokio::test]
async fn test_plain_text_uses_primary_language() {
    let fetcher = Arc::new(MockFetcher::default());
    let (sink, _log) = MockSink::new();
    let client = TtsClient::builder(fetcher.clone())
        .sink(sink)
        .primary_lang("fr-FR")
        .rate(1.25)
        .pitch(0.9)
        .build();
    assert!(client.init().await);

    let events = collect(client.speak("Bonjour & bienvenue").unwrap()).await;
    assert_eq!(summary(&events), vec!["boundary seg-0", "end seg-0"]);

    let requests = fetcher.spoken();
    assert_eq!(requests[0].text, "Bonjour & bienvenue");
    assert_eq!(requests[0].lang, "fr-FR");
    assert!(requests[0].voice.starts_with("fr-FR-"));
    assert_eq!(requests[0].rate, 1.25);
    assert_eq!(requests[0].pitch, 0.9);
}

#[tokio::test]
async fn test_event_stream_is_a_stream() {
    let fetcher = Arc::new(MockFetcher::default());
    let (sink, _log) = MockSink::new();
    let client = ready_client(fetcher, sink).await;

    let events: Vec<Event> = client.speak(BILINGUAL).unwrap().collect().await;
    assert_eq!(events.len(), 4);
    assert!(events.iter().all(|e| !e.is_terminal()));
}

#[tokio::test]
async fn test_empty_input_yields_no_events() {
    let fetcher = Arc::new(MockFetcher::default());
    let (sink, log) = MockSink::new();
    let client = ready_client(fetcher.clone(), sink).await;

    assert!(collect(client.speak("").unwrap()).await.is_empty());
    assert!(collect(client.speak("  \n ").unwrap()).await.is_empty());
    assert!(collect(client.speak(r#"<speak xml:lang="en"> </speak>"#).unwrap())
        .await
        .is_empty());

    assert!(fetcher.spoken().is_empty());
    assert!(log.lock().is_empty());
}

// ============================================================================
// Session control
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_new_utterance_aborts_previous() {
    let fetcher = Arc::new(MockFetcher::slow(Duration::from_millis(100)));
    let (sink, log) = MockSink::new();
    let client = ready_client(fetcher.clone(), sink).await;

    let first = client.speak(BILINGUAL).unwrap();
    let mut status = client.subscribe();
    status
        .wait_for(|s| s.state == State::WaitingForAudio)
        .await
        .unwrap();

    let second = client.speak(r#"<speak xml:lang="it-IT">Ciao.</speak>"#).unwrap();

    let first = collect(first).await;
    assert_eq!(summary(&first), vec!["boundary seg-0", "error seg-0"]);
    assert!(first[1].is_aborted());
    assert_eq!(first[1].message(), "Aborted");

    let second = collect(second).await;
    assert_eq!(summary(&second), vec!["boundary seg-0", "end seg-0"]);

    // The aborted fetch never reaches the sink.
    let played = plays(&log);
    assert_eq!(played.len(), 1);
    assert!(played[0].contains("Ciao."));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_superseded_stream_ends_before_next_begins() {
    let fetcher = Arc::new(MockFetcher::slow(Duration::from_millis(50)));
    let (sink, log) = MockSink::new();
    let client = Arc::new(ready_client(fetcher, sink).await);

    let speaker = client.clone();
    let (mut first, mut second) = tokio::spawn(async move {
        let first = speaker.speak(BILINGUAL).unwrap();
        let second = speaker
            .speak(r#"<speak xml:lang="it-IT">Ciao.</speak>"#)
            .unwrap();
        (first, second)
    })
    .await
    .unwrap();

    assert_eq!(second.recv().await.unwrap().code(), "boundary");

    // The first stream is already closed once the second one has begun.
    let mut earlier = Vec::new();
    loop {
        match first.recv().now_or_never() {
            Some(Some(event)) => earlier.push(event),
            Some(None) => break,
            None => panic!("first stream still open after the next utterance began"),
        }
    }
    assert!(earlier.last().unwrap().is_aborted());
    assert!(earlier.iter().all(|e| e.code() != "end"));

    assert_eq!(summary(&collect(second).await), vec!["end seg-0"]);

    // The first session released the sink before the second played.
    assert_eq!(log.lock().first().map(String::as_str), Some("stop"));
    let played = plays(&log);
    assert_eq!(played.len(), 1);
    assert!(played[0].contains("Ciao."));
    assert_eq!(client.status().state, State::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_empty_input_aborts_current_utterance() {
    let fetcher = Arc::new(MockFetcher::slow(Duration::from_millis(100)));
    let (sink, log) = MockSink::new();
    let client = ready_client(fetcher.clone(), sink).await;

    let first = client.speak(BILINGUAL).unwrap();
    let mut status = client.subscribe();
    status
        .wait_for(|s| s.state == State::WaitingForAudio)
        .await
        .unwrap();

    assert!(collect(client.speak(" ").unwrap()).await.is_empty());

    let first = collect(first).await;
    assert_eq!(summary(&first), vec!["boundary seg-0", "error seg-0"]);
    assert!(first[1].is_aborted());

    // Nothing is fetched for the empty input and nothing plays.
    assert!(fetcher.spoken().iter().all(|r| r.text == "Hello there."));
    assert!(plays(&log).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_stop_aborts_and_is_idempotent() {
    let fetcher = Arc::new(MockFetcher::default());
    let (sink, log) = MockSink::paced(10);
    let client = ready_client(fetcher, sink).await;

    // Stopping with nothing to stop is harmless.
    client.stop();

    let mut events = client.speak(BILINGUAL).unwrap();
    assert_eq!(events.recv().await.unwrap().code(), "boundary");
    let mut status = client.subscribe();
    status
        .wait_for(|s| s.state == State::PlayingSegment)
        .await
        .unwrap();

    client.stop();
    client.stop();

    let rest = collect(events).await;
    assert_eq!(summary(&rest), vec!["error seg-0"]);
    assert!(rest[0].is_aborted());
    assert_eq!(plays(&log).len(), 1);
    assert_eq!(log.lock().last().map(String::as_str), Some("stop"));

    client.stop();
    client.pause();
    client.resume();
}

#[tokio::test(start_paused = true)]
async fn test_pause_and_resume() {
    let fetcher = Arc::new(MockFetcher::default());
    // "en-US-AriaNeural:Hello there." is 29 bytes: 2.9s of audio.
    let (sink, log) = MockSink::paced(10);
    let client = ready_client(fetcher, sink).await;

    let mut events = client
        .speak(r#"<speak xml:lang="en-US">Hello there.</speak>"#)
        .unwrap();
    assert_eq!(events.recv().await.unwrap().code(), "boundary");

    let mut status = client.subscribe();
    status
        .wait_for(|s| s.state == State::PlayingSegment && s.is_playing)
        .await
        .unwrap();
    assert_eq!(client.voice_id(), "en-US-AriaNeural");
    assert_eq!(client.speaking_lang(), "en-US");

    tokio::time::sleep(Duration::from_secs(1)).await;
    client.pause();
    status.wait_for(|s| !s.is_playing).await.unwrap();

    // Nothing happens while paused.
    let waited = tokio::time::timeout(Duration::from_secs(30), events.recv()).await;
    assert!(waited.is_err());

    // A second pause is ignored.
    client.pause();
    client.resume();
    status.wait_for(|s| s.is_playing).await.unwrap();

    let end = events.recv().await.unwrap();
    assert_eq!(end.code(), "end");
    assert!(events.recv().await.is_none());

    let ops = log.lock().clone();
    assert_eq!(ops.iter().filter(|op| *op == "pause").count(), 1);
    assert!(ops.contains(&"resume 1000ms".to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_commands_while_fetching_are_ignored() {
    let fetcher = Arc::new(MockFetcher::slow(Duration::from_secs(1)));
    let (sink, log) = MockSink::new();
    let client = ready_client(fetcher, sink).await;

    let events = client
        .speak(r#"<speak xml:lang="en-US">Hello there.</speak>"#)
        .unwrap();
    let mut status = client.subscribe();
    status
        .wait_for(|s| s.state == State::WaitingForAudio)
        .await
        .unwrap();

    client.pause();
    let events = collect(events).await;
    assert_eq!(summary(&events), vec!["boundary seg-0", "end seg-0"]);
    assert!(!log.lock().iter().any(|op| op == "pause"));
}

#[tokio::test]
async fn test_dropped_stream_abandons_session() {
    let fetcher = Arc::new(MockFetcher::default());
    let (sink, log) = MockSink::new();
    let client = ready_client(fetcher.clone(), sink).await;

    drop(client.speak(BILINGUAL).unwrap());
    // Shutdown waits for the session to release the sink.
    client.shutdown().await;

    assert!(fetcher.spoken().is_empty());
    assert!(plays(&log).is_empty());
    assert_eq!(client.status().state, State::Idle);
}

// ============================================================================
// Lifecycle and voices
// ============================================================================

#[tokio::test]
async fn test_speak_requires_init() {
    let fetcher = Arc::new(MockFetcher::default());
    let client = TtsClient::builder(fetcher.clone()).build();

    assert!(!client.is_initialized());
    assert!(matches!(client.speak("Hello"), Err(Error::NotInitialized)));

    let voices = client.all_voices();
    assert!(!voices.is_empty());
    assert!(voices.iter().all(|v| v.disabled));

    assert!(client.init().await);
    assert!(client.init().await);
    assert_eq!(fetcher.requests.lock().len(), 1);
    assert!(client.all_voices().iter().all(|v| !v.disabled));

    let smoke = fetcher.requests.lock()[0].clone();
    assert_eq!(smoke.lang, "en");
    assert_eq!(smoke.text, "test");
    assert_eq!(smoke.voice, DEFAULT_VOICE_ID);
}

#[tokio::test]
async fn test_failed_init_leaves_client_unusable() {
    let fetcher = Arc::new(MockFetcher {
        fail_init: true,
        ..MockFetcher::default()
    });
    let client = TtsClient::builder(fetcher).build();

    assert!(!client.init().await);
    assert!(!client.is_initialized());
    assert!(matches!(client.speak("Hello"), Err(Error::NotInitialized)));
    assert!(!client.set_voice("en-US-GuyNeural"));
    assert!(client.voices("en").iter().all(|v| v.disabled));
}

#[tokio::test]
async fn test_shutdown() {
    let fetcher = Arc::new(MockFetcher::default());
    let (sink, log) = MockSink::new();
    let client = ready_client(fetcher, sink).await;

    client.shutdown().await;
    assert!(!client.is_initialized());
    assert!(client.all_voices().is_empty());
    assert!(matches!(client.speak("Hello"), Err(Error::NotInitialized)));
    assert_eq!(log.lock().last().map(String::as_str), Some("stop"));

    client.stop();
    client.shutdown().await;
}

#[tokio::test]
async fn test_set_voice_is_remembered() {
    let fetcher = Arc::new(MockFetcher::default());
    let (sink, _log) = MockSink::new();
    let prefs = Arc::new(PreferredVoices::in_memory());
    let client = TtsClient::builder(fetcher.clone())
        .sink(sink)
        .preferred_voices(prefs.clone())
        .build();
    assert!(client.init().await);

    assert!(!client.set_voice("xx-XX-NobodyNeural"));
    assert!(client.set_voice("de-DE-KatjaNeural"));
    assert_eq!(client.voice_id(), "de-DE-KatjaNeural");
    assert_eq!(
        prefs.get(DEFAULT_CLIENT_NAME, "de").as_deref(),
        Some("de-DE-KatjaNeural")
    );

    collect(client.speak(BILINGUAL).unwrap()).await;
    let requests = fetcher.spoken();
    assert_eq!(requests[1].voice, "de-DE-KatjaNeural");
}

#[tokio::test]
async fn test_voice_queries() {
    let fetcher = Arc::new(MockFetcher::default());
    let client = TtsClient::builder(fetcher)
        .name("reader")
        .catalog(vec![
            Voice::new("en-US-GuyNeural", "Guy", "en-US"),
            Voice::new("en-IN-NeerjaNeural", "Neerja", "en-IN"),
            Voice::new("es-ES-ElviraNeural", "Elvira", "es-ES"),
        ])
        .primary_lang("es-MX")
        .build();
    assert_eq!(client.name(), "reader");
    assert!(client.init().await);

    let ids: Vec<_> = client.voices("en").into_iter().map(|v| v.id).collect();
    assert_eq!(ids, vec!["en-IN-NeerjaNeural", "en-US-GuyNeural"]);
    assert_eq!(client.voice_id(), "es-ES-ElviraNeural");
    assert_eq!(client.speaking_lang(), "es-MX");

    client.set_primary_lang("en-US");
    assert_eq!(client.speaking_lang(), "en-US");
}

//! Playback sequencing.
//!
//! A session walks its segments strictly in order: resolve a voice, fetch
//! audio, play it, report. Only one session drives the sink at a time; a
//! session holds the sink lock from start to teardown and a superseding
//! session starts only after its cancelled predecessor has finished.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, watch, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::event::{ErrorKind, Event};
use crate::fetcher::{AudioFetcher, SynthesisRequest};
use crate::sink::{AudioSink, Playback};
use crate::ssml::Segment;
use crate::voice::VoiceResolver;

/// Sink shared between sessions.
pub type SharedSink = Arc<tokio::sync::Mutex<Box<dyn AudioSink>>>;

/// Phase of the playback pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    /// No session is running.
    #[default]
    Idle,
    /// A session took over the sink and is preparing its segments.
    Segmenting,
    /// Audio for the current segment is being fetched.
    WaitingForAudio,
    /// The current segment is playing or paused.
    PlayingSegment,
    /// The session was cancelled. Followed by `Idle`.
    Aborted,
    /// The session failed. Followed by `Idle`.
    Error,
}

/// Snapshot of the pipeline, published on every transition.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Status {
    pub state: State,
    /// Index of the current segment.
    pub index: Option<usize>,
    /// Name of the current segment.
    pub mark: Option<String>,
    /// True while audio is audible; false when paused.
    pub is_playing: bool,
    /// Language of the current segment.
    pub lang: Option<String>,
    /// Voice of the current segment.
    pub voice: Option<String>,
}

/// Control messages for a running session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Command {
    Pause,
    Resume,
}

/// Mutable state of one utterance.
struct Session {
    segments: Vec<Segment>,
    current_index: usize,
    is_playing: bool,
    paused_offset: Option<Duration>,
    cancel: CancellationToken,
}

enum Finish {
    Done,
    Aborted,
    Failed,
    Detached,
}

enum Played {
    Finished(Result<()>),
    Cancelled,
    Detached,
}

/// Everything a session needs to run, captured when it is started.
pub(crate) struct Sequencer {
    pub(crate) fetcher: Arc<dyn AudioFetcher>,
    pub(crate) sink: SharedSink,
    pub(crate) resolver: VoiceResolver,
    pub(crate) rate: f64,
    pub(crate) pitch: f64,
    pub(crate) status: Arc<watch::Sender<Status>>,
}

impl Sequencer {
    /// Plays `segments` until they are exhausted, one fails, or `cancel`
    /// fires. The event sender is dropped before the sink is released, so
    /// the stream of this session always ends before the next one starts.
    pub(crate) async fn run(
        self,
        segments: Vec<Segment>,
        cancel: CancellationToken,
        mut commands: mpsc::UnboundedReceiver<Command>,
        events: mpsc::Sender<Event>,
    ) {
        let mut sink = self.sink.lock().await;
        self.status.send_replace(Status {
            state: State::Segmenting,
            ..Status::default()
        });

        let mut session = Session {
            segments,
            current_index: 0,
            is_playing: false,
            paused_offset: None,
            cancel,
        };
        info!(segments = session.segments.len(), "tts: session started");

        let finish = self
            .play_all(&mut session, &mut sink, &mut commands, &events)
            .await;

        sink.stop();
        match finish {
            Finish::Done => info!("tts: session finished"),
            Finish::Aborted => {
                info!(index = session.current_index, "tts: session aborted");
                self.publish(State::Aborted, &session, None);
            }
            Finish::Failed => self.publish(State::Error, &session, None),
            Finish::Detached => debug!("tts: event stream dropped, session abandoned"),
        }

        self.status.send_replace(Status::default());
        drop(events);
        drop(sink);
    }

    async fn play_all(
        &self,
        session: &mut Session,
        sink: &mut MutexGuard<'_, Box<dyn AudioSink>>,
        commands: &mut mpsc::UnboundedReceiver<Command>,
        events: &mpsc::Sender<Event>,
    ) -> Finish {
        for index in 0..session.segments.len() {
            session.current_index = index;
            session.is_playing = false;
            session.paused_offset = None;
            let segment = session.segments[index].clone();
            let mark = segment.name.as_str();

            if session.cancel.is_cancelled() {
                return self.emit_final(events, Event::aborted(mark), Finish::Aborted).await;
            }
            if events.send(Event::boundary(mark)).await.is_err() {
                return Finish::Detached;
            }

            let voice = self.resolver.resolve(&segment.language);
            self.publish(State::WaitingForAudio, session, Some(&voice));

            let request = SynthesisRequest {
                lang: segment.language.clone(),
                text: segment.text.clone(),
                voice,
                rate: self.rate,
                pitch: self.pitch,
            };
            let fetched = tokio::select! {
                biased;
                _ = session.cancel.cancelled() => None,
                _ = events.closed() => return Finish::Detached,
                result = self.fetcher.fetch_audio(&request) => Some(result),
            };
            let Some(fetched) = fetched else {
                return self.emit_final(events, Event::aborted(mark), Finish::Aborted).await;
            };

            let audio = match fetched {
                Ok(audio) => audio,
                Err(e) if e.is_no_audio() => {
                    debug!(mark, "tts: no audio for segment, skipping");
                    if events.send(Event::skipped(mark)).await.is_err() {
                        return Finish::Detached;
                    }
                    continue;
                }
                Err(e) => {
                    warn!(mark, error = %e, "tts: fetch failed");
                    let event = Event::failed(mark, ErrorKind::FetchFailed, e.to_string());
                    return self.emit_final(events, event, Finish::Failed).await;
                }
            };

            // Pause and resume only apply to audible segments.
            while commands.try_recv().is_ok() {}

            let playback = match sink.play(audio) {
                Ok(playback) => playback,
                Err(e) => {
                    warn!(mark, error = %e, "tts: playback failed to start");
                    let event = Event::failed(mark, ErrorKind::PlaybackFailed, e.to_string());
                    return self.emit_final(events, event, Finish::Failed).await;
                }
            };
            session.is_playing = true;
            self.publish(State::PlayingSegment, session, Some(&request.voice));

            match self
                .play_segment(session, sink, playback, commands, events, &request.voice)
                .await
            {
                Played::Finished(Ok(())) => {
                    sink.stop();
                    session.is_playing = false;
                    if events.send(Event::end(mark)).await.is_err() {
                        return Finish::Detached;
                    }
                }
                Played::Finished(Err(e)) => {
                    warn!(mark, error = %e, "tts: playback failed");
                    let event = Event::failed(mark, ErrorKind::PlaybackFailed, e.to_string());
                    return self.emit_final(events, event, Finish::Failed).await;
                }
                Played::Cancelled => {
                    return self.emit_final(events, Event::aborted(mark), Finish::Aborted).await;
                }
                Played::Detached => return Finish::Detached,
            }
        }

        Finish::Done
    }

    async fn play_segment(
        &self,
        session: &mut Session,
        sink: &mut MutexGuard<'_, Box<dyn AudioSink>>,
        mut playback: Playback,
        commands: &mut mpsc::UnboundedReceiver<Command>,
        events: &mpsc::Sender<Event>,
        voice: &str,
    ) -> Played {
        let cancel = session.cancel.clone();
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Played::Cancelled,
                _ = events.closed() => return Played::Detached,
                Some(command) = commands.recv() => match command {
                    Command::Pause if session.paused_offset.is_none() => {
                        if let Some(offset) = sink.pause() {
                            debug!(?offset, "tts: paused");
                            session.paused_offset = Some(offset);
                            session.is_playing = false;
                            self.publish(State::PlayingSegment, session, Some(voice));
                        }
                    }
                    Command::Resume => {
                        if let Some(offset) = session.paused_offset.take() {
                            debug!(?offset, "tts: resumed");
                            if let Err(e) = sink.resume(offset) {
                                return Played::Finished(Err(e));
                            }
                            session.is_playing = true;
                            self.publish(State::PlayingSegment, session, Some(voice));
                        }
                    }
                    Command::Pause => {}
                },
                result = &mut playback => return Played::Finished(result),
            }
        }
    }

    async fn emit_final(&self, events: &mpsc::Sender<Event>, event: Event, finish: Finish) -> Finish {
        if events.send(event).await.is_err() {
            return Finish::Detached;
        }
        finish
    }

    fn publish(&self, state: State, session: &Session, voice: Option<&str>) {
        let segment = session.segments.get(session.current_index);
        self.status.send_replace(Status {
            state,
            index: Some(session.current_index),
            mark: segment.map(|s| s.name.clone()),
            is_playing: session.is_playing,
            lang: segment.map(|s| s.language.clone()),
            voice: voice.map(str::to_string),
        });
    }
}

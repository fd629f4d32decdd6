//! Audio output.
//!
//! An [`AudioSink`] plays one [`Audio`] source at a time. Starting playback
//! returns a [`Playback`] future that resolves when the source finishes or
//! fails. Pausing and resuming work with offsets into the current source.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{Error, Result};
use crate::fetcher::Audio;

/// Byte rate used to estimate durations: 48 kbit/s mp3.
pub const DEFAULT_BYTES_PER_SECOND: u64 = 6000;

/// Output device for synthesized audio.
///
/// At most one source is active at a time. Calling [`play`](Self::play)
/// replaces the active source.
pub trait AudioSink: Send {
    /// Starts playing `audio` from the beginning.
    fn play(&mut self, audio: Audio) -> Result<Playback>;

    /// Pauses the active source and returns its playback offset.
    /// Returns `None` when nothing is playing.
    fn pause(&mut self) -> Option<Duration>;

    /// Continues the active source from `offset`.
    fn resume(&mut self, offset: Duration) -> Result<()>;

    /// Stops and releases the active source. Idempotent.
    fn stop(&mut self);
}

/// Completion of a started source.
///
/// Dropping the sending half without a result means the source was
/// released before it finished.
pub struct Playback {
    rx: oneshot::Receiver<Result<()>>,
}

impl Playback {
    /// Creates a pending playback and the handle that completes it.
    pub fn pending() -> (oneshot::Sender<Result<()>>, Playback) {
        let (tx, rx) = oneshot::channel();
        (tx, Playback { rx })
    }

    /// Creates a playback that has already finished with `result`.
    pub fn finished(result: Result<()>) -> Playback {
        let (tx, playback) = Self::pending();
        let _ = tx.send(result);
        playback
    }
}

impl Future for Playback {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => {
                Poll::Ready(Err(Error::Playback("source released".to_string())))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

type Done = Arc<Mutex<Option<oneshot::Sender<Result<()>>>>>;

struct Source {
    duration: Duration,
    started_at: Instant,
    offset: Duration,
    paused: bool,
    done: Done,
    timer: Option<JoinHandle<()>>,
}

impl Source {
    fn position(&self) -> Duration {
        if self.paused {
            self.offset
        } else {
            (self.offset + self.started_at.elapsed()).min(self.duration)
        }
    }

    fn start_timer(&mut self) {
        let remaining = self.duration.saturating_sub(self.offset);
        let done = self.done.clone();
        self.started_at = Instant::now();
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(remaining).await;
            if let Some(tx) = done.lock().take() {
                let _ = tx.send(Ok(()));
            }
        }));
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

impl Drop for Source {
    fn drop(&mut self) {
        self.cancel_timer();
    }
}

/// Sink that writes every segment to a directory and optionally paces
/// playback in real time.
///
/// Segments are stored as `<dir>/<nnn>.<ext>`, numbered from zero across
/// the lifetime of the sink. With pacing enabled the returned [`Playback`]
/// resolves after the duration estimated from the byte length, so pause and
/// resume behave like a real device.
pub struct FileSink {
    dir: Option<PathBuf>,
    bytes_per_second: Option<u64>,
    written: usize,
    current: Option<Source>,
}

impl FileSink {
    /// Creates a sink writing into `dir`, finishing each source immediately.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
            bytes_per_second: None,
            written: 0,
            current: None,
        }
    }

    /// Creates a sink that discards audio and finishes each source
    /// immediately.
    pub fn discard() -> Self {
        Self {
            dir: None,
            bytes_per_second: None,
            written: 0,
            current: None,
        }
    }

    /// Paces playback at `bytes_per_second`.
    pub fn paced(mut self, bytes_per_second: u64) -> Self {
        self.bytes_per_second = (bytes_per_second > 0).then_some(bytes_per_second);
        self
    }

    /// Returns the number of segments played so far.
    pub fn written(&self) -> usize {
        self.written
    }

    fn store(&self, audio: &Audio) -> Result<()> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{:03}.{}", self.written, audio.extension()));
        std::fs::write(&path, &audio.data)?;
        debug!(path = %path.display(), bytes = audio.len(), "tts: segment written");
        Ok(())
    }
}

/// Sink that drops all audio.
pub type NullSink = FileSink;

impl AudioSink for FileSink {
    fn play(&mut self, audio: Audio) -> Result<Playback> {
        self.stop();
        self.store(&audio)?;
        self.written += 1;

        let Some(rate) = self.bytes_per_second else {
            return Ok(Playback::finished(Ok(())));
        };

        let duration = Duration::from_secs_f64(audio.len() as f64 / rate as f64);
        let (tx, playback) = Playback::pending();
        let mut source = Source {
            duration,
            started_at: Instant::now(),
            offset: Duration::ZERO,
            paused: false,
            done: Arc::new(Mutex::new(Some(tx))),
            timer: None,
        };
        source.start_timer();
        self.current = Some(source);
        Ok(playback)
    }

    fn pause(&mut self) -> Option<Duration> {
        let source = self.current.as_mut()?;
        if !source.paused {
            source.offset = source.position();
            source.paused = true;
            source.cancel_timer();
        }
        Some(source.offset)
    }

    fn resume(&mut self, offset: Duration) -> Result<()> {
        let source = self
            .current
            .as_mut()
            .ok_or_else(|| Error::Playback("no source to resume".to_string()))?;
        source.cancel_timer();
        source.offset = offset.min(source.duration);
        source.paused = false;
        source.start_timer();
        Ok(())
    }

    fn stop(&mut self) {
        self.current = None;
    }
}

//! Playback lifecycle events.

use serde::{Deserialize, Serialize};

/// Why a segment ended in an [`Event::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Cancelled by `stop()`, a superseding `speak()` or a dropped stream.
    Aborted,
    /// The synthesis request failed.
    FetchFailed,
    /// The audio sink failed to play the fetched audio.
    PlaybackFailed,
}

/// An event emitted while an utterance is being played.
///
/// For each segment, `Boundary` is emitted when the segment starts and
/// exactly one `End` or `Error` when it finishes. The boundary of the next
/// segment is never emitted before that.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "lowercase")]
pub enum Event {
    /// A segment started.
    Boundary { mark: String, message: String },
    /// A segment finished. `skipped` is set when the service returned no
    /// audio for it and playback moved on.
    End {
        mark: String,
        message: String,
        skipped: bool,
    },
    /// A segment failed or was aborted. No further segments follow.
    Error {
        mark: Option<String>,
        kind: ErrorKind,
        message: String,
    },
}

impl Event {
    pub(crate) fn boundary(mark: &str) -> Self {
        Event::Boundary {
            mark: mark.to_string(),
            message: format!("Start chunk: {mark}"),
        }
    }

    pub(crate) fn end(mark: &str) -> Self {
        Event::End {
            mark: mark.to_string(),
            message: format!("Chunk finished: {mark}"),
            skipped: false,
        }
    }

    pub(crate) fn skipped(mark: &str) -> Self {
        Event::End {
            mark: mark.to_string(),
            message: format!("No audio for chunk: {mark}"),
            skipped: true,
        }
    }

    pub(crate) fn aborted(mark: &str) -> Self {
        Event::Error {
            mark: Some(mark.to_string()),
            kind: ErrorKind::Aborted,
            message: "Aborted".to_string(),
        }
    }

    pub(crate) fn failed(mark: &str, kind: ErrorKind, message: impl Into<String>) -> Self {
        Event::Error {
            mark: Some(mark.to_string()),
            kind,
            message: message.into(),
        }
    }

    /// Returns the wire code: `"boundary"`, `"end"` or `"error"`.
    pub fn code(&self) -> &'static str {
        match self {
            Event::Boundary { .. } => "boundary",
            Event::End { .. } => "end",
            Event::Error { .. } => "error",
        }
    }

    /// Returns the segment mark this event refers to.
    pub fn mark(&self) -> Option<&str> {
        match self {
            Event::Boundary { mark, .. } | Event::End { mark, .. } => Some(mark),
            Event::Error { mark, .. } => mark.as_deref(),
        }
    }

    /// Returns the human readable message.
    pub fn message(&self) -> &str {
        match self {
            Event::Boundary { message, .. }
            | Event::End { message, .. }
            | Event::Error { message, .. } => message,
        }
    }

    /// Returns true if the utterance was cancelled rather than failed.
    pub fn is_aborted(&self) -> bool {
        matches!(
            self,
            Event::Error {
                kind: ErrorKind::Aborted,
                ..
            }
        )
    }

    /// Returns true for a genuine failure that should be shown to the user.
    pub fn is_failure(&self) -> bool {
        matches!(self, Event::Error { kind, .. } if *kind != ErrorKind::Aborted)
    }

    /// Returns true if no further events follow for this utterance.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Event::Error { .. })
    }
}

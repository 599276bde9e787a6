use serde::Serialize;

use crate::upload::AccuracyReport;

/// Events emitted by a `RecordingSession` for the frontend to render.
///
/// The session never touches a display directly; everything the original UI
/// showed (elapsed counter, transcript area, metric fields, alerts) is driven
/// from this stream.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum SessionEvent {
    /// Capture acquired, timer running. Displayed transcript and metrics
    /// should be cleared.
    Started,

    /// Elapsed-time display update, once per whole second.
    Elapsed { seconds: f64 },

    /// A segment upload returned transcribed text; replaces the displayed
    /// transcript.
    Transcript { text: String },

    /// The reference text was scored against the latest transcript.
    Metrics(AccuracyReport),

    /// An upload was rejected or failed; the message is surfaced to the user
    /// and the rest of that segment's chain is abandoned.
    UploadFailed { message: String },

    /// The session ended. `forced` is true when the session-length cap fired
    /// rather than a manual toggle.
    Stopped { forced: bool },
}

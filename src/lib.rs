pub mod audio;
pub mod config;
pub mod error;
pub mod session;
pub mod upload;

pub use audio::{
    AudioChunk, AudioFile, CaptureBackend, CaptureConfig, CaptureEvent, MicBackend,
};
pub use config::Config;
pub use error::{CaptureError, UploadError};
pub use session::{
    RecordingSession, SegmentClock, SessionConfig, SessionEvent, SessionState, SessionStats,
    TickOutcome,
};
pub use upload::{AccuracyReport, ApiClient, TranscriptionApi};

//! HTTP upload client for the transcription server.
//!
//! Three endpoints share one multipart transport:
//! - `audio_recording` - flushed in-session segments (with reset flag)
//! - `audio_upload` - complete audio files
//! - `text_upload` - reference text for accuracy scoring

mod client;
mod response;

pub use client::{ApiClient, TranscriptionApi};
pub use response::{AccuracyReport, ErrorBody, TranscriptResponse};

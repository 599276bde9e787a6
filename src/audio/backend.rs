use tokio::sync::mpsc;

use crate::error::CaptureError;

/// A chunk of captured audio (16-bit PCM, interleaved).
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

/// Event emitted by a capture backend.
///
/// `Chunk` carries newly captured samples; `Stopped` is the final event on a
/// stream and signals that the device released and no more chunks follow.
#[derive(Debug)]
pub enum CaptureEvent {
    Chunk(AudioChunk),
    Stopped,
}

/// Configuration for a capture backend
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Target sample rate (device output is converted if needed)
    pub sample_rate: u32,
    /// Target channel count (1 = mono, 2 = stereo)
    pub channels: u16,
    /// Chunk size in milliseconds (affects latency)
    pub buffer_duration_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000, // 16kHz, what the transcription server expects
            channels: 1,        // Mono
            buffer_duration_ms: 100,
        }
    }
}

/// Audio capture backend trait
///
/// Implementations:
/// - `MicBackend`: microphone input via cpal
/// - test doubles that replay scripted chunks
#[async_trait::async_trait]
pub trait CaptureBackend: Send + Sync {
    /// Acquire the device and start capturing.
    ///
    /// Returns a channel receiver that yields `Chunk` events followed by a
    /// single `Stopped` once the backend shuts down. Fails with
    /// `CaptureError::PermissionDenied` when the device cannot be acquired.
    async fn start(&mut self) -> Result<mpsc::Receiver<CaptureEvent>, CaptureError>;

    /// Release the device. Any samples already captured are delivered on the
    /// receiver before the final `Stopped` event.
    async fn stop(&mut self) -> Result<(), CaptureError>;

    /// Check if the backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

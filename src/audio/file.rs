use anyhow::{Context, Result};
use hound::WavReader;
use std::path::Path;
use tracing::info;

/// A WAV file loaded for the file-upload path.
pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub bytes: Vec<u8>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read audio file: {}", path.display()))?;

        let reader = WavReader::new(std::io::Cursor::new(&bytes))
            .context("Failed to parse WAV file")?;

        let spec = reader.spec();
        let sample_count = reader.len() as f64;
        let duration_seconds = sample_count / (spec.sample_rate as f64 * spec.channels as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels",
            duration_seconds, spec.sample_rate, spec.channels
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            bytes,
        })
    }

    /// File name component used as the multipart file name on upload.
    pub fn file_name(&self) -> &str {
        Path::new(&self.path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload.wav")
    }

    /// The server rejects recordings that are too short to score; checking
    /// locally saves a round trip.
    pub fn is_long_enough(&self, min_secs: f64) -> bool {
        self.duration_seconds >= min_secs
    }
}

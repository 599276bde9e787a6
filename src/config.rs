use anyhow::Result;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub recording: RecordingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Base URL of the transcription server, e.g. "http://localhost:8000".
    pub base_url: String,
    /// Anti-forgery token attached to every form POST.
    pub csrf_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecordingConfig {
    /// Seconds of audio per segment before the recorder rotates.
    pub segment_secs: u64,
    /// Hard cap on session length; the session force-stops here.
    pub max_session_secs: u64,
    pub sample_rate: u32,
    pub channels: u16,
    /// Files shorter than this are rejected client-side before upload.
    pub min_upload_secs: f64,
}

impl Config {
    /// Load configuration, merging an optional TOML file over built-in
    /// defaults so a missing file still yields a working client.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .set_default("server.base_url", "http://localhost:8000")?
            .set_default("server.csrf_token", "")?
            .set_default("recording.segment_secs", 20i64)?
            .set_default("recording.max_session_secs", 60i64)?
            .set_default("recording.sample_rate", 16000i64)?
            .set_default("recording.channels", 1i64)?
            .set_default("recording.min_upload_secs", 1.0f64)?
            .add_source(config::File::with_name(path).required(false))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_a_config_file() {
        let cfg = Config::load("does/not/exist").unwrap();
        assert_eq!(cfg.recording.segment_secs, 20);
        assert_eq!(cfg.recording.max_session_secs, 60);
        assert_eq!(cfg.recording.sample_rate, 16000);
        assert_eq!(cfg.recording.channels, 1);
        assert_eq!(cfg.server.base_url, "http://localhost:8000");
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Session lifecycle state. Transitions only via explicit toggle or the
/// session-length cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Recording,
}

/// Statistics about a recording session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    /// Current lifecycle state
    pub state: SessionState,

    /// When the session object was created
    pub started_at: DateTime<Utc>,

    /// Elapsed recording time in seconds (0 while idle)
    pub elapsed_secs: f64,

    /// Number of segments flushed to the server so far
    pub segments_uploaded: usize,

    /// Number of transcripts received back
    pub transcripts_received: usize,
}

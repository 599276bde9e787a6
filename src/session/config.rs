use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a recording session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Unique session identifier (e.g., "take-2026-08-30-demo")
    pub session_id: String,

    /// Duration of each capture segment before the recorder rotates
    pub segment_duration: Duration,

    /// Hard cap on total session length; the session force-stops here
    pub max_duration: Duration,

    /// Timer period; one tick of the segment clock
    pub tick_interval: Duration,
}

impl SessionConfig {
    /// Segment length in ticks, at least 1.
    pub fn segment_ticks(&self) -> u64 {
        ticks(self.segment_duration, self.tick_interval)
    }

    /// Session cap in ticks, at least 1.
    pub fn max_ticks(&self) -> u64 {
        ticks(self.max_duration, self.tick_interval)
    }
}

fn ticks(duration: Duration, tick_interval: Duration) -> u64 {
    let interval = tick_interval.as_millis().max(1);
    ((duration.as_millis() / interval) as u64).max(1)
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: format!("take-{}", uuid::Uuid::new_v4()),
            segment_duration: Duration::from_secs(20),
            max_duration: Duration::from_secs(60), // observed session cap
            tick_interval: Duration::from_millis(10),
        }
    }
}

//! Recording session management
//!
//! This module provides the `RecordingSession` abstraction that manages:
//! - The capture toggle and Idle/Recording state machine
//! - The 10 ms tick timer driving segment rotation and the session cap
//! - The segment chunk buffer and its atomic flushes
//! - The upload chain (segment transcription, then reference-text scoring)
//! - Session events and statistics

mod clock;
mod config;
mod events;
mod session;
mod stats;

pub use clock::{SegmentClock, TickOutcome};
pub use config::SessionConfig;
pub use events::SessionEvent;
pub use session::RecordingSession;
pub use stats::{SessionState, SessionStats};

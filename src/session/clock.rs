/// Outcome of a single timer tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing due on this tick.
    Continue,
    /// A segment boundary: rotate the recorder and flush the buffer.
    /// `reset` tells the server whether to discard its decoding context.
    SegmentBoundary { reset: bool },
    /// The session hit its hard cap and must stop.
    ForceStop,
}

/// Tick-based time source for segment rotation.
///
/// One tick is one timer period (10 ms in production, so 100 ticks per
/// second). The clock is pure state; the session drives it from an interval
/// task and reacts to the outcomes.
#[derive(Debug, Clone)]
pub struct SegmentClock {
    elapsed_ticks: u64,
    segment_ticks: u64,
    max_ticks: u64,
}

impl SegmentClock {
    pub fn new(segment_ticks: u64, max_ticks: u64) -> Self {
        Self {
            elapsed_ticks: 0,
            segment_ticks: segment_ticks.max(1),
            max_ticks: max_ticks.max(1),
        }
    }

    /// Advance by one tick and classify it.
    ///
    /// The cap check wins over a coinciding segment boundary, so a tick that
    /// is both a segment multiple and the session cap is a `ForceStop`.
    pub fn on_tick(&mut self) -> TickOutcome {
        self.elapsed_ticks += 1;

        if self.elapsed_ticks >= self.max_ticks {
            TickOutcome::ForceStop
        } else if self.elapsed_ticks % self.segment_ticks == 0 {
            TickOutcome::SegmentBoundary {
                reset: self.elapsed_ticks < 2 * self.segment_ticks,
            }
        } else {
            TickOutcome::Continue
        }
    }

    /// Reset flag for a manual stop: context is kept only while the session
    /// is still within its first segment's worth of ticks.
    pub fn stop_reset_flag(&self) -> bool {
        self.elapsed_ticks <= self.segment_ticks
    }

    /// Segment length may change between segments; the new value applies
    /// from the next tick classification onward.
    pub fn set_segment_ticks(&mut self, segment_ticks: u64) {
        self.segment_ticks = segment_ticks.max(1);
    }

    pub fn reset(&mut self) {
        self.elapsed_ticks = 0;
    }

    pub fn elapsed_ticks(&self) -> u64 {
        self.elapsed_ticks
    }

    /// Elapsed time in whole-second resolution for display (ticks / 100).
    pub fn elapsed_seconds(&self) -> f64 {
        self.elapsed_ticks as f64 / 100.0
    }
}

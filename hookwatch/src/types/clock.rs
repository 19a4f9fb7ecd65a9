//! Wall-clock milliseconds that follow tokio's clock.

use std::time::SystemTime;

use tokio::time::Instant;

/// Epoch-millisecond clock anchored to [`tokio::time::Instant`].
///
/// The wall-clock time is sampled once at construction; afterwards the clock
/// advances with tokio's monotonic clock. Timestamps therefore survive a
/// process restart (they are real epoch values) while tests running with a
/// paused runtime can move them with `tokio::time::advance`.
#[derive(Debug, Clone, Copy)]
pub struct EpochClock {
    anchor_ms: u64,
    anchor: Instant,
}

impl EpochClock {
    pub fn new() -> Self {
        let anchor_ms = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self {
            anchor_ms,
            anchor: Instant::now(),
        }
    }

    /// Milliseconds since the Unix epoch.
    pub fn now_ms(&self) -> u64 {
        self.anchor_ms + self.anchor.elapsed().as_millis() as u64
    }
}

impl Default for EpochClock {
    fn default() -> Self {
        Self::new()
    }
}

//! Per-device unhooked episode state.
//!
//! # State Machine
//!
//! ```text
//!            unhooked                 dwell elapsed, still unhooked
//!  Idle ──────────────► Armed ──────────────────────────────► Fired
//!   ▲                     │                                     │
//!   │     hooked          │  hooked / dwell elapsed, hooked     │
//!   └─────────────────────┘                                     │
//!   │                               hooked                      │
//!   └───────────────────────────────────────────────────────────┘
//!   ▲                                                           │
//!   └──────────────────────── cancel() ─────────────────────────┘
//! ```
//!
//! - **Idle:** Not armed, not fired. Waiting for both hooks to detach.
//! - **Armed:** Both hooks detached; the dwell deadline is set.
//! - **Fired:** The alert for this episode went out. Further unhooked
//!   readings are suppressed until a hooked reading ends the episode.
//!
//! The dwell deadline is plain data. Whoever drives the episode waits for
//! it and calls [`Episode::expire`]; clearing the field is the cancellation,
//! so a cancelled deadline can never be acted on.

use std::time::Duration;

use tokio::time::Instant;

use crate::types::Reading;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Armed { deadline: Instant },
    Fired,
}

/// What [`Episode::observe`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Nothing changed (still idle, still armed, or still fired).
    Unchanged,
    /// Unhooked run started; dwell runs until the deadline.
    Armed(Instant),
    /// Hooked again before the dwell elapsed.
    Disarmed,
    /// Hooked again after the alert fired. The next run can alert.
    Recovered,
}

#[derive(Debug, Clone)]
pub struct Episode {
    phase: Phase,
    last_reading: Option<Reading>,
}

impl Episode {
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            last_reading: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// A dwell deadline is pending.
    pub fn armed(&self) -> bool {
        matches!(self.phase, Phase::Armed { .. })
    }

    /// The alert for the current run already went out.
    pub fn fired(&self) -> bool {
        matches!(self.phase, Phase::Fired)
    }

    pub fn deadline(&self) -> Option<Instant> {
        match self.phase {
            Phase::Armed { deadline } => Some(deadline),
            _ => None,
        }
    }

    pub fn last_reading(&self) -> Option<&Reading> {
        self.last_reading.as_ref()
    }

    /// Feed one reading.
    ///
    /// | Phase | reading | Result |
    /// |-------|---------|--------|
    /// | Idle | unhooked | `Armed` (deadline = now + dwell) |
    /// | Idle | hooked | `Unchanged` |
    /// | Armed | unhooked | `Unchanged` |
    /// | Armed | hooked | `Disarmed` |
    /// | Fired | unhooked | `Unchanged` |
    /// | Fired | hooked | `Recovered` |
    pub fn observe(&mut self, reading: Reading, now: Instant, dwell: Duration) -> Transition {
        let unhooked = reading.is_unhooked();
        self.last_reading = Some(reading);

        match (self.phase, unhooked) {
            (Phase::Idle, true) => {
                let deadline = now + dwell;
                self.phase = Phase::Armed { deadline };
                Transition::Armed(deadline)
            }
            (Phase::Idle, false) => Transition::Unchanged,
            (Phase::Armed { .. }, true) => Transition::Unchanged,
            (Phase::Armed { .. }, false) => {
                self.phase = Phase::Idle;
                Transition::Disarmed
            }
            (Phase::Fired, true) => Transition::Unchanged,
            (Phase::Fired, false) => {
                self.phase = Phase::Idle;
                Transition::Recovered
            }
        }
    }

    /// Act on an elapsed dwell deadline.
    ///
    /// Returns the reading to alert on if the deadline has passed and the
    /// latest reading is still unhooked; the episode is then `Fired`. A
    /// passed deadline whose latest reading shows recovery returns to
    /// `Idle` without an alert. Before the deadline, or when not armed,
    /// this does nothing.
    pub fn expire(&mut self, now: Instant) -> Option<Reading> {
        let Phase::Armed { deadline } = self.phase else {
            return None;
        };
        if now < deadline {
            return None;
        }

        match &self.last_reading {
            Some(reading) if reading.is_unhooked() => {
                self.phase = Phase::Fired;
                Some(reading.clone())
            }
            _ => {
                self.phase = Phase::Idle;
                None
            }
        }
    }

    /// Drop any pending deadline and forget the fired flag.
    pub fn cancel(&mut self) {
        self.phase = Phase::Idle;
    }
}

impl Default for Episode {
    fn default() -> Self {
        Self::new()
    }
}

//! Correlates execution-engine suspend/resume events into pause-time
//! contributions.
//!
//! The runtime emits `SuspendEEBegin` when it starts halting managed threads
//! and `SuspendEEEnd` once they are all parked; `RestartEEEnd` fires when
//! they resume. A blocking collection has exactly one such cycle; a
//! background collection stops the world briefly at its start and again at
//! its end, so the same still-open episode sees repeated begin/end cycles.

use crate::event::GcSuspendReason;

/// The interval measured by one suspend/resume cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SuspensionInterval {
    pub reason: GcSuspendReason,
    pub begin_msec: f64,
    pub duration_msec: f64,
}

impl SuspensionInterval {
    /// Whether this interval feeds GC pause statistics. Debugger and
    /// shutdown suspensions are tracked but never attributed to a collection.
    pub fn counts_toward_gc_pause(&self) -> bool {
        self.reason.counts_toward_gc_pause()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum SuspensionState {
    /// Managed threads are running.
    Running,
    /// A suspension is underway or in effect.
    Suspended {
        reason: GcSuspendReason,
        begin_msec: f64,
    },
}

/// Per-process tracker for the active suspension, if any.
#[derive(Debug)]
pub struct SuspensionTracker {
    state: SuspensionState,
}

impl SuspensionTracker {
    pub fn new() -> Self {
        Self {
            state: SuspensionState::Running,
        }
    }

    /// Records the start of a suspension.
    pub fn begin(&mut self, reason: GcSuspendReason, timestamp_msec: f64) {
        match self.state {
            SuspensionState::Running => {
                self.state = SuspensionState::Suspended {
                    reason,
                    begin_msec: timestamp_msec,
                };
            }
            SuspensionState::Suspended { .. } => {
                // Two SuspendEEBegin events without an in-between end. Seen
                // in traces that drop the end event under buffer pressure;
                // the first interval is unrecoverable, so start over from the
                // later begin.
                log::debug!("SuspendEEBegin while already suspended at {timestamp_msec}");
                self.state = SuspensionState::Suspended {
                    reason,
                    begin_msec: timestamp_msec,
                };
            }
        }
    }

    /// Records the end of the suspension phase and returns the elapsed
    /// interval, clearing the active reason. Returns `None` for an end event
    /// with no matching begin (lost or pre-trace begin).
    pub fn end(&mut self, timestamp_msec: f64) -> Option<SuspensionInterval> {
        match std::mem::replace(&mut self.state, SuspensionState::Running) {
            SuspensionState::Running => None,
            SuspensionState::Suspended { reason, begin_msec } => Some(SuspensionInterval {
                reason,
                begin_msec,
                // Timestamps come from the trace in order, but clamp anyway:
                // clock-domain merges have produced sub-microsecond
                // inversions between providers.
                duration_msec: (timestamp_msec - begin_msec).max(0.0),
            }),
        }
    }

    /// The begin timestamp of the suspension currently in effect, if it is
    /// one that feeds GC pause accounting. A collection that starts while
    /// the world is stopped inherits this as its pause start.
    pub fn active_gc_pause_start(&self) -> Option<f64> {
        match self.state {
            SuspensionState::Suspended { reason, begin_msec }
                if reason.counts_toward_gc_pause() =>
            {
                Some(begin_msec)
            }
            _ => None,
        }
    }

    /// True while any suspension (GC-related or not) is in effect.
    pub fn is_suspended(&self) -> bool {
        matches!(self.state, SuspensionState::Suspended { .. })
    }
}

impl Default for SuspensionTracker {
    fn default() -> Self {
        Self::new()
    }
}

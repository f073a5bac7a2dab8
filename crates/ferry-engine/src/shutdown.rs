//! Error-budgeted shutdown state machine.
//!
//! The controller counts delivery failures over the engine's lifetime and
//! transitions `Running -> Draining` the first time the counter strictly
//! exceeds the configured maximum. Draining stops new polls; the engine
//! finishes its in-flight deliveries and then marks the controller
//! `Stopped`. A maximum of zero disables the budget entirely.

use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};

use tracing::warn;

/// Lifecycle phase of the shutdown controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerPhase {
    /// Normal operation, polls may be issued.
    Running,
    /// Error budget exceeded; no new polls, in-flight deliveries finishing.
    Draining,
    /// All in-flight deliveries settled, engine has stopped.
    Stopped,
}

const PHASE_RUNNING: u8 = 0;
const PHASE_DRAINING: u8 = 1;
const PHASE_STOPPED: u8 = 2;

/// Counts failures and trips the drain-then-stop transition.
///
/// Shared by the engine loop and every dispatch task; all state is a pair
/// of atomics, so recording a failure never blocks a delivery.
#[derive(Debug)]
pub struct ShutdownController {
    max_errors: u32,
    errors: AtomicU32,
    phase: AtomicU8,
}

impl ShutdownController {
    /// Creates a controller with the given error budget (0 = unlimited).
    pub fn new(max_errors: u32) -> Self {
        Self {
            max_errors,
            errors: AtomicU32::new(0),
            phase: AtomicU8::new(PHASE_RUNNING),
        }
    }

    /// Records one delivery failure and returns the new total.
    ///
    /// Trips the `Running -> Draining` transition the first time the total
    /// strictly exceeds the configured maximum.
    pub fn record_failure(&self) -> u32 {
        let count = self.errors.fetch_add(1, Ordering::AcqRel) + 1;

        if self.max_errors > 0 && count > self.max_errors && self.begin_draining() {
            warn!(
                errors = count,
                max_errors = self.max_errors,
                "error budget exceeded, draining in-flight deliveries"
            );
        }

        count
    }

    /// Moves `Running -> Draining`. Returns whether this call made the
    /// transition.
    pub fn begin_draining(&self) -> bool {
        self.phase
            .compare_exchange(
                PHASE_RUNNING,
                PHASE_DRAINING,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Marks the controller stopped once the drain completes.
    pub fn mark_stopped(&self) {
        self.phase.store(PHASE_STOPPED, Ordering::Release);
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> ControllerPhase {
        match self.phase.load(Ordering::Acquire) {
            PHASE_RUNNING => ControllerPhase::Running,
            PHASE_DRAINING => ControllerPhase::Draining,
            _ => ControllerPhase::Stopped,
        }
    }

    /// Whether the controller has left the running phase.
    pub fn is_draining(&self) -> bool {
        self.phase.load(Ordering::Acquire) != PHASE_RUNNING
    }

    /// Failures recorded over the engine's lifetime.
    pub fn error_count(&self) -> u32 {
        self.errors.load(Ordering::Acquire)
    }

    /// Whether the recorded failures crossed the configured maximum.
    pub fn budget_exceeded(&self) -> bool {
        self.max_errors > 0 && self.error_count() > self.max_errors
    }

    /// The configured maximum (0 = unlimited).
    pub fn max_errors(&self) -> u32 {
        self.max_errors
    }
}

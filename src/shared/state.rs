//! Runtime state of the recognition pipeline

use std::time::Duration;

/// Lifecycle of the OCR processor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessorState {
    #[default]
    Stopped,
    Running,
    Stopping,
}

/// Counters updated by the recognition worker (not persisted)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuntimeStats {
    /// Completed recognition cycles, including failed ones
    pub cycles: u64,
    /// Cycles that ended with an error
    pub failed_cycles: u64,
    /// Cycles that took longer than the target interval
    pub overruns: u64,
    /// Batches written into the result slot
    pub published: u64,
    /// Batches overwritten before the consumer read them
    pub superseded: u64,
    /// Duration of the most recent cycle
    pub last_cycle: Option<Duration>,
    /// Last error message (if any)
    pub last_error: Option<String>,
}

impl RuntimeStats {
    /// Record a finished cycle
    pub fn record_cycle(&mut self, elapsed: Duration, target: Duration) {
        self.cycles += 1;
        self.last_cycle = Some(elapsed);
        if elapsed >= target {
            self.overruns += 1;
        }
    }

    /// Set an error message
    pub fn set_error(&mut self, error: impl Into<String>) {
        self.failed_cycles += 1;
        self.last_error = Some(error.into());
    }

    /// Clear any error state
    pub fn clear_error(&mut self) {
        self.last_error = None;
    }
}

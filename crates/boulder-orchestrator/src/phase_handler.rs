//! Phase handler seam
//!
//! The orchestrator drives the phase sequence; what each phase actually
//! does is behind the [`PhaseHandler`] trait. A handler returns its outcome
//! plus an explicit routing decision, so a failed implementation can route
//! to recovery instead of advancing naturally.

use boulder_core::{Phase, Result};
use std::sync::{Arc, Mutex};

/// Read-only context a handler receives for one phase
#[derive(Debug, Clone)]
pub struct PhaseRequest {
    pub phase: Phase,
    pub request: String,
    pub boulder_id: Option<String>,
    /// Classified intent, once the intent phase has produced one
    pub intent: Option<String>,
    /// Findings carried forward from exploration
    pub exploration_context: Option<String>,
    /// Implementation attempts made so far this run
    pub attempts_made: usize,
}

/// Outcome of one phase execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseOutcome {
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
    /// Explicit routing; `None` follows the natural phase order
    pub next_phase: Option<Phase>,
    /// Expert that did the work, recorded on implementation attempts
    pub expert: Option<String>,
}

impl PhaseOutcome {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
            next_phase: None,
            expert: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(error.into()),
            next_phase: None,
            expert: None,
        }
    }

    pub fn route_to(mut self, phase: Phase) -> Self {
        self.next_phase = Some(phase);
        self
    }

    pub fn by_expert(mut self, expert: impl Into<String>) -> Self {
        self.expert = Some(expert.into());
        self
    }

    /// Stability signature: two outcomes with the same signature are
    /// considered "the same result" by the poll loop.
    pub fn signature(&self) -> (bool, usize) {
        (self.success, self.output.len())
    }
}

/// Slot a long-running handler publishes progressive snapshots into.
///
/// The stability poller samples this slot; the runner publishes the final
/// outcome when the handler returns.
#[derive(Debug, Clone, Default)]
pub struct ProgressHandle {
    slot: Arc<Mutex<Option<PhaseOutcome>>>,
}

impl ProgressHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, outcome: PhaseOutcome) {
        *self.slot.lock().expect("progress slot poisoned") = Some(outcome);
    }

    pub fn snapshot(&self) -> Option<PhaseOutcome> {
        self.slot.lock().expect("progress slot poisoned").clone()
    }
}

/// Executes the work of each phase
#[async_trait::async_trait]
pub trait PhaseHandler: Send + Sync {
    /// Run one phase. Long-running phases may publish intermediate
    /// snapshots through `progress` while still working.
    async fn run(&self, request: &PhaseRequest, progress: &ProgressHandle) -> Result<PhaseOutcome>;
}

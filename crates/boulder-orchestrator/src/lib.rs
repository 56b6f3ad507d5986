//! Phase-driven workflow orchestration
//!
//! Runs the fixed phase sequence (intent, assessment, exploration,
//! implementation, recovery, verification, completion) over a pluggable
//! [`PhaseHandler`], with hook dispatch and boulder checkpointing at every
//! transition. Long phases are accepted through stability polling rather
//! than a flat timeout.

mod cancel;
mod orchestrator;
mod phase_handler;
mod report;
mod stability;

pub use cancel::CancelToken;
pub use orchestrator::{WorkflowOrchestrator, WorkflowReport};
pub use phase_handler::{PhaseHandler, PhaseOutcome, PhaseRequest, ProgressHandle};
pub use report::render_escalation_report;
pub use stability::{poll_until_stable, StabilityPolicy};

//! Crash-recoverable workflow state ("boulder state")
//!
//! Persists one active workflow record per working directory, archives
//! terminal snapshots to a history directory, and detects records left
//! behind by a crashed process.

mod state;
mod store;

pub use state::{
    BoulderState, BoulderSummary, ImplementationAttempt, PhaseCheckpoint, MAX_CAPTURE_CHARS,
    SCHEMA_VERSION,
};
pub use store::BoulderStore;

//! # boulder-core
//!
//! Core types for the Boulder orchestration harness.
//!
//! Boulder is named for the Sisyphus metaphor: every workflow run pushes a
//! boulder through a fixed sequence of phases, and if the process dies the
//! persisted boulder is picked up where it stopped instead of rolling back
//! to the bottom of the hill.
//!
//! This crate holds what every other crate needs:
//! - The unified error type and failure classification
//! - The fixed phase sequence, hook priorities, and boulder statuses
//! - Harness configuration loaded from `.boulder/config.toml`

mod config;
mod error;
mod types;

pub use config::{FallbackConfig, HarnessConfig, HistoryConfig, TaskLimitsConfig, WorkflowConfig};
pub use error::{BoulderError, FailureKind, Result};
pub use types::{truncate_capture, BoulderStatus, HookPriority, Phase};

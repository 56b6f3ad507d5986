//! Background task management
//!
//! Runs detached expert calls through the fallback router under
//! per-provider and per-model admission control, with persisted queue and
//! task files that survive a process restart.

mod manager;
mod task;

pub use manager::TaskManager;
pub use task::{BackgroundTask, QueuedCall, TaskStatus};

//! Event-driven hook pipeline for the Boulder harness
//!
//! Components dispatch typed events through a [`HookEngine`]; registered
//! hooks observe, modify, or block the action in strict priority order.
//! Hooks are either in-process handlers or external shell commands declared
//! in JSON configuration.

mod config;
mod engine;
mod event;
mod external;
mod pattern;
mod result;

pub use config::{HookConfig, HookOverride};
pub use engine::{FnHook, HookDefinition, HookEngine, HookHandler, HookStats};
pub use event::{HookContext, HookEvent, HookPayload};
pub use external::{ExternalHook, ExternalHookSpec};
pub use pattern::matches;
pub use result::{DispatchOutcome, HookDecision, HookResult};

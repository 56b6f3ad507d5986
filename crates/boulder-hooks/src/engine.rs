//! Hook registry and dispatch engine
//!
//! Hooks run in strict priority order (critical first, ties broken by
//! registration order). Execution is fail-open for non-critical hooks: a
//! handler error is logged and skipped. A critical handler error forces the
//! whole dispatch to block.

use boulder_core::{HookPriority, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::event::{HookContext, HookEvent, HookPayload};
use crate::pattern;
use crate::result::{DispatchOutcome, HookDecision, HookResult};

/// Trait for in-process hook handlers
#[async_trait::async_trait]
pub trait HookHandler: Send + Sync {
    async fn run(&self, context: &HookContext) -> Result<HookResult>;
}

/// Adapter for synchronous closure hooks
pub struct FnHook<F>(pub F);

#[async_trait::async_trait]
impl<F> HookHandler for FnHook<F>
where
    F: Fn(&HookContext) -> Result<HookResult> + Send + Sync,
{
    async fn run(&self, context: &HookContext) -> Result<HookResult> {
        (self.0)(context)
    }
}

/// A registered hook
#[derive(Clone)]
pub struct HookDefinition {
    pub id: String,
    pub event: HookEvent,
    pub priority: HookPriority,
    pub enabled: bool,
    /// Optional name filter against the payload subject
    pub pattern: Option<String>,
    pub handler: Arc<dyn HookHandler>,
}

impl HookDefinition {
    pub fn new(
        id: impl Into<String>,
        event: HookEvent,
        handler: Arc<dyn HookHandler>,
    ) -> Self {
        Self {
            id: id.into(),
            event,
            priority: HookPriority::Normal,
            enabled: true,
            pattern: None,
            handler,
        }
    }

    pub fn with_priority(mut self, priority: HookPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Per-hook execution statistics
#[derive(Debug, Clone, Default)]
pub struct HookStats {
    pub runs: u64,
    pub total_duration_ms: u64,
    pub last_duration_ms: u64,
    pub last_run: Option<DateTime<Utc>>,
}

struct RegisteredHook {
    seq: usize,
    def: HookDefinition,
}

/// The hook execution engine
///
/// Constructed explicitly and passed by reference; there is no hidden
/// singleton. Test code builds a fresh engine per test.
pub struct HookEngine {
    working_dir: PathBuf,
    enabled: AtomicBool,
    hooks: Mutex<Vec<RegisteredHook>>,
    next_seq: Mutex<usize>,
    stats: Mutex<HashMap<String, HookStats>>,
}

impl HookEngine {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            enabled: AtomicBool::new(true),
            hooks: Mutex::new(Vec::new()),
            next_seq: Mutex::new(0),
            stats: Mutex::new(HashMap::new()),
        }
    }

    /// Enable or disable the whole engine (configuration `enabled` flag)
    pub fn set_engine_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Register a hook, overwriting any existing hook with the same id.
    ///
    /// Overwriting keeps the original registration order.
    pub fn register(&self, def: HookDefinition) {
        let mut hooks = self.hooks.lock().expect("hook registry poisoned");
        if let Some(existing) = hooks.iter_mut().find(|h| h.def.id == def.id) {
            existing.def = def;
            return;
        }
        let mut next_seq = self.next_seq.lock().expect("hook registry poisoned");
        hooks.push(RegisteredHook {
            seq: *next_seq,
            def,
        });
        *next_seq += 1;
    }

    /// Toggle a hook's enabled flag. Returns false if the id is unknown.
    pub fn set_enabled(&self, id: &str, enabled: bool) -> bool {
        let mut hooks = self.hooks.lock().expect("hook registry poisoned");
        match hooks.iter_mut().find(|h| h.def.id == id) {
            Some(hook) => {
                hook.def.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Apply a priority/pattern override to a registered hook
    pub fn override_hook(
        &self,
        id: &str,
        priority: Option<HookPriority>,
        pattern: Option<String>,
        enabled: Option<bool>,
    ) -> bool {
        let mut hooks = self.hooks.lock().expect("hook registry poisoned");
        match hooks.iter_mut().find(|h| h.def.id == id) {
            Some(hook) => {
                if let Some(priority) = priority {
                    hook.def.priority = priority;
                }
                if pattern.is_some() {
                    hook.def.pattern = pattern;
                }
                if let Some(enabled) = enabled {
                    hook.def.enabled = enabled;
                }
                true
            }
            None => false,
        }
    }

    /// Execution statistics for a hook id
    pub fn stats(&self, id: &str) -> Option<HookStats> {
        self.stats
            .lock()
            .expect("hook stats poisoned")
            .get(id)
            .cloned()
    }

    /// Number of registered hooks
    pub fn len(&self) -> usize {
        self.hooks.lock().expect("hook registry poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dispatch an event to all matching hooks and fold their decisions
    pub async fn dispatch(&self, payload: HookPayload) -> DispatchOutcome {
        if !self.enabled.load(Ordering::Relaxed) {
            return DispatchOutcome::default();
        }

        let context = HookContext {
            execution_id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            working_dir: self.working_dir.clone(),
            payload,
        };

        let mut selected: Vec<(usize, HookDefinition)> = {
            let hooks = self.hooks.lock().expect("hook registry poisoned");
            hooks
                .iter()
                .filter(|h| h.def.enabled && h.def.event == context.payload.event())
                .filter(|h| match (&h.def.pattern, context.payload.subject()) {
                    (None, _) => true,
                    (Some(pattern), Some(subject)) => pattern::matches(pattern, subject),
                    // A pattern filter on an event without a subject never matches
                    (Some(_), None) => false,
                })
                .map(|h| (h.seq, h.def.clone()))
                .collect()
        };
        selected.sort_by(|a, b| a.1.priority.cmp(&b.1.priority).then(a.0.cmp(&b.0)));

        debug!(
            event = %context.payload.event(),
            execution_id = %context.execution_id,
            hooks = selected.len(),
            "Dispatching hook event"
        );

        let mut outcome = DispatchOutcome::default();
        for (_, def) in selected {
            let started = Instant::now();
            let result = def.handler.run(&context).await;
            self.record_stats(&def.id, started.elapsed().as_millis() as u64);

            match result {
                Ok(hook_result) => {
                    let decision = hook_result.decision;
                    let short_circuit = outcome.fold(&def.id, hook_result);
                    if short_circuit {
                        debug!(hook = %def.id, "Hook blocked dispatch");
                        break;
                    }
                    if decision == HookDecision::Modify {
                        debug!(hook = %def.id, "Hook modified dispatch");
                    }
                }
                Err(e) => {
                    if def.priority == HookPriority::Critical {
                        warn!(hook = %def.id, "Critical hook failed, blocking dispatch: {}", e);
                        outcome
                            .force_block(&def.id, format!("critical hook '{}' failed: {}", def.id, e));
                        break;
                    }
                    warn!(hook = %def.id, "Hook failed (continuing): {}", e);
                    outcome.executed.push(def.id.clone());
                }
            }
        }

        outcome
    }

    fn record_stats(&self, id: &str, duration_ms: u64) {
        let mut stats = self.stats.lock().expect("hook stats poisoned");
        let entry = stats.entry(id.to_string()).or_default();
        entry.runs += 1;
        entry.total_duration_ms += duration_ms;
        entry.last_duration_ms = duration_ms;
        entry.last_run = Some(Utc::now());
    }
}

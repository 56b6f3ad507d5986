//! JSON hook configuration
//!
//! Hook files can be layered (shared file then project file); later files
//! win on scalar fields and extend the per-event maps.

use boulder_core::{HookPriority, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::warn;

use crate::engine::HookEngine;
use crate::event::HookEvent;
use crate::external::{ExternalHook, ExternalHookSpec};
use crate::HookDefinition;

/// Override for an already-registered (built-in) hook
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HookOverride {
    pub id: String,
    #[serde(default)]
    pub priority: Option<HookPriority>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
}

/// Top-level hook configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HookConfig {
    /// Engine-wide switch. `None` means the file did not set it, which
    /// matters for layering: only an explicit value overrides an earlier
    /// layer's choice.
    #[serde(default)]
    pub enabled: Option<bool>,
    /// Overrides for built-in hooks, keyed by event name
    #[serde(default)]
    pub hooks: HashMap<String, Vec<HookOverride>>,
    /// External subprocess hooks, keyed by event name
    #[serde(default)]
    pub external_hooks: HashMap<String, Vec<ExternalHookSpec>>,
    /// Hook ids to disable outright
    #[serde(default)]
    pub disabled_hooks: Vec<String>,
}

impl Default for HookConfig {
    fn default() -> Self {
        Self {
            enabled: None,
            hooks: HashMap::new(),
            external_hooks: HashMap::new(),
            disabled_hooks: Vec::new(),
        }
    }
}

impl HookConfig {
    /// Engine switch with its default applied
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    /// Load one configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Load and merge a layered list of files, skipping missing ones
    pub fn load_merged(paths: &[impl AsRef<Path>]) -> Result<Self> {
        let mut merged = Self::default();
        for path in paths {
            let path = path.as_ref();
            if !path.exists() {
                continue;
            }
            merged = merged.merge(Self::load(path)?);
        }
        Ok(merged)
    }

    /// Merge a later layer over this one.
    ///
    /// A later file only overrides `enabled` when it actually sets the
    /// field; omitting it keeps the earlier layer's choice.
    pub fn merge(mut self, later: Self) -> Self {
        if later.enabled.is_some() {
            self.enabled = later.enabled;
        }
        for (event, overrides) in later.hooks {
            self.hooks.entry(event).or_default().extend(overrides);
        }
        for (event, specs) in later.external_hooks {
            self.external_hooks.entry(event).or_default().extend(specs);
        }
        self.disabled_hooks.extend(later.disabled_hooks);
        self
    }
}

impl HookEngine {
    /// Apply a loaded configuration to this engine.
    ///
    /// Registers external hooks, applies built-in overrides, and disables
    /// listed hooks. Unknown event names and hook ids are logged and skipped.
    pub fn apply_config(&self, config: &HookConfig) {
        self.set_engine_enabled(config.is_enabled());

        for (event_name, specs) in &config.external_hooks {
            let event: HookEvent = match event_name.parse() {
                Ok(event) => event,
                Err(e) => {
                    warn!("Skipping external hooks for unknown event: {}", e);
                    continue;
                }
            };
            for spec in specs {
                let id = format!("external:{}", spec.name);
                let mut def = HookDefinition::new(
                    id,
                    event,
                    std::sync::Arc::new(ExternalHook::new(spec.clone())),
                )
                .with_priority(spec.priority);
                if let Some(pattern) = &spec.pattern {
                    def = def.with_pattern(pattern.clone());
                }
                self.register(def);
            }
        }

        for overrides in config.hooks.values() {
            for o in overrides {
                if !self.override_hook(&o.id, o.priority, o.pattern.clone(), o.enabled) {
                    warn!(hook = %o.id, "Hook override targets an unregistered hook");
                }
            }
        }

        for id in &config.disabled_hooks {
            if !self.set_enabled(id, false) {
                warn!(hook = %id, "Cannot disable unregistered hook");
            }
        }
    }
}

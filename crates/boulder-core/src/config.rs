//! Configuration management for the Boulder harness
//!
//! This module provides configuration structures for working-directory-level
//! settings: fallback chains, workflow timing, background task limits, and
//! history pruning.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::Result;

/// Harness configuration
///
/// Loaded from `.boulder/config.toml` in the working directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Fallback chain and provider mapping
    #[serde(default)]
    pub fallback: FallbackConfig,

    /// Workflow execution defaults
    #[serde(default)]
    pub workflow: WorkflowConfig,

    /// Background task admission limits
    #[serde(default)]
    pub tasks: TaskLimitsConfig,

    /// History archive pruning
    #[serde(default)]
    pub history: HistoryConfig,
}

/// Static fallback chains and expert-to-provider mapping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackConfig {
    /// Expert id -> ordered list of experts to try on retryable failure
    #[serde(default)]
    pub chains: HashMap<String, Vec<String>>,

    /// Expert id -> provider for admission-control grouping.
    /// Experts not listed here default to the id prefix before `/`.
    #[serde(default)]
    pub providers: HashMap<String, String>,

    /// Model used when a call does not specify one
    #[serde(default = "default_model")]
    pub default_model: String,
}

impl FallbackConfig {
    /// Provider grouping for an expert id
    pub fn provider_of(&self, expert: &str) -> String {
        if let Some(provider) = self.providers.get(expert) {
            return provider.clone();
        }
        expert.split('/').next().unwrap_or(expert).to_string()
    }
}

/// Workflow execution parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Maximum implementation attempts before escalation
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,

    /// Flat timeout for quick phases
    #[serde(default = "default_quick_timeout_ms")]
    pub quick_timeout_ms: u64,

    /// Hard ceiling for long phases
    #[serde(default = "default_hard_timeout_ms")]
    pub hard_timeout_ms: u64,

    /// Interval between stability poll samples
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Minimum elapsed time before a result can be accepted
    #[serde(default = "default_min_stability_ms")]
    pub min_stability_ms: u64,

    /// Consecutive identical signatures required to accept a result
    #[serde(default = "default_polls_required")]
    pub polls_required: u32,
}

/// Background task admission limits and persistence timing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskLimitsConfig {
    /// Per-provider concurrency overrides
    #[serde(default)]
    pub per_provider: HashMap<String, usize>,

    /// Per-model concurrency overrides
    #[serde(default)]
    pub per_model: HashMap<String, usize>,

    /// Limit for providers without an override
    #[serde(default = "default_provider_limit")]
    pub default_per_provider: usize,

    /// Limit for models without an override
    #[serde(default = "default_model_limit")]
    pub default_per_model: usize,

    /// Debounce interval for task persistence
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
}

/// History archive pruning knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Keep at most this many archived boulders
    #[serde(default = "default_history_max_count")]
    pub max_count: usize,

    /// Drop archives older than this many days
    #[serde(default = "default_history_max_age_days")]
    pub max_age_days: i64,
}

// Default value providers
fn default_model() -> String {
    "default".to_string()
}

fn default_max_attempts() -> usize {
    3
}

fn default_quick_timeout_ms() -> u64 {
    30_000
}

fn default_hard_timeout_ms() -> u64 {
    600_000
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

fn default_min_stability_ms() -> u64 {
    5_000
}

fn default_polls_required() -> u32 {
    3
}

fn default_provider_limit() -> usize {
    4
}

fn default_model_limit() -> usize {
    2
}

fn default_flush_interval_ms() -> u64 {
    2_000
}

fn default_history_max_count() -> usize {
    50
}

fn default_history_max_age_days() -> i64 {
    30
}

impl HarnessConfig {
    /// Load configuration from `.boulder/config.toml` or use defaults
    pub fn load_or_default(working_dir: &Path) -> Result<Self> {
        let config_path = working_dir.join(".boulder/config.toml");

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            Ok(toml::from_str(&content).map_err(|e| {
                crate::BoulderError::Other(format!("Failed to parse config file: {}", e))
            })?)
        } else {
            Ok(Self::default())
        }
    }

    /// Write default configuration to `.boulder/config.toml`
    pub fn write_default(working_dir: &Path) -> Result<()> {
        let config_dir = working_dir.join(".boulder");
        std::fs::create_dir_all(&config_dir)?;

        let config_path = config_dir.join("config.toml");
        let config = Self::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| crate::BoulderError::Other(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            chains: HashMap::new(),
            providers: HashMap::new(),
            default_model: default_model(),
        }
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            quick_timeout_ms: default_quick_timeout_ms(),
            hard_timeout_ms: default_hard_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            min_stability_ms: default_min_stability_ms(),
            polls_required: default_polls_required(),
        }
    }
}

impl Default for TaskLimitsConfig {
    fn default() -> Self {
        Self {
            per_provider: HashMap::new(),
            per_model: HashMap::new(),
            default_per_provider: default_provider_limit(),
            default_per_model: default_model_limit(),
            flush_interval_ms: default_flush_interval_ms(),
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_count: default_history_max_count(),
            max_age_days: default_history_max_age_days(),
        }
    }
}

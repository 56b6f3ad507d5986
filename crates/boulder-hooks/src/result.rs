//! Hook results and the dispatch aggregate

use serde::{Deserialize, Serialize};

/// Decision from a single hook
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HookDecision {
    #[default]
    Continue,
    Block,
    Modify,
}

/// Result from one hook execution
///
/// Field names match the external hook stdout contract (camelCase JSON).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HookResult {
    #[serde(default)]
    pub decision: HookDecision,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub inject_message: Option<String>,
    #[serde(default)]
    pub modified_data: Option<serde_json::Value>,
    #[serde(default)]
    pub suppress_output: bool,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

impl HookResult {
    /// Plain continue
    pub fn proceed() -> Self {
        Self::default()
    }

    /// Block with a reason
    pub fn block(reason: impl Into<String>) -> Self {
        Self {
            decision: HookDecision::Block,
            reason: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Modify with replacement data
    pub fn modify(data: serde_json::Value) -> Self {
        Self {
            decision: HookDecision::Modify,
            modified_data: Some(data),
            ..Self::default()
        }
    }

    /// Modify by injecting a message
    pub fn inject(message: impl Into<String>) -> Self {
        Self {
            decision: HookDecision::Modify,
            inject_message: Some(message.into()),
            ..Self::default()
        }
    }
}

/// Running aggregate folded across all hooks of one dispatch
#[derive(Debug, Clone, Default)]
pub struct DispatchOutcome {
    pub decision: HookDecision,
    pub reason: Option<String>,
    pub injected_messages: Vec<String>,
    pub modified_data: Option<serde_json::Value>,
    pub suppress_output: bool,
    /// Hook ids that ran, in execution order
    pub executed: Vec<String>,
}

impl DispatchOutcome {
    pub fn blocked(&self) -> bool {
        self.decision == HookDecision::Block
    }

    /// Fold one hook's result into the aggregate.
    ///
    /// Returns true if the dispatch should short-circuit (block wins).
    pub fn fold(&mut self, hook_id: &str, result: HookResult) -> bool {
        self.executed.push(hook_id.to_string());
        self.suppress_output |= result.suppress_output;

        if let Some(message) = result.inject_message {
            self.injected_messages.push(message);
        }
        if let Some(data) = result.modified_data {
            self.merge_modified_data(data);
        }

        match result.decision {
            HookDecision::Block => {
                self.decision = HookDecision::Block;
                self.reason = result.reason.or_else(|| self.reason.take());
                true
            }
            HookDecision::Modify => {
                if self.decision != HookDecision::Block {
                    self.decision = HookDecision::Modify;
                }
                false
            }
            HookDecision::Continue => false,
        }
    }

    /// Force the aggregate to block (critical hook failure path)
    pub fn force_block(&mut self, hook_id: &str, reason: String) {
        self.executed.push(hook_id.to_string());
        self.decision = HookDecision::Block;
        self.reason = Some(reason);
    }

    fn merge_modified_data(&mut self, data: serde_json::Value) {
        match (&mut self.modified_data, data) {
            (Some(serde_json::Value::Object(existing)), serde_json::Value::Object(incoming)) => {
                for (key, value) in incoming {
                    existing.insert(key, value);
                }
            }
            (slot, data) => *slot = Some(data),
        }
    }
}

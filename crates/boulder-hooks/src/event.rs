//! Typed hook events and dispatch contexts
//!
//! Every dispatch carries a `HookPayload` — a tagged union with one variant
//! per event kind. Adding an event kind is a compile-time-checked change
//! everywhere payloads are consumed.

use boulder_core::Phase;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Fixed enumeration of hook event types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookEvent {
    ServerStart,
    ServerStop,
    ToolCall,
    ToolResult,
    ExpertCall,
    ExpertResult,
    WorkflowStart,
    WorkflowPhase,
    WorkflowEnd,
    LoopStart,
    LoopIteration,
    LoopEnd,
    Error,
    RateLimit,
}

impl std::fmt::Display for HookEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::ServerStart => "server_start",
            Self::ServerStop => "server_stop",
            Self::ToolCall => "tool_call",
            Self::ToolResult => "tool_result",
            Self::ExpertCall => "expert_call",
            Self::ExpertResult => "expert_result",
            Self::WorkflowStart => "workflow_start",
            Self::WorkflowPhase => "workflow_phase",
            Self::WorkflowEnd => "workflow_end",
            Self::LoopStart => "loop_start",
            Self::LoopIteration => "loop_iteration",
            Self::LoopEnd => "loop_end",
            Self::Error => "error",
            Self::RateLimit => "rate_limit",
        };
        write!(f, "{}", name)
    }
}

impl std::str::FromStr for HookEvent {
    type Err = String;

    /// Accepts snake_case (`expert_call`), camelCase (`expertCall`), and the
    /// legacy `onExpertCall` form used by JSON hook configuration files.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut normalized = String::with_capacity(s.len());
        let stripped = match s.strip_prefix("on") {
            Some(rest) if rest.starts_with(|c: char| c.is_ascii_uppercase()) => rest,
            _ => s,
        };
        for c in stripped.chars() {
            if c.is_ascii_uppercase() {
                if !normalized.is_empty() && !normalized.ends_with('_') {
                    normalized.push('_');
                }
                normalized.push(c.to_ascii_lowercase());
            } else {
                normalized.push(c);
            }
        }

        match normalized.as_str() {
            "server_start" => Ok(Self::ServerStart),
            "server_stop" => Ok(Self::ServerStop),
            "tool_call" => Ok(Self::ToolCall),
            "tool_result" => Ok(Self::ToolResult),
            "expert_call" => Ok(Self::ExpertCall),
            "expert_result" => Ok(Self::ExpertResult),
            "workflow_start" => Ok(Self::WorkflowStart),
            "workflow_phase" => Ok(Self::WorkflowPhase),
            "workflow_end" => Ok(Self::WorkflowEnd),
            "loop_start" => Ok(Self::LoopStart),
            "loop_iteration" => Ok(Self::LoopIteration),
            "loop_end" => Ok(Self::LoopEnd),
            "error" => Ok(Self::Error),
            "rate_limit" => Ok(Self::RateLimit),
            _ => Err(format!("Invalid hook event: {}", s)),
        }
    }
}

/// Typed payload for a single dispatch, one variant per event kind
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HookPayload {
    ServerStart,
    ServerStop {
        reason: Option<String>,
    },
    ToolCall {
        tool: String,
        arguments: serde_json::Value,
    },
    ToolResult {
        tool: String,
        success: bool,
        output: String,
    },
    ExpertCall {
        expert: String,
        model: String,
        prompt: String,
    },
    ExpertResult {
        expert: String,
        response: String,
        latency_ms: u64,
    },
    WorkflowStart {
        request: String,
    },
    WorkflowPhase {
        phase: Phase,
        boulder_id: Option<String>,
    },
    WorkflowEnd {
        success: bool,
        summary: Option<String>,
    },
    LoopStart {
        task_id: String,
    },
    LoopIteration {
        task_id: String,
        iteration: usize,
    },
    LoopEnd {
        task_id: String,
        iterations: usize,
    },
    Error {
        source: String,
        message: String,
    },
    RateLimit {
        expert: String,
        retry_after_secs: Option<u64>,
    },
}

impl HookPayload {
    /// Event tag for this payload
    pub fn event(&self) -> HookEvent {
        match self {
            Self::ServerStart => HookEvent::ServerStart,
            Self::ServerStop { .. } => HookEvent::ServerStop,
            Self::ToolCall { .. } => HookEvent::ToolCall,
            Self::ToolResult { .. } => HookEvent::ToolResult,
            Self::ExpertCall { .. } => HookEvent::ExpertCall,
            Self::ExpertResult { .. } => HookEvent::ExpertResult,
            Self::WorkflowStart { .. } => HookEvent::WorkflowStart,
            Self::WorkflowPhase { .. } => HookEvent::WorkflowPhase,
            Self::WorkflowEnd { .. } => HookEvent::WorkflowEnd,
            Self::LoopStart { .. } => HookEvent::LoopStart,
            Self::LoopIteration { .. } => HookEvent::LoopIteration,
            Self::LoopEnd { .. } => HookEvent::LoopEnd,
            Self::Error { .. } => HookEvent::Error,
            Self::RateLimit { .. } => HookEvent::RateLimit,
        }
    }

    /// Name that a hook's pattern filter matches against, when the event
    /// has one (tool name, expert id, task id, error source).
    pub fn subject(&self) -> Option<&str> {
        match self {
            Self::ToolCall { tool, .. } | Self::ToolResult { tool, .. } => Some(tool),
            Self::ExpertCall { expert, .. }
            | Self::ExpertResult { expert, .. }
            | Self::RateLimit { expert, .. } => Some(expert),
            Self::LoopStart { task_id }
            | Self::LoopIteration { task_id, .. }
            | Self::LoopEnd { task_id, .. } => Some(task_id),
            Self::Error { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Full context handed to every hook handler
///
/// Serialized as JSON onto an external hook's stdin.
#[derive(Debug, Clone, Serialize)]
pub struct HookContext {
    pub execution_id: String,
    pub timestamp: DateTime<Utc>,
    pub working_dir: PathBuf,
    #[serde(flatten)]
    pub payload: HookPayload,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_event_mapping() {
        let payload = HookPayload::ExpertCall {
            expert: "sonnet".to_string(),
            model: "m1".to_string(),
            prompt: "hi".to_string(),
        };
        assert_eq!(payload.event(), HookEvent::ExpertCall);
        assert_eq!(payload.subject(), Some("sonnet"));

        let payload = HookPayload::WorkflowPhase {
            phase: Phase::Intent,
            boulder_id: None,
        };
        assert_eq!(payload.event(), HookEvent::WorkflowPhase);
        assert_eq!(payload.subject(), None);
    }

    #[test]
    fn test_event_parsing_forms() {
        assert_eq!("expert_call".parse::<HookEvent>().unwrap(), HookEvent::ExpertCall);
        assert_eq!("expertCall".parse::<HookEvent>().unwrap(), HookEvent::ExpertCall);
        assert_eq!("onExpertCall".parse::<HookEvent>().unwrap(), HookEvent::ExpertCall);
        assert_eq!("onRateLimit".parse::<HookEvent>().unwrap(), HookEvent::RateLimit);
        assert_eq!("error".parse::<HookEvent>().unwrap(), HookEvent::Error);
        assert!("onSomethingElse".parse::<HookEvent>().is_err());
    }

    #[test]
    fn test_context_serializes_with_event_tag() {
        let context = HookContext {
            execution_id: "exec-1".to_string(),
            timestamp: Utc::now(),
            working_dir: PathBuf::from("/tmp/work"),
            payload: HookPayload::ToolCall {
                tool: "search".to_string(),
                arguments: serde_json::json!({"query": "rust"}),
            },
        };

        let json = serde_json::to_value(&context).unwrap();
        assert_eq!(json["event"], "tool_call");
        assert_eq!(json["tool"], "search");
        assert_eq!(json["execution_id"], "exec-1");
    }
}

//! External subprocess hooks
//!
//! An external hook is a shell command that receives the dispatch context as
//! JSON on stdin. Exit code 0 means continue (optionally with a JSON
//! `HookResult` on stdout), 1 means continue with a warning, 2 means block.
//! A timed-out hook is killed and the dispatch continues.

use boulder_core::{BoulderError, HookPriority, Result};
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::warn;

use crate::engine::HookHandler;
use crate::event::HookContext;
use crate::result::HookResult;

fn default_timeout_ms() -> u64 {
    10_000
}

/// Declaration of an external hook in configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalHookSpec {
    pub name: String,
    pub command: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub priority: HookPriority,
}

/// Handler that runs the configured shell command
pub struct ExternalHook {
    spec: ExternalHookSpec,
}

impl ExternalHook {
    pub fn new(spec: ExternalHookSpec) -> Self {
        Self { spec }
    }
}

#[async_trait::async_trait]
impl HookHandler for ExternalHook {
    async fn run(&self, context: &HookContext) -> Result<HookResult> {
        let payload = serde_json::to_string(context)?;

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.spec.command)
            .current_dir(&context.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BoulderError::Hook {
                hook: self.spec.name.clone(),
                message: format!("failed to spawn: {}", e),
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            // A hook that closes stdin early is fine
            let _ = stdin.write_all(payload.as_bytes()).await;
        }

        let timeout = Duration::from_millis(self.spec.timeout_ms);
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(output) => output.map_err(|e| BoulderError::Hook {
                hook: self.spec.name.clone(),
                message: format!("failed to wait: {}", e),
            })?,
            Err(_) => {
                // kill_on_drop reaps the child when the future is dropped
                warn!(
                    hook = %self.spec.name,
                    timeout_ms = self.spec.timeout_ms,
                    "External hook timed out, continuing"
                );
                return Ok(HookResult {
                    reason: Some(format!(
                        "external hook '{}' timed out after {}ms",
                        self.spec.name, self.spec.timeout_ms
                    )),
                    ..HookResult::default()
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        match output.status.code() {
            Some(0) => {
                let trimmed = stdout.trim();
                if trimmed.is_empty() {
                    return Ok(HookResult::proceed());
                }
                match serde_json::from_str::<HookResult>(trimmed) {
                    Ok(result) => Ok(result),
                    Err(e) => {
                        warn!(
                            hook = %self.spec.name,
                            "External hook stdout is not a valid result, continuing: {}", e
                        );
                        Ok(HookResult::proceed())
                    }
                }
            }
            Some(1) => Ok(HookResult {
                reason: Some(nonempty_or(
                    stderr.trim(),
                    format!("external hook '{}' reported a warning", self.spec.name),
                )),
                ..HookResult::default()
            }),
            Some(2) => Ok(HookResult::block(nonempty_or(
                stderr.trim(),
                format!("blocked by external hook '{}'", self.spec.name),
            ))),
            code => Ok(HookResult {
                reason: Some(format!(
                    "external hook '{}' exited with {:?}",
                    self.spec.name, code
                )),
                ..HookResult::default()
            }),
        }
    }
}

fn nonempty_or(text: &str, fallback: String) -> String {
    if text.is_empty() {
        fallback
    } else {
        text.to_string()
    }
}

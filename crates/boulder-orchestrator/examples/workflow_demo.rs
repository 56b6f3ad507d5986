//! Runs one workflow against a toy phase handler in a temp directory.
//!
//! ```text
//! cargo run --example workflow_demo
//! ```

use boulder_core::{HistoryConfig, Result, WorkflowConfig};
use boulder_hooks::{FnHook, HookDefinition, HookEngine, HookEvent, HookResult};
use boulder_orchestrator::{
    CancelToken, PhaseHandler, PhaseOutcome, PhaseRequest, ProgressHandle, WorkflowOrchestrator,
};
use boulder_state::BoulderStore;
use std::sync::Arc;

struct DemoHandler;

#[async_trait::async_trait]
impl PhaseHandler for DemoHandler {
    async fn run(
        &self,
        request: &PhaseRequest,
        _progress: &ProgressHandle,
    ) -> Result<PhaseOutcome> {
        Ok(PhaseOutcome::success(format!("{} handled", request.phase)).by_expert("demo"))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let dir = tempfile::tempdir()?;
    let hooks = Arc::new(HookEngine::new(dir.path()));
    hooks.register(HookDefinition::new(
        "phase-logger",
        HookEvent::WorkflowPhase,
        Arc::new(FnHook(|ctx: &boulder_hooks::HookContext| {
            tracing::info!("phase hook fired: {}", ctx.payload.event());
            Ok(HookResult::proceed())
        })),
    ));

    let store = Arc::new(BoulderStore::new(dir.path(), HistoryConfig::default()));
    let config = WorkflowConfig {
        poll_interval_ms: 50,
        min_stability_ms: 100,
        polls_required: 2,
        ..WorkflowConfig::default()
    };

    let orchestrator =
        WorkflowOrchestrator::new(config, hooks, store, Arc::new(DemoHandler));
    let report = orchestrator
        .run("demonstrate a full workflow pass", &CancelToken::new())
        .await?;

    println!("success: {}", report.success);
    println!("phases:  {:?}", report.phases_run);
    println!("output:  {:?}", report.final_output);
    Ok(())
}

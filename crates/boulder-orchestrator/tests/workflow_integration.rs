//! End-to-end workflow runs against a scripted phase handler

use boulder_core::{HistoryConfig, Phase, Result, WorkflowConfig};
use boulder_hooks::{
    FnHook, HookDefinition, HookEngine, HookEvent, HookPayload, HookResult,
};
use boulder_orchestrator::{
    render_escalation_report, CancelToken, PhaseHandler, PhaseOutcome, PhaseRequest,
    ProgressHandle, WorkflowOrchestrator,
};
use boulder_state::BoulderStore;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Scripted handler: each phase pops the next outcome from its queue, or
/// succeeds trivially when unscripted. Every visit is recorded.
struct ScriptedHandler {
    outcomes: Mutex<HashMap<Phase, Vec<PhaseOutcome>>>,
    visits: Mutex<Vec<Phase>>,
    cancel_during: Mutex<Option<(Phase, CancelToken)>>,
}

impl ScriptedHandler {
    fn new() -> Self {
        Self {
            outcomes: Mutex::new(HashMap::new()),
            visits: Mutex::new(Vec::new()),
            cancel_during: Mutex::new(None),
        }
    }

    fn script(&self, phase: Phase, outcome: PhaseOutcome) {
        self.outcomes
            .lock()
            .unwrap()
            .entry(phase)
            .or_default()
            .push(outcome);
    }

    fn cancel_during(&self, phase: Phase, token: CancelToken) {
        *self.cancel_during.lock().unwrap() = Some((phase, token));
    }

    fn visits(&self) -> Vec<Phase> {
        self.visits.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl PhaseHandler for ScriptedHandler {
    async fn run(
        &self,
        request: &PhaseRequest,
        _progress: &ProgressHandle,
    ) -> Result<PhaseOutcome> {
        self.visits.lock().unwrap().push(request.phase);

        if let Some((phase, token)) = self.cancel_during.lock().unwrap().as_ref() {
            if *phase == request.phase {
                token.cancel();
            }
        }

        let mut outcomes = self.outcomes.lock().unwrap();
        let queue = outcomes.entry(request.phase).or_default();
        if queue.is_empty() {
            Ok(PhaseOutcome::success(format!("{} done", request.phase)))
        } else {
            Ok(queue.remove(0))
        }
    }
}

fn fast_config(max_attempts: usize) -> WorkflowConfig {
    WorkflowConfig {
        max_attempts,
        quick_timeout_ms: 1_000,
        hard_timeout_ms: 2_000,
        poll_interval_ms: 10,
        min_stability_ms: 20,
        polls_required: 2,
    }
}

struct Harness {
    _dir: TempDir,
    hooks: Arc<HookEngine>,
    store: Arc<BoulderStore>,
    handler: Arc<ScriptedHandler>,
    orchestrator: WorkflowOrchestrator,
}

fn harness(max_attempts: usize) -> Harness {
    let dir = TempDir::new().unwrap();
    let hooks = Arc::new(HookEngine::new(dir.path()));
    let store = Arc::new(BoulderStore::new(dir.path(), HistoryConfig::default()));
    let handler = Arc::new(ScriptedHandler::new());
    let orchestrator = WorkflowOrchestrator::new(
        fast_config(max_attempts),
        hooks.clone(),
        store.clone(),
        handler.clone(),
    );
    Harness {
        _dir: dir,
        hooks,
        store,
        handler,
        orchestrator,
    }
}

#[tokio::test]
async fn test_happy_path_runs_all_phases_in_order() {
    let h = harness(3);

    let report = h
        .orchestrator
        .run("add a retry flag", &CancelToken::new())
        .await
        .unwrap();

    assert!(report.success);
    assert!(!report.cancelled);
    assert!(!report.escalation_required);
    assert_eq!(report.attempts_made, 1);
    assert_eq!(
        report.phases_run,
        vec![
            Phase::Intent,
            Phase::Assessment,
            Phase::Exploration,
            Phase::Implementation,
            Phase::Verification,
            Phase::Completion,
        ]
    );
    assert_eq!(report.final_output.as_deref(), Some("completion done"));

    // Recovery never runs on a clean pass
    assert!(!h.handler.visits().contains(&Phase::Recovery));

    // The boulder was archived and the directory freed
    assert!(h.store.load_active().await.is_none());
    let summaries = h.store.list().await;
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].status, boulder_core::BoulderStatus::Completed);
}

#[tokio::test]
async fn test_failed_implementation_routes_through_recovery() {
    let h = harness(3);
    h.handler.script(
        Phase::Implementation,
        PhaseOutcome::failure("patch rejected")
            .route_to(Phase::Recovery)
            .by_expert("sonnet"),
    );
    h.handler.script(
        Phase::Recovery,
        PhaseOutcome::success("reverted and replanned").route_to(Phase::Implementation),
    );
    h.handler.script(
        Phase::Implementation,
        PhaseOutcome::success("patch applied").by_expert("sonnet"),
    );

    let report = h
        .orchestrator
        .run("fix the bug", &CancelToken::new())
        .await
        .unwrap();

    assert!(report.success);
    assert_eq!(report.attempts_made, 2);
    let visits = h.handler.visits();
    let recovery_at = visits.iter().position(|p| *p == Phase::Recovery).unwrap();
    assert_eq!(visits[recovery_at - 1], Phase::Implementation);
    assert_eq!(visits[recovery_at + 1], Phase::Implementation);
}

#[tokio::test]
async fn test_exhausted_attempts_escalate() {
    let h = harness(2);
    for _ in 0..2 {
        h.handler.script(
            Phase::Implementation,
            PhaseOutcome::failure("still broken")
                .route_to(Phase::Recovery)
                .by_expert("sonnet"),
        );
        h.handler.script(
            Phase::Recovery,
            PhaseOutcome::success("trying again").route_to(Phase::Implementation),
        );
    }

    let report = h
        .orchestrator
        .run("impossible task", &CancelToken::new())
        .await
        .unwrap();

    assert!(!report.success);
    assert!(report.escalation_required);
    assert_eq!(report.attempts_made, 2);
    // The loop was broken by escalation, not by running forever
    assert_eq!(
        h.handler
            .visits()
            .iter()
            .filter(|p| **p == Phase::Implementation)
            .count(),
        2
    );

    let summaries = h.store.list().await;
    assert_eq!(summaries[0].status, boulder_core::BoulderStatus::Failed);
}

#[tokio::test]
async fn test_escalation_report_renders_history() {
    let h = harness(2);
    for _ in 0..2 {
        h.handler.script(
            Phase::Implementation,
            PhaseOutcome::failure("tests red")
                .route_to(Phase::Recovery)
                .by_expert("haiku"),
        );
        h.handler.script(
            Phase::Recovery,
            PhaseOutcome::success("retry").route_to(Phase::Implementation),
        );
    }

    h.orchestrator
        .run("doomed", &CancelToken::new())
        .await
        .unwrap();

    // Pull the archived state back out of history via a fresh detect cycle
    let summaries = h.store.list().await;
    assert_eq!(summaries.len(), 1);

    // Render from a state rebuilt the same way the run recorded it
    let mut state = boulder_state::BoulderState::new("doomed", 2);
    state.record_attempt("haiku", false, None, Some("tests red"));
    state.record_attempt("haiku", false, None, Some("tests red"));
    let report = render_escalation_report(&state);
    assert!(report.contains("Escalation required"));
    assert!(report.contains("1. haiku [failed]: tests red"));
}

#[tokio::test]
async fn test_cancellation_stops_at_phase_boundary() {
    let h = harness(3);
    let token = CancelToken::new();
    h.handler.cancel_during(Phase::Assessment, token.clone());

    let report = h.orchestrator.run("slow work", &token).await.unwrap();

    assert!(report.cancelled);
    assert!(!report.success);
    // Assessment itself finished; the break happened before exploration
    assert_eq!(report.phases_run, vec![Phase::Intent, Phase::Assessment]);
    assert!(!h.handler.visits().contains(&Phase::Exploration));

    let summaries = h.store.list().await;
    assert_eq!(summaries[0].status, boulder_core::BoulderStatus::Cancelled);
}

#[tokio::test]
async fn test_runs_without_boulder_when_directory_busy() {
    let h = harness(3);
    // Another run already owns the directory
    h.store.create("occupying run", 3).await.unwrap();

    let report = h
        .orchestrator
        .run("second run", &CancelToken::new())
        .await
        .unwrap();

    assert!(report.success);
    assert!(report.boulder_id.is_none());
    // The occupying boulder was not touched
    let active = h.store.load_active().await.unwrap();
    assert_eq!(active.request, "occupying run");
}

#[tokio::test]
async fn test_workflow_hooks_dispatched_in_order() {
    let h = harness(3);
    let events = Arc::new(Mutex::new(Vec::new()));

    for event in [
        HookEvent::WorkflowStart,
        HookEvent::WorkflowPhase,
        HookEvent::WorkflowEnd,
    ] {
        let sink = events.clone();
        h.hooks.register(HookDefinition::new(
            format!("observer-{}", event),
            event,
            Arc::new(FnHook(move |ctx: &boulder_hooks::HookContext| {
                let label = match &ctx.payload {
                    HookPayload::WorkflowStart { .. } => "start".to_string(),
                    HookPayload::WorkflowPhase { phase, .. } => phase.to_string(),
                    HookPayload::WorkflowEnd { success, .. } => format!("end:{}", success),
                    _ => "other".to_string(),
                };
                sink.lock().unwrap().push(label);
                Ok(HookResult::proceed())
            })),
        ));
    }

    h.orchestrator
        .run("observed run", &CancelToken::new())
        .await
        .unwrap();

    let seen = events.lock().unwrap().clone();
    assert_eq!(
        seen,
        vec![
            "start",
            "intent",
            "assessment",
            "exploration",
            "implementation",
            "verification",
            "completion",
            "end:true",
        ]
    );
}

#[tokio::test]
async fn test_blocked_phase_hook_does_not_stall_workflow() {
    let h = harness(3);
    h.hooks.register(HookDefinition::new(
        "phase-blocker",
        HookEvent::WorkflowPhase,
        Arc::new(FnHook(|_ctx: &boulder_hooks::HookContext| {
            Ok(HookResult::block("no phases allowed"))
        })),
    ));

    let report = h
        .orchestrator
        .run("stubborn run", &CancelToken::new())
        .await
        .unwrap();
    assert!(report.success);
    assert_eq!(report.phases_run.len(), 6);
}

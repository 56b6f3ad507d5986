//! Workflow orchestrator
//!
//! Drives the fixed phase sequence, checkpointing every phase to the state
//! store and dispatching hook events at each transition. The boulder record
//! is best-effort: failing to create one (say, another run is active in the
//! same directory) disables crash recovery for this run but never aborts
//! the workflow itself.

use boulder_core::{BoulderError, Phase, Result, WorkflowConfig};
use boulder_hooks::{HookEngine, HookPayload};
use boulder_state::BoulderStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::cancel::CancelToken;
use crate::phase_handler::{PhaseHandler, PhaseOutcome, PhaseRequest, ProgressHandle};
use crate::stability::{poll_until_stable, StabilityPolicy};

/// Final report for one workflow run
#[derive(Debug, Clone)]
pub struct WorkflowReport {
    pub success: bool,
    pub cancelled: bool,
    pub boulder_id: Option<String>,
    pub phases_run: Vec<Phase>,
    pub attempts_made: usize,
    pub escalation_required: bool,
    pub final_output: Option<String>,
}

pub struct WorkflowOrchestrator {
    config: WorkflowConfig,
    policy: StabilityPolicy,
    hooks: Arc<HookEngine>,
    store: Arc<BoulderStore>,
    handler: Arc<dyn PhaseHandler>,
}

impl WorkflowOrchestrator {
    pub fn new(
        config: WorkflowConfig,
        hooks: Arc<HookEngine>,
        store: Arc<BoulderStore>,
        handler: Arc<dyn PhaseHandler>,
    ) -> Self {
        let policy = StabilityPolicy::from_config(&config);
        Self {
            config,
            policy,
            hooks,
            store,
            handler,
        }
    }

    /// Run one workflow to completion
    pub async fn run(&self, request: &str, cancel: &CancelToken) -> Result<WorkflowReport> {
        self.hooks
            .dispatch(HookPayload::WorkflowStart {
                request: request.to_string(),
            })
            .await;

        let boulder_id = match self.store.create(request, self.config.max_attempts).await {
            Ok(state) => Some(state.id),
            Err(e) => {
                warn!("Running without crash recovery: {}", e);
                None
            }
        };

        let mut phases_run = Vec::new();
        let mut attempts_made = 0usize;
        let mut any_attempt_succeeded = false;
        let mut intent: Option<String> = None;
        let mut exploration_context: Option<String> = None;
        let mut final_output: Option<String> = None;
        let mut last_error: Option<String> = None;
        let mut cancelled = false;

        let mut phase = Phase::Intent;
        loop {
            // Cancellation is cooperative and only observed here, between
            // phases; a phase in flight is never interrupted.
            if cancel.is_cancelled() {
                info!(phase = %phase, "Workflow cancelled before phase");
                cancelled = true;
                break;
            }

            if boulder_id.is_some() {
                if let Err(e) = self.store.start_phase(phase).await {
                    warn!(phase = %phase, "Failed to start phase in store: {}", e);
                }
            }

            let gate = self
                .hooks
                .dispatch(HookPayload::WorkflowPhase {
                    phase,
                    boulder_id: boulder_id.clone(),
                })
                .await;
            if gate.blocked() {
                // Phase transition hooks are observational; a block here is
                // logged but cannot stall the state machine.
                warn!(
                    phase = %phase,
                    reason = gate.reason.as_deref().unwrap_or("unspecified"),
                    "Ignoring block on workflow phase hook"
                );
            }

            let phase_request = PhaseRequest {
                phase,
                request: request.to_string(),
                boulder_id: boulder_id.clone(),
                intent: intent.clone(),
                exploration_context: exploration_context.clone(),
                attempts_made,
            };
            let outcome = match self.execute_phase(&phase_request).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(phase = %phase, "Phase failed: {}", e);
                    let route = if phase == Phase::Implementation {
                        Phase::Recovery
                    } else {
                        Phase::Completion
                    };
                    PhaseOutcome::failure(e.to_string()).route_to(route)
                }
            };

            if boulder_id.is_some() {
                let output = (!outcome.output.is_empty()).then_some(outcome.output.as_str());
                if let Err(e) = self
                    .store
                    .checkpoint(phase, outcome.success, output, outcome.error.as_deref())
                    .await
                {
                    warn!(phase = %phase, "Failed to checkpoint phase: {}", e);
                }
            }

            match phase {
                Phase::Intent if outcome.success => {
                    intent = Some(outcome.output.clone());
                    if boulder_id.is_some() {
                        if let Err(e) = self.store.set_intent(&outcome.output).await {
                            warn!("Failed to store intent: {}", e);
                        }
                    }
                }
                Phase::Exploration if outcome.success => {
                    exploration_context = Some(outcome.output.clone());
                    if boulder_id.is_some() {
                        if let Err(e) = self
                            .store
                            .set_exploration(Some(&outcome.output), None)
                            .await
                        {
                            warn!("Failed to store exploration context: {}", e);
                        }
                    }
                }
                Phase::Implementation => {
                    attempts_made += 1;
                    any_attempt_succeeded |= outcome.success;
                    if boulder_id.is_some() {
                        if let Err(e) = self
                            .store
                            .record_attempt(
                                outcome.expert.as_deref().unwrap_or("unknown"),
                                outcome.success,
                                (!outcome.output.is_empty()).then_some(outcome.output.as_str()),
                                outcome.error.as_deref(),
                            )
                            .await
                        {
                            warn!("Failed to record attempt: {}", e);
                        }
                    }
                }
                Phase::Completion => {
                    if !outcome.output.is_empty() {
                        final_output = Some(outcome.output.clone());
                    }
                }
                _ => {}
            }
            if let Some(error) = &outcome.error {
                last_error = Some(error.clone());
            }
            phases_run.push(phase);

            let escalated = attempts_made >= self.config.max_attempts && !any_attempt_succeeded;
            let next = outcome.next_phase.or_else(|| phase.next());
            phase = match next {
                // Once attempts are exhausted, routing back into
                // implementation would loop forever; escalate instead.
                Some(Phase::Implementation) if escalated => {
                    warn!("Attempts exhausted, routing to completion for escalation");
                    Phase::Completion
                }
                Some(next) => next,
                None => break,
            };
        }

        let escalation_required = attempts_made >= self.config.max_attempts && !any_attempt_succeeded;
        let success = !cancelled
            && !escalation_required
            && attempts_made < self.config.max_attempts
            && phases_run.contains(&Phase::Completion);

        self.hooks
            .dispatch(HookPayload::WorkflowEnd {
                success,
                summary: final_output.clone(),
            })
            .await;

        if boulder_id.is_some() {
            let finalize = if cancelled {
                self.store.cancel().await
            } else if success {
                self.store.complete(final_output.as_deref()).await
            } else {
                self.store.fail(last_error.as_deref()).await
            };
            if let Err(e) = finalize {
                warn!("Failed to finalize boulder: {}", e);
            }
        }

        Ok(WorkflowReport {
            success,
            cancelled,
            boulder_id,
            phases_run,
            attempts_made,
            escalation_required,
            final_output,
        })
    }

    /// Execute one phase: quick phases race a flat timeout, long phases run
    /// detached under stability polling.
    async fn execute_phase(&self, request: &PhaseRequest) -> Result<PhaseOutcome> {
        let progress = ProgressHandle::new();

        if request.phase.is_long_running() {
            let handler = self.handler.clone();
            let detached_request = request.clone();
            let slot = progress.clone();
            tokio::spawn(async move {
                let outcome = match handler.run(&detached_request, &slot).await {
                    Ok(outcome) => outcome,
                    Err(e) => PhaseOutcome::failure(e.to_string()),
                };
                slot.publish(outcome);
            });
            poll_until_stable(request.phase, &progress, &self.policy).await
        } else {
            let quick = Duration::from_millis(self.config.quick_timeout_ms);
            match tokio::time::timeout(quick, self.handler.run(request, &progress)).await {
                Ok(result) => result,
                Err(_) => Err(BoulderError::PhaseTimeout(request.phase.to_string())),
            }
        }
    }
}

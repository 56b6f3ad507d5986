//! Boulder state data model
//!
//! A boulder is the persisted record of one in-flight workflow run, named
//! for the Sisyphus metaphor: if the process dies mid-push, the record on
//! disk lets the next process pick the boulder back up instead of starting
//! from the bottom of the hill.

use boulder_core::{truncate_capture, BoulderStatus, Phase};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current on-disk schema version
pub const SCHEMA_VERSION: u32 = 1;

/// Captured output and error text is truncated to this many characters
pub const MAX_CAPTURE_CHARS: usize = 2_000;

/// One phase attempt within a run
///
/// A phase re-entered later (recovery looping back to implementation) gets
/// a fresh checkpoint; the old one stays in the list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseCheckpoint {
    pub phase: Phase,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub success: Option<bool>,
    pub output: Option<String>,
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl PhaseCheckpoint {
    fn open(phase: Phase) -> Self {
        Self {
            phase,
            started_at: Utc::now(),
            completed_at: None,
            success: None,
            output: None,
            error: None,
            metadata: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.completed_at.is_none()
    }
}

/// One implementation attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImplementationAttempt {
    pub expert: String,
    pub success: bool,
    pub recorded_at: DateTime<Utc>,
    pub summary: Option<String>,
    pub error: Option<String>,
}

/// The persisted, crash-recoverable record of one workflow run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoulderState {
    pub id: String,
    pub schema_version: u32,
    pub status: BoulderStatus,
    pub request: String,
    pub intent: Option<String>,
    pub current_phase: Phase,
    pub checkpoints: Vec<PhaseCheckpoint>,
    pub implementation_attempts: Vec<ImplementationAttempt>,
    pub max_attempts: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub escalation_required: bool,
    pub escalation_reason: Option<String>,
    pub exploration_context: Option<String>,
    pub relevant_files: Option<Vec<String>>,
    pub final_output: Option<String>,
}

impl BoulderState {
    pub fn new(request: impl Into<String>, max_attempts: usize) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            schema_version: SCHEMA_VERSION,
            status: BoulderStatus::Active,
            request: request.into(),
            intent: None,
            current_phase: Phase::Intent,
            checkpoints: Vec::new(),
            implementation_attempts: Vec::new(),
            max_attempts,
            created_at: now,
            updated_at: now,
            completed_at: None,
            escalation_required: false,
            escalation_reason: None,
            exploration_context: None,
            relevant_files: None,
            final_output: None,
        }
    }

    /// Begin a phase: set the current phase and open a fresh checkpoint
    pub fn start_phase(&mut self, phase: Phase) {
        self.current_phase = phase;
        self.checkpoints.push(PhaseCheckpoint::open(phase));
        self.touch();
    }

    /// Stamp completion on the open checkpoint for a phase, creating one
    /// if the phase was never explicitly started.
    pub fn checkpoint(
        &mut self,
        phase: Phase,
        success: bool,
        output: Option<&str>,
        error: Option<&str>,
    ) {
        let slot = self
            .checkpoints
            .iter_mut()
            .rev()
            .find(|c| c.phase == phase && c.is_open());
        let checkpoint = match slot {
            Some(checkpoint) => checkpoint,
            None => {
                self.checkpoints.push(PhaseCheckpoint::open(phase));
                self.checkpoints
                    .last_mut()
                    .expect("checkpoint just pushed")
            }
        };

        checkpoint.completed_at = Some(Utc::now());
        checkpoint.success = Some(success);
        checkpoint.output = output.map(|o| truncate_capture(o, MAX_CAPTURE_CHARS));
        checkpoint.error = error.map(|e| truncate_capture(e, MAX_CAPTURE_CHARS));
        self.current_phase = phase;
        self.touch();
    }

    /// Append an implementation attempt.
    ///
    /// Reaching `max_attempts` without any success sets the escalation flag.
    pub fn record_attempt(
        &mut self,
        expert: impl Into<String>,
        success: bool,
        summary: Option<&str>,
        error: Option<&str>,
    ) {
        self.implementation_attempts.push(ImplementationAttempt {
            expert: expert.into(),
            success,
            recorded_at: Utc::now(),
            summary: summary.map(|s| truncate_capture(s, MAX_CAPTURE_CHARS)),
            error: error.map(|e| truncate_capture(e, MAX_CAPTURE_CHARS)),
        });

        if self.implementation_attempts.len() >= self.max_attempts
            && !self.implementation_attempts.iter().any(|a| a.success)
        {
            self.escalation_required = true;
            self.escalation_reason = Some(format!(
                "{} implementation attempts failed without a success",
                self.implementation_attempts.len()
            ));
        }
        self.touch();
    }

    pub fn attempts_made(&self) -> usize {
        self.implementation_attempts.len()
    }

    pub fn has_successful_attempt(&self) -> bool {
        self.implementation_attempts.iter().any(|a| a.success)
    }

    /// Human-readable suggestion shown when a crashed boulder is detected
    pub fn recovery_suggestion(&self) -> String {
        format!(
            "boulder {} crashed during {} ({} of {} attempts made); resume to continue from that phase, or cancel to discard it",
            self.id,
            self.current_phase,
            self.attempts_made(),
            self.max_attempts
        )
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Listing row: the active record first, then history
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoulderSummary {
    pub id: String,
    pub status: BoulderStatus,
    pub phase: Phase,
    pub attempts_made: usize,
    pub request: String,
    pub created_at: DateTime<Utc>,
}

impl BoulderSummary {
    pub fn of(state: &BoulderState) -> Self {
        Self {
            id: state.id.clone(),
            status: state.status,
            phase: state.current_phase,
            attempts_made: state.attempts_made(),
            request: truncate_capture(&state.request, 120),
            created_at: state.created_at,
        }
    }
}

//! On-disk boulder store
//!
//! File layout under the working directory:
//!
//! ```text
//! .boulder/boulder.json              active record (at most one)
//! .boulder/history/<ts>_<id>.json    archived terminal snapshots
//! ```
//!
//! Single-writer by assumption: there is no cross-process lock, and the
//! persistence files are never written by more than one process at a time.
//! Writes are fail-open — a disk error is logged and the in-memory
//! operation still succeeds.

use boulder_core::{BoulderError, BoulderStatus, HistoryConfig, Phase, Result};
use chrono::{Duration, Utc};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::state::{BoulderState, BoulderSummary};

const ACTIVE_FILE: &str = "boulder.json";
const HISTORY_DIR: &str = "history";

/// Crash-recoverable state store for one working directory
pub struct BoulderStore {
    state_dir: PathBuf,
    history: HistoryConfig,
}

impl BoulderStore {
    pub fn new(working_dir: impl AsRef<Path>, history: HistoryConfig) -> Self {
        Self {
            state_dir: working_dir.as_ref().join(".boulder"),
            history,
        }
    }

    fn active_path(&self) -> PathBuf {
        self.state_dir.join(ACTIVE_FILE)
    }

    fn history_dir(&self) -> PathBuf {
        self.state_dir.join(HISTORY_DIR)
    }

    /// Create a new active boulder.
    ///
    /// Fails if a non-terminal record already exists for this directory.
    pub async fn create(&self, request: &str, max_attempts: usize) -> Result<BoulderState> {
        if let Some(existing) = self.load_active().await {
            return Err(BoulderError::State(format!(
                "a boulder is already {} in this directory (id {}); complete, cancel, or resume it first",
                existing.status, existing.id
            )));
        }

        let state = BoulderState::new(request, max_attempts);
        info!(boulder_id = %state.id, "Created boulder");
        self.save(&state).await;
        Ok(state)
    }

    /// Load the active record, tolerating a missing or unreadable file
    pub async fn load_active(&self) -> Option<BoulderState> {
        let path = self.active_path();
        let data = match fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Failed to read {}: {}", path.display(), e);
                return None;
            }
        };
        match serde_json::from_slice(&data) {
            Ok(state) => Some(state),
            Err(e) => {
                warn!("Skipping invalid boulder file {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Set the current phase and open a fresh checkpoint for it
    pub async fn start_phase(&self, phase: Phase) -> Result<BoulderState> {
        let mut state = self.require_active().await?;
        state.start_phase(phase);
        self.save(&state).await;
        Ok(state)
    }

    /// Close (or create) the checkpoint for a phase with its outcome
    pub async fn checkpoint(
        &self,
        phase: Phase,
        success: bool,
        output: Option<&str>,
        error: Option<&str>,
    ) -> Result<BoulderState> {
        let mut state = self.require_active().await?;
        state.checkpoint(phase, success, output, error);
        self.save(&state).await;
        Ok(state)
    }

    /// Append an implementation attempt, possibly raising the escalation flag
    pub async fn record_attempt(
        &self,
        expert: &str,
        success: bool,
        summary: Option<&str>,
        error: Option<&str>,
    ) -> Result<BoulderState> {
        let mut state = self.require_active().await?;
        state.record_attempt(expert, success, summary, error);
        if state.escalation_required {
            warn!(boulder_id = %state.id, "Escalation required: attempts exhausted");
        }
        self.save(&state).await;
        Ok(state)
    }

    /// Store the classified intent for the run
    pub async fn set_intent(&self, intent: &str) -> Result<BoulderState> {
        let mut state = self.require_active().await?;
        state.intent = Some(intent.to_string());
        state.touch();
        self.save(&state).await;
        Ok(state)
    }

    /// Store exploration findings for later phases
    pub async fn set_exploration(
        &self,
        context: Option<&str>,
        relevant_files: Option<Vec<String>>,
    ) -> Result<BoulderState> {
        let mut state = self.require_active().await?;
        if let Some(context) = context {
            state.exploration_context = Some(context.to_string());
        }
        if relevant_files.is_some() {
            state.relevant_files = relevant_files;
        }
        state.touch();
        self.save(&state).await;
        Ok(state)
    }

    pub async fn complete(&self, final_output: Option<&str>) -> Result<BoulderState> {
        self.finalize(BoulderStatus::Completed, final_output).await
    }

    pub async fn fail(&self, reason: Option<&str>) -> Result<BoulderState> {
        self.finalize(BoulderStatus::Failed, reason).await
    }

    pub async fn cancel(&self) -> Result<BoulderState> {
        self.finalize(BoulderStatus::Cancelled, None).await
    }

    /// Detect a boulder left behind by a process that never reached a
    /// terminal state. An `active` record flips to `crashed` exactly once;
    /// an already-`crashed` record is returned unchanged.
    pub async fn detect_crashed(&self) -> Option<BoulderState> {
        let mut state = self.load_active().await?;
        match state.status {
            BoulderStatus::Active => {
                state.status = BoulderStatus::Crashed;
                state.touch();
                warn!(boulder_id = %state.id, "{}", state.recovery_suggestion());
                self.save(&state).await;
                Some(state)
            }
            BoulderStatus::Crashed => Some(state),
            _ => None,
        }
    }

    /// Flip a crashed boulder back to active for one continuation run
    pub async fn resume(&self) -> Result<BoulderState> {
        let mut state = self
            .load_active()
            .await
            .ok_or_else(|| BoulderError::State("no boulder to resume".to_string()))?;
        if state.status != BoulderStatus::Crashed {
            return Err(BoulderError::State(format!(
                "cannot resume a {} boulder",
                state.status
            )));
        }
        state.status = BoulderStatus::Active;
        state.touch();
        info!(boulder_id = %state.id, phase = %state.current_phase, "Resuming crashed boulder");
        self.save(&state).await;
        Ok(state)
    }

    /// List the active record (first) followed by history, newest first
    pub async fn list(&self) -> Vec<BoulderSummary> {
        let mut summaries = Vec::new();
        if let Some(active) = self.load_active().await {
            summaries.push(BoulderSummary::of(&active));
        }

        let mut archived = self.read_history().await;
        archived.sort_by(|a, b| b.0.cmp(&a.0));
        summaries.extend(archived.into_iter().map(|(_, state)| BoulderSummary::of(&state)));
        summaries
    }

    /// Drop archives beyond the max-count or older than the max-age
    pub async fn prune_history(&self) {
        let mut archived = self.read_history().await;
        archived.sort_by(|a, b| b.0.cmp(&a.0));

        let cutoff = Utc::now() - Duration::days(self.history.max_age_days);
        for (index, (name, state)) in archived.iter().enumerate() {
            let too_many = index >= self.history.max_count;
            let too_old = state.created_at < cutoff;
            if too_many || too_old {
                let path = self.history_dir().join(name);
                debug!("Pruning archived boulder {}", path.display());
                if let Err(e) = fs::remove_file(&path).await {
                    warn!("Failed to prune {}: {}", path.display(), e);
                }
            }
        }
    }

    async fn require_active(&self) -> Result<BoulderState> {
        let state = self
            .load_active()
            .await
            .ok_or_else(|| BoulderError::State("no active boulder".to_string()))?;
        if state.status.is_terminal() {
            return Err(BoulderError::State(format!(
                "boulder {} is already {}",
                state.id, state.status
            )));
        }
        Ok(state)
    }

    async fn finalize(
        &self,
        status: BoulderStatus,
        text: Option<&str>,
    ) -> Result<BoulderState> {
        let mut state = self.require_active().await?;
        state.status = status;
        state.completed_at = Some(Utc::now());
        match status {
            BoulderStatus::Completed => state.final_output = text.map(|t| t.to_string()),
            BoulderStatus::Failed => {
                if state.escalation_reason.is_none() {
                    state.escalation_reason = text.map(|t| t.to_string());
                }
            }
            _ => {}
        }
        state.touch();

        self.archive(&state).await;
        if let Err(e) = fs::remove_file(self.active_path()).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove active boulder file: {}", e);
            }
        }
        self.prune_history().await;
        info!(boulder_id = %state.id, status = %status, "Boulder finalized");
        Ok(state)
    }

    async fn archive(&self, state: &BoulderState) {
        let dir = self.history_dir();
        if let Err(e) = fs::create_dir_all(&dir).await {
            warn!("Failed to create history directory: {}", e);
            return;
        }
        let stamp = state
            .completed_at
            .unwrap_or_else(Utc::now)
            .to_rfc3339()
            .replace(':', "-");
        let path = dir.join(format!("{}_{}.json", stamp, state.id));
        match serde_json::to_vec_pretty(state) {
            Ok(data) => {
                if let Err(e) = fs::write(&path, data).await {
                    warn!("Failed to archive boulder: {}", e);
                }
            }
            Err(e) => warn!("Failed to serialize boulder for archive: {}", e),
        }
    }

    async fn read_history(&self) -> Vec<(String, BoulderState)> {
        let dir = self.history_dir();
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };

        let mut archived = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let data = match fs::read(&path).await {
                Ok(data) => data,
                Err(e) => {
                    warn!("Failed to read {}: {}", path.display(), e);
                    continue;
                }
            };
            match serde_json::from_slice::<BoulderState>(&data) {
                Ok(state) => {
                    let name = entry.file_name().to_string_lossy().into_owned();
                    archived.push((name, state));
                }
                Err(e) => warn!("Skipping invalid archive {}: {}", path.display(), e),
            }
        }
        archived
    }

    /// Fail-open write of the active record
    async fn save(&self, state: &BoulderState) {
        if let Err(e) = self.write_active(state).await {
            warn!(boulder_id = %state.id, "Failed to persist boulder (continuing): {}", e);
        }
    }

    async fn write_active(&self, state: &BoulderState) -> Result<()> {
        fs::create_dir_all(&self.state_dir).await?;
        let data = serde_json::to_vec_pretty(state)?;
        fs::write(self.active_path(), data).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> BoulderStore {
        BoulderStore::new(dir.path(), HistoryConfig::default())
    }

    #[tokio::test]
    async fn test_single_active_boulder() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        store.create("first", 3).await.unwrap();
        let err = store.create("second", 3).await.unwrap_err();
        assert!(matches!(err, BoulderError::State(_)));

        store.complete(Some("done")).await.unwrap();
        store.create("third", 3).await.unwrap();
    }

    #[tokio::test]
    async fn test_checkpoint_persists() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        store.create("r", 3).await.unwrap();
        store.start_phase(Phase::Assessment).await.unwrap();
        store
            .checkpoint(Phase::Assessment, true, Some("ok"), None)
            .await
            .unwrap();

        let loaded = store.load_active().await.unwrap();
        assert_eq!(loaded.current_phase, Phase::Assessment);
        assert_eq!(loaded.checkpoints.len(), 1);
        assert_eq!(loaded.checkpoints[0].success, Some(true));
    }

    #[tokio::test]
    async fn test_crash_detection_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let created = store.create("r", 3).await.unwrap();

        let crashed = store.detect_crashed().await.unwrap();
        assert_eq!(crashed.status, BoulderStatus::Crashed);
        assert_eq!(crashed.id, created.id);
        let first_update = crashed.updated_at;

        // Second detection returns the same record without re-flipping
        let again = store.detect_crashed().await.unwrap();
        assert_eq!(again.status, BoulderStatus::Crashed);
        assert_eq!(again.id, created.id);
        assert_eq!(again.updated_at, first_update);
    }

    #[tokio::test]
    async fn test_resume_flips_crashed_back() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        store.create("r", 3).await.unwrap();
        store.detect_crashed().await.unwrap();

        let resumed = store.resume().await.unwrap();
        assert_eq!(resumed.status, BoulderStatus::Active);

        // An active boulder cannot be resumed again
        assert!(store.resume().await.is_err());
    }

    #[tokio::test]
    async fn test_finalize_archives_and_clears() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let created = store.create("r", 3).await.unwrap();
        let completed = store.complete(Some("final answer")).await.unwrap();
        assert_eq!(completed.status, BoulderStatus::Completed);
        assert_eq!(completed.final_output.as_deref(), Some("final answer"));

        assert!(store.load_active().await.is_none());
        let summaries = store.list().await;
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].id, created.id);
        assert_eq!(summaries[0].status, BoulderStatus::Completed);
    }

    #[tokio::test]
    async fn test_list_puts_active_first() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        store.create("old run", 3).await.unwrap();
        store.fail(Some("broke")).await.unwrap();

        let active = store.create("current run", 3).await.unwrap();
        let summaries = store.list().await;
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].id, active.id);
        assert_eq!(summaries[0].status, BoulderStatus::Active);
        assert_eq!(summaries[1].status, BoulderStatus::Failed);
    }

    #[tokio::test]
    async fn test_history_pruned_by_count() {
        let dir = TempDir::new().unwrap();
        let store = BoulderStore::new(
            dir.path(),
            HistoryConfig {
                max_count: 2,
                max_age_days: 365,
            },
        );

        for i in 0..4 {
            store.create(&format!("run {}", i), 3).await.unwrap();
            store.complete(None).await.unwrap();
        }

        let summaries = store.list().await;
        assert_eq!(summaries.len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_active_file_treated_as_missing() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        std::fs::create_dir_all(dir.path().join(".boulder")).unwrap();
        std::fs::write(dir.path().join(".boulder/boulder.json"), "not json").unwrap();

        assert!(store.load_active().await.is_none());
        // And a fresh create succeeds over the corrupt file
        store.create("r", 3).await.unwrap();
    }

    #[tokio::test]
    async fn test_escalation_persists() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        store.create("r", 2).await.unwrap();
        store.record_attempt("a", false, None, Some("e1")).await.unwrap();
        let state = store.record_attempt("a", false, None, Some("e2")).await.unwrap();
        assert!(state.escalation_required);

        let loaded = store.load_active().await.unwrap();
        assert!(loaded.escalation_required);
    }
}

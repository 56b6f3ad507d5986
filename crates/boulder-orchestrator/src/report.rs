//! Escalation report rendering
//!
//! When a run exhausts its implementation attempts, the user gets one
//! structured report combining the phase history and the attempt history,
//! instead of having to read the raw boulder JSON.

use boulder_state::BoulderState;
use std::fmt::Write;

/// Render a human-readable escalation report for an exhausted run
pub fn render_escalation_report(state: &BoulderState) -> String {
    let mut report = String::new();

    let _ = writeln!(report, "Escalation required for boulder {}", state.id);
    let _ = writeln!(
        report,
        "Request: {}",
        state.request.lines().next().unwrap_or("")
    );
    if let Some(reason) = &state.escalation_reason {
        let _ = writeln!(report, "Reason: {}", reason);
    }

    let _ = writeln!(report, "\nPhase history:");
    for checkpoint in &state.checkpoints {
        let status = match checkpoint.success {
            Some(true) => "ok",
            Some(false) => "failed",
            None => "open",
        };
        let _ = write!(report, "  - {} [{}]", checkpoint.phase, status);
        if let Some(error) = &checkpoint.error {
            let _ = write!(report, ": {}", error.lines().next().unwrap_or(""));
        }
        let _ = writeln!(report);
    }

    let _ = writeln!(
        report,
        "\nImplementation attempts ({} of {} allowed):",
        state.attempts_made(),
        state.max_attempts
    );
    for (index, attempt) in state.implementation_attempts.iter().enumerate() {
        let status = if attempt.success { "ok" } else { "failed" };
        let _ = write!(report, "  {}. {} [{}]", index + 1, attempt.expert, status);
        if let Some(error) = &attempt.error {
            let _ = write!(report, ": {}", error.lines().next().unwrap_or(""));
        }
        let _ = writeln!(report);
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use boulder_core::Phase;

    #[test]
    fn test_report_lists_phases_and_attempts() {
        let mut state = BoulderState::new("fix the flaky test", 2);
        state.checkpoint(Phase::Intent, true, Some("bugfix"), None);
        state.checkpoint(Phase::Implementation, false, None, Some("patch rejected\ndetails"));
        state.record_attempt("sonnet", false, None, Some("patch rejected"));
        state.record_attempt("haiku", false, None, Some("tests still red"));
        assert!(state.escalation_required);

        let report = render_escalation_report(&state);
        assert!(report.contains("Escalation required"));
        assert!(report.contains("intent [ok]"));
        assert!(report.contains("implementation [failed]: patch rejected"));
        assert!(report.contains("1. sonnet [failed]"));
        assert!(report.contains("2. haiku [failed]: tests still red"));
        assert!(report.contains("2 of 2 allowed"));
    }
}

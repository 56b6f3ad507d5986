//! Stability polling for long-running phases
//!
//! A long phase's handler runs to completion in a spawned task while this
//! poll loop samples its latest published outcome. A result is accepted
//! only once the minimum stability time has elapsed and its signature
//! (success flag + output length) has stayed identical across the required
//! number of consecutive polls. Hitting the hard timeout returns whatever
//! result exists, stable or not; with no result at all the phase times out.

use boulder_core::{BoulderError, Phase, Result, WorkflowConfig};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::phase_handler::{PhaseOutcome, ProgressHandle};

/// Timing knobs for one poll loop
#[derive(Debug, Clone)]
pub struct StabilityPolicy {
    pub poll_interval: Duration,
    pub min_stability: Duration,
    pub polls_required: u32,
    pub hard_timeout: Duration,
}

impl StabilityPolicy {
    pub fn from_config(config: &WorkflowConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            min_stability: Duration::from_millis(config.min_stability_ms),
            polls_required: config.polls_required,
            hard_timeout: Duration::from_millis(config.hard_timeout_ms),
        }
    }
}

/// Poll the progress slot until the published outcome stabilizes
pub async fn poll_until_stable(
    phase: Phase,
    progress: &ProgressHandle,
    policy: &StabilityPolicy,
) -> Result<PhaseOutcome> {
    let started = Instant::now();
    let mut last_signature: Option<(bool, usize)> = None;
    let mut streak: u32 = 0;

    loop {
        tokio::time::sleep(policy.poll_interval).await;
        let elapsed = started.elapsed();

        if elapsed >= policy.hard_timeout {
            return match progress.snapshot() {
                Some(outcome) => {
                    warn!(
                        phase = %phase,
                        "Hard timeout reached, accepting unstable result"
                    );
                    Ok(outcome)
                }
                None => Err(BoulderError::PhaseTimeout(phase.to_string())),
            };
        }

        let Some(outcome) = progress.snapshot() else {
            continue;
        };
        if elapsed < policy.min_stability {
            continue;
        }

        let signature = outcome.signature();
        if last_signature == Some(signature) {
            streak += 1;
        } else {
            last_signature = Some(signature);
            streak = 1;
        }
        debug!(
            phase = %phase,
            streak,
            required = policy.polls_required,
            "Stability poll sample"
        );

        if streak >= policy.polls_required {
            return Ok(outcome);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_policy(hard_timeout_ms: u64) -> StabilityPolicy {
        StabilityPolicy {
            poll_interval: Duration::from_millis(10),
            min_stability: Duration::from_millis(20),
            polls_required: 3,
            hard_timeout: Duration::from_millis(hard_timeout_ms),
        }
    }

    #[tokio::test]
    async fn test_constant_result_accepted_before_hard_timeout() {
        let progress = ProgressHandle::new();
        progress.publish(PhaseOutcome::success("steady"));

        let started = Instant::now();
        let outcome = poll_until_stable(Phase::Implementation, &progress, &fast_policy(5_000))
            .await
            .unwrap();
        assert_eq!(outcome.output, "steady");
        // Accepted well before the 5s hard ceiling
        assert!(started.elapsed() < Duration::from_millis(1_000));
    }

    #[tokio::test]
    async fn test_changing_result_waits_for_hard_timeout() {
        let progress = ProgressHandle::new();
        let writer = progress.clone();
        let churn = tokio::spawn(async move {
            // Output length changes on every publish, so the signature
            // never repeats
            for i in 0usize.. {
                writer.publish(PhaseOutcome::success("x".repeat(i + 1)));
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        });

        let started = Instant::now();
        let outcome = poll_until_stable(Phase::Implementation, &progress, &fast_policy(200))
            .await
            .unwrap();
        churn.abort();

        assert!(started.elapsed() >= Duration::from_millis(200));
        assert!(outcome.success);
    }

    #[tokio::test]
    async fn test_no_result_at_hard_timeout_is_phase_timeout() {
        let progress = ProgressHandle::new();
        let err = poll_until_stable(Phase::Exploration, &progress, &fast_policy(100))
            .await
            .unwrap_err();
        assert!(matches!(err, BoulderError::PhaseTimeout(_)));
    }

    #[tokio::test]
    async fn test_result_settling_late_still_accepted() {
        let progress = ProgressHandle::new();
        let writer = progress.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            writer.publish(PhaseOutcome::success("late but stable"));
        });

        let outcome = poll_until_stable(Phase::Verification, &progress, &fast_policy(5_000))
            .await
            .unwrap();
        assert_eq!(outcome.output, "late but stable");
    }
}

use crate::db::models::{Attempt, ViolationRecord};
use crate::db::types::{AttemptState, FinalizeReason, ViolationKind};
use crate::repositories::store::StoreError;
use crate::services::engine::{AttemptEngine, AttemptError};
use crate::services::violation_policy::ViolationAction;

pub(crate) const MAX_DETAILS_LEN: usize = 500;
const MAX_KIND_LEN: usize = 64;
const MAX_APPEND_ROUNDS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ViolationOutcome {
    pub(crate) total_violations: usize,
    pub(crate) action: ViolationAction,
    pub(crate) state: AttemptState,
}

impl ViolationOutcome {
    fn unchanged(attempt: &Attempt) -> Self {
        Self {
            total_violations: attempt.violations.0.len(),
            action: ViolationAction::None,
            state: attempt.state,
        }
    }
}

fn validate(kind: &ViolationKind, details: Option<&str>) -> Result<(), AttemptError> {
    let raw = kind.as_str();
    let well_formed = !raw.is_empty()
        && raw.len() <= MAX_KIND_LEN
        && raw.chars().all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-');
    if !well_formed {
        return Err(AttemptError::Validation(
            "type must be a lowercase kebab-case identifier".to_string(),
        ));
    }

    if details.is_some_and(|details| details.chars().count() > MAX_DETAILS_LEN) {
        return Err(AttemptError::Validation(format!(
            "details must be at most {MAX_DETAILS_LEN} characters"
        )));
    }

    Ok(())
}

impl AttemptEngine {
    /// Appends an integrity signal and applies the escalation policy. Signals
    /// arriving after the attempt closed change nothing and are only audited.
    pub(crate) async fn log_violation(
        &self,
        student_id: &str,
        attempt_id: &str,
        kind: ViolationKind,
        details: Option<String>,
    ) -> Result<ViolationOutcome, AttemptError> {
        validate(&kind, details.as_deref())?;

        let mut attempt = self.load_owned(student_id, attempt_id).await?;
        for _ in 0..MAX_APPEND_ROUNDS {
            if attempt.state.is_terminal() {
                audit_late_signal(&attempt, &kind);
                return Ok(ViolationOutcome::unchanged(&attempt));
            }

            // Decide on the log as it will be after this append, so the write
            // that reaches the force threshold also closes the attempt.
            let record = ViolationRecord {
                kind: kind.clone(),
                occurred_at: self.clock.now(),
                details: details.clone(),
            };
            let expected_len = attempt.violations.0.len();
            let mut log = attempt.violations.0.clone();
            log.push(record.clone());
            let tally = self.policy.tally(&log);
            let action = self.policy.decide(&tally, &kind);
            let finalize =
                (action == ViolationAction::ForceSubmit).then_some(FinalizeReason::Violation);

            let Some(updated) =
                self.store.append_violation(attempt_id, &record, expected_len, finalize).await?
            else {
                attempt = self.reload_closed(attempt_id).await?;
                continue;
            };

            metrics::counter!("violations_logged_total", "type" => kind.as_str().to_string())
                .increment(1);
            tracing::info!(
                attempt_id,
                exam_id = %updated.exam_id,
                student_id,
                violation_type = kind.as_str(),
                total = tally.total,
                counted = tally.counted,
                action = action.as_str(),
                "Violation recorded"
            );

            if let Some(reason) = finalize {
                self.record_finalized(&updated, reason);
                self.hand_off(&updated);
            }

            return Ok(ViolationOutcome {
                total_violations: updated.violations.0.len(),
                action,
                state: updated.state,
            });
        }

        Err(StoreError::Contention("violation").into())
    }
}

fn audit_late_signal(attempt: &Attempt, kind: &ViolationKind) {
    tracing::info!(
        attempt_id = %attempt.id,
        exam_id = %attempt.exam_id,
        student_id = %attempt.student_id,
        violation_type = kind.as_str(),
        state = %attempt.state,
        "Violation received after attempt closed; not recorded"
    );
}

#[cfg(test)]
mod tests {
    use time::Duration;

    use super::*;
    use crate::core::time::Clock;
    use crate::repositories::store::AttemptStore;
    use crate::test_support::EngineFixture;

    #[tokio::test]
    async fn fifth_counted_violation_forces_submission() {
        let fixture = EngineFixture::new();
        let attempt_id = fixture.start("student-1").await.attempt.id;

        let mut actions = Vec::new();
        for _ in 0..5 {
            fixture.clock.advance(Duration::seconds(3));
            let outcome = fixture
                .engine
                .log_violation("student-1", &attempt_id, ViolationKind::TabSwitch, None)
                .await
                .expect("violation");
            actions.push((outcome.total_violations, outcome.action, outcome.state));
        }

        assert_eq!(actions[1], (2, ViolationAction::None, AttemptState::InProgress));
        assert_eq!(actions[2], (3, ViolationAction::Warn, AttemptState::InProgress));
        assert_eq!(actions[3], (4, ViolationAction::Warn, AttemptState::InProgress));
        assert_eq!(actions[4], (5, ViolationAction::ForceSubmit, AttemptState::AutoSubmitted));

        let stored = fixture.store.attempt(&attempt_id).expect("attempt");
        assert_eq!(stored.state, AttemptState::AutoSubmitted);
        assert_eq!(stored.finalize_reason, Some(FinalizeReason::Violation));
        assert_eq!(stored.violations.0.len(), 5);

        let handoffs = fixture.sink.wait_for(1).await;
        assert_eq!(handoffs[0].violations.len(), 5);
    }

    #[tokio::test]
    async fn racing_signals_at_the_threshold_force_submit_once() {
        let fixture = EngineFixture::new();
        let attempt_id = fixture.start("student-1").await.attempt.id;
        for _ in 0..4 {
            fixture
                .engine
                .log_violation("student-1", &attempt_id, ViolationKind::TabSwitch, None)
                .await
                .expect("violation");
        }
        fixture.clock.advance(Duration::seconds(30));

        let (first, second) = tokio::join!(
            fixture.engine.log_violation("student-1", &attempt_id, ViolationKind::Copy, None),
            fixture.engine.log_violation("student-1", &attempt_id, ViolationKind::Paste, None),
        );
        let actions = [first.expect("first").action, second.expect("second").action];
        assert_eq!(
            actions.iter().filter(|action| **action == ViolationAction::ForceSubmit).count(),
            1,
            "{actions:?}"
        );

        let stored = fixture.store.attempt(&attempt_id).expect("attempt");
        assert_eq!(stored.state, AttemptState::AutoSubmitted);
        assert_eq!(stored.violations.0.len(), 5);
        assert_eq!(stored.submitted_at, Some(stored.violations.0[4].occurred_at));
        assert_eq!(fixture.sink.wait_for(1).await.len(), 1);
    }

    #[tokio::test]
    async fn stale_log_length_is_not_appended() {
        let fixture = EngineFixture::new();
        let attempt_id = fixture.start("student-1").await.attempt.id;
        fixture
            .engine
            .log_violation("student-1", &attempt_id, ViolationKind::Copy, None)
            .await
            .expect("violation");

        let record = ViolationRecord {
            kind: ViolationKind::Paste,
            occurred_at: fixture.clock.now(),
            details: None,
        };
        let stale = fixture
            .store
            .append_violation(&attempt_id, &record, 0, Some(FinalizeReason::Violation))
            .await
            .expect("append");

        assert!(stale.is_none());
        let stored = fixture.store.attempt(&attempt_id).expect("attempt");
        assert_eq!(stored.violations.0.len(), 1);
        assert_eq!(stored.state, AttemptState::InProgress);
        assert_eq!(stored.submitted_at, None);
    }

    #[tokio::test]
    async fn violations_after_close_are_noops() {
        let fixture = EngineFixture::new();
        let attempt_id = fixture.start("student-1").await.attempt.id;
        fixture
            .engine
            .log_violation("student-1", &attempt_id, ViolationKind::Copy, Some("ctrl+c".into()))
            .await
            .expect("violation");
        fixture.engine.submit("student-1", &attempt_id).await.expect("submit");

        let outcome = fixture
            .engine
            .log_violation("student-1", &attempt_id, ViolationKind::Paste, None)
            .await
            .expect("late violation");

        assert_eq!(outcome.total_violations, 1);
        assert_eq!(outcome.action, ViolationAction::None);
        assert_eq!(outcome.state, AttemptState::Submitted);
        assert_eq!(fixture.store.attempt(&attempt_id).expect("attempt").violations.0.len(), 1);
    }

    #[tokio::test]
    async fn window_blur_is_logged_without_escalation() {
        let fixture = EngineFixture::new();
        let attempt_id = fixture.start("student-1").await.attempt.id;

        for _ in 0..7 {
            let outcome = fixture
                .engine
                .log_violation("student-1", &attempt_id, ViolationKind::WindowBlur, None)
                .await
                .expect("violation");
            assert_eq!(outcome.action, ViolationAction::None);
            assert_eq!(outcome.state, AttemptState::InProgress);
        }

        assert_eq!(fixture.store.attempt(&attempt_id).expect("attempt").violations.0.len(), 7);
    }

    #[tokio::test]
    async fn malformed_signals_are_rejected() {
        let fixture = EngineFixture::new();
        let attempt_id = fixture.start("student-1").await.attempt.id;

        let bad_kind = fixture
            .engine
            .log_violation("student-1", &attempt_id, ViolationKind::parse("Tab Switch"), None)
            .await;
        assert!(matches!(bad_kind, Err(AttemptError::Validation(_))));

        let long_details = fixture
            .engine
            .log_violation(
                "student-1",
                &attempt_id,
                ViolationKind::Copy,
                Some("d".repeat(MAX_DETAILS_LEN + 1)),
            )
            .await;
        assert!(matches!(long_details, Err(AttemptError::Validation(_))));
    }

    #[tokio::test]
    async fn unknown_kinds_are_counted() {
        let fixture = EngineFixture::new();
        let attempt_id = fixture.start("student-1").await.attempt.id;

        let mut last = None;
        for _ in 0..3 {
            last = Some(
                fixture
                    .engine
                    .log_violation("student-1", &attempt_id, ViolationKind::parse("devtools-open"), None)
                    .await
                    .expect("violation"),
            );
        }

        assert_eq!(last.map(|outcome| outcome.action), Some(ViolationAction::Warn));
    }
}

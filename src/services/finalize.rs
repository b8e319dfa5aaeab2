use crate::db::models::Attempt;
use crate::db::types::{AttemptState, FinalizeReason};
use crate::repositories::store::StoreError;
use crate::services::engine::{AttemptEngine, AttemptError};
use crate::services::evaluation::EvaluationHandoff;
use crate::services::timer;

const MAX_FINALIZE_ROUNDS: usize = 3;

#[derive(Debug, Clone)]
pub(crate) struct Finalized {
    pub(crate) attempt: Attempt,
    /// `true` only for the caller whose write moved the attempt out of `in_progress`.
    pub(crate) performed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Heartbeat {
    pub(crate) state: AttemptState,
    pub(crate) remaining_seconds: i64,
}

#[derive(Debug, Clone)]
pub(crate) struct SessionSnapshot {
    pub(crate) attempt: Attempt,
    pub(crate) remaining_seconds: i64,
    pub(crate) resumed: bool,
}

impl AttemptEngine {
    /// Moves the attempt to the terminal state for `reason` exactly once.
    /// Losing a race is not an error: the already-terminal record is returned.
    pub(crate) async fn finalize(
        &self,
        attempt_id: &str,
        reason: FinalizeReason,
    ) -> Result<Finalized, AttemptError> {
        for _ in 0..MAX_FINALIZE_ROUNDS {
            let now = self.clock.now();
            if let Some(attempt) = self.store.finalize(attempt_id, reason, now).await? {
                self.record_finalized(&attempt, reason);
                self.hand_off(&attempt);
                return Ok(Finalized { attempt, performed: true });
            }

            let current =
                self.store.find_attempt(attempt_id).await?.ok_or(AttemptError::AttemptNotFound)?;
            if current.state.is_terminal() {
                tracing::debug!(
                    attempt_id,
                    requested = reason.as_str(),
                    state = %current.state,
                    "Attempt already finalized"
                );
                return Ok(Finalized { attempt: current, performed: false });
            }
        }

        Err(StoreError::Contention("finalize").into())
    }

    pub(crate) async fn submit(
        &self,
        student_id: &str,
        attempt_id: &str,
    ) -> Result<Finalized, AttemptError> {
        let attempt = self.load_owned(student_id, attempt_id).await?;
        if attempt.state.is_terminal() {
            return Ok(Finalized { attempt, performed: false });
        }

        self.finalize(attempt_id, FinalizeReason::Explicit).await
    }

    pub(crate) async fn heartbeat(
        &self,
        student_id: &str,
        attempt_id: &str,
    ) -> Result<Heartbeat, AttemptError> {
        let mut attempt = self.load_owned(student_id, attempt_id).await?;
        let now = self.clock.now();

        if !attempt.state.is_terminal() && !self.store.touch(attempt_id, now).await? {
            attempt = self.reload_closed(attempt_id).await?;
        }

        Ok(Heartbeat { state: attempt.state, remaining_seconds: timer::remaining_for(&attempt, now) })
    }

    pub(crate) async fn view(
        &self,
        student_id: &str,
        attempt_id: &str,
    ) -> Result<SessionSnapshot, AttemptError> {
        let attempt = self.load_owned(student_id, attempt_id).await?;
        let remaining_seconds = timer::remaining_for(&attempt, self.clock.now());
        Ok(SessionSnapshot { attempt, remaining_seconds, resumed: true })
    }

    pub(super) fn record_finalized(&self, attempt: &Attempt, reason: FinalizeReason) {
        let submitted_at = attempt.submitted_at.unwrap_or_else(|| self.clock.now());
        metrics::counter!("attempts_finalized_total", "reason" => reason.as_str()).increment(1);
        metrics::histogram!("attempt_duration_used_seconds")
            .record(timer::seconds_used(attempt, submitted_at));

        tracing::info!(
            attempt_id = %attempt.id,
            exam_id = %attempt.exam_id,
            student_id = %attempt.student_id,
            reason = reason.as_str(),
            state = %attempt.state,
            answers = attempt.answers.0.len(),
            violations = attempt.violations.0.len(),
            "Attempt finalized"
        );
    }

    /// Fire-and-forget delivery; a failed handoff never reopens the attempt.
    pub(super) fn hand_off(&self, attempt: &Attempt) {
        let Some(handoff) = EvaluationHandoff::from_attempt(attempt) else {
            tracing::error!(attempt_id = %attempt.id, "Finalized attempt is missing terminal fields");
            return;
        };

        let sink = self.evaluation.clone();
        tokio::spawn(async move {
            match sink.deliver(&handoff).await {
                Ok(()) => {
                    metrics::counter!("evaluation_handoffs_total", "status" => "delivered")
                        .increment(1);
                }
                Err(err) => {
                    metrics::counter!("evaluation_handoffs_total", "status" => "failed")
                        .increment(1);
                    tracing::error!(
                        attempt_id = %handoff.attempt_id,
                        exam_id = %handoff.exam_id,
                        error = %err,
                        "Evaluation handoff failed"
                    );
                }
            }
        });
    }
}

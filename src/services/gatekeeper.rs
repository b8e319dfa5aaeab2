use time::PrimitiveDateTime;
use uuid::Uuid;

use crate::db::models::Exam;
use crate::repositories::attempts::NewAttempt;
use crate::repositories::store::StoreError;
use crate::services::engine::{AttemptEngine, AttemptError};
use crate::services::finalize::SessionSnapshot;
use crate::services::timer;

/// Bounded re-read loop for concurrent starts racing on the unique indexes.
const MAX_START_ROUNDS: usize = 4;

fn ensure_open(exam: &Exam, now: PrimitiveDateTime) -> Result<(), AttemptError> {
    if !exam.status.is_student_visible() {
        return Err(AttemptError::ExamNotAvailable("exam is not open to students"));
    }
    if now < exam.start_time {
        return Err(AttemptError::ExamNotAvailable("exam has not started yet"));
    }
    if now > exam.end_time {
        return Err(AttemptError::ExamNotAvailable("exam window has closed"));
    }
    Ok(())
}

impl AttemptEngine {
    /// Resumes the student's open attempt or opens the next one.
    pub(crate) async fn start(
        &self,
        student_id: &str,
        exam_id: &str,
    ) -> Result<SessionSnapshot, AttemptError> {
        let exam = self.store.find_exam(exam_id).await?.ok_or(AttemptError::ExamNotFound)?;

        for _ in 0..MAX_START_ROUNDS {
            if let Some(active) = self.store.find_active(exam_id, student_id).await? {
                let active = self.enforce_deadline(active).await?;
                if !active.state.is_terminal() {
                    metrics::counter!("attempts_resumed_total").increment(1);
                    tracing::info!(
                        attempt_id = %active.id,
                        exam_id,
                        student_id,
                        attempt_number = active.attempt_number,
                        "Resuming active attempt"
                    );
                    let remaining_seconds = timer::remaining_for(&active, self.clock.now());
                    return Ok(SessionSnapshot { attempt: active, remaining_seconds, resumed: true });
                }
            }

            let now = self.clock.now();
            ensure_open(&exam, now)?;

            let used = self.store.count_terminal(exam_id, student_id).await?;
            if used >= i64::from(exam.attempts_allowed) {
                return Err(AttemptError::AttemptsExhausted { allowed: exam.attempts_allowed });
            }

            let paper = self
                .store
                .find_paper(exam_id, student_id)
                .await?
                .ok_or(AttemptError::PaperNotReady)?;

            let attempt_id = Uuid::new_v4().to_string();
            let attempt_number = i32::try_from(used + 1)
                .map_err(|_| AttemptError::AttemptsExhausted { allowed: exam.attempts_allowed })?;
            let created = self
                .store
                .insert_attempt(NewAttempt {
                    id: &attempt_id,
                    exam_id,
                    student_id,
                    attempt_number,
                    started_at: now,
                    duration_seconds: exam.duration_seconds,
                    paper_snapshot: &paper,
                })
                .await?;

            match created {
                Some(attempt) => {
                    metrics::counter!("attempts_started_total").increment(1);
                    tracing::info!(
                        attempt_id = %attempt.id,
                        exam_id,
                        student_id,
                        attempt_number,
                        duration_seconds = attempt.duration_seconds,
                        "Attempt started"
                    );
                    let remaining_seconds = timer::remaining_for(&attempt, now);
                    return Ok(SessionSnapshot { attempt, remaining_seconds, resumed: false });
                }
                None => {
                    metrics::counter!("attempt_state_conflicts_total", "operation" => "start")
                        .increment(1);
                    tracing::debug!(exam_id, student_id, "Concurrent start detected; re-reading");
                }
            }
        }

        Err(StoreError::Contention("start").into())
    }
}

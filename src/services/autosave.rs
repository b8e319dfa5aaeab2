use time::PrimitiveDateTime;

use crate::db::models::SavedAnswer;
use crate::services::engine::{AttemptEngine, AttemptError};
use crate::services::timer;

pub(crate) const MAX_QUESTION_ID_LEN: usize = 128;
pub(crate) const MAX_ANSWER_LEN: usize = 10_000;

#[derive(Debug, Clone)]
pub(crate) struct SaveAnswer<'a> {
    pub(crate) attempt_id: &'a str,
    pub(crate) question_id: &'a str,
    pub(crate) value: &'a str,
    pub(crate) question_index: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct AnswerAck {
    pub(crate) saved_at: PrimitiveDateTime,
    pub(crate) remaining_seconds: i64,
}

fn validate(command: &SaveAnswer<'_>) -> Result<(), AttemptError> {
    let question_id = command.question_id.trim();
    if question_id.is_empty() {
        return Err(AttemptError::Validation("questionId must not be empty".to_string()));
    }
    if question_id.chars().count() > MAX_QUESTION_ID_LEN {
        return Err(AttemptError::Validation(format!(
            "questionId must be at most {MAX_QUESTION_ID_LEN} characters"
        )));
    }
    if command.value.chars().count() > MAX_ANSWER_LEN {
        return Err(AttemptError::Validation(format!(
            "answer must be at most {MAX_ANSWER_LEN} characters"
        )));
    }
    if command.question_index < 0 {
        return Err(AttemptError::Validation("questionIndex must be non-negative".to_string()));
    }
    Ok(())
}

impl AttemptEngine {
    /// Last-write-wins upsert of one answer. Replaying the same save is harmless.
    pub(crate) async fn save_answer(
        &self,
        student_id: &str,
        command: SaveAnswer<'_>,
    ) -> Result<AnswerAck, AttemptError> {
        validate(&command)?;

        let attempt = self.load_owned(student_id, command.attempt_id).await?;
        if attempt.state.is_terminal() {
            metrics::counter!("attempt_state_conflicts_total", "operation" => "answer")
                .increment(1);
            return Err(AttemptError::AttemptClosed { state: attempt.state });
        }

        if !attempt.paper_snapshot.0.contains_question(command.question_id) {
            return Err(AttemptError::Validation(format!(
                "question {} is not part of this paper",
                command.question_id
            )));
        }

        let now = self.clock.now();
        let answer = SavedAnswer {
            value: command.value.to_string(),
            saved_at: now,
            question_index: command.question_index,
        };

        if !self.store.upsert_answer(command.attempt_id, command.question_id, &answer).await? {
            let current = self.reload_closed(command.attempt_id).await?;
            metrics::counter!("attempt_state_conflicts_total", "operation" => "answer")
                .increment(1);
            tracing::info!(
                attempt_id = command.attempt_id,
                question_id = command.question_id,
                state = %current.state,
                "Answer rejected; attempt closed while saving"
            );
            return Err(AttemptError::AttemptClosed { state: current.state });
        }

        metrics::counter!("answers_saved_total").increment(1);
        tracing::debug!(
            attempt_id = command.attempt_id,
            question_id = command.question_id,
            question_index = command.question_index,
            "Answer saved"
        );

        Ok(AnswerAck {
            saved_at: now,
            remaining_seconds: timer::remaining_seconds(
                attempt.started_at,
                attempt.duration_seconds,
                now,
            ),
        })
    }
}

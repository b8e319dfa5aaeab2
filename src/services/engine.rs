use std::sync::Arc;

use thiserror::Error;

use crate::core::time::Clock;
use crate::db::models::Attempt;
use crate::db::types::{AttemptState, FinalizeReason};
use crate::repositories::store::{AttemptStore, StoreError};
use crate::services::evaluation::EvaluationSink;
use crate::services::timer;
use crate::services::violation_policy::ViolationPolicy;

#[derive(Debug, Error)]
pub(crate) enum AttemptError {
    #[error("{0}")]
    Validation(String),
    #[error("Exam not found")]
    ExamNotFound,
    #[error("Attempt not found")]
    AttemptNotFound,
    #[error("Attempt belongs to another student")]
    Forbidden,
    #[error("Exam is not available: {0}")]
    ExamNotAvailable(&'static str),
    #[error("Attempt is already {state}")]
    AttemptClosed { state: AttemptState },
    #[error("All {allowed} allowed attempts have been used")]
    AttemptsExhausted { allowed: i32 },
    #[error("Paper has not been prepared for this student yet")]
    PaperNotReady,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Owns the attempt lifecycle. Stateless apart from its collaborators: every
/// decision is made against a fresh read of the store.
#[derive(Clone)]
pub(crate) struct AttemptEngine {
    pub(super) store: Arc<dyn AttemptStore>,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) evaluation: Arc<dyn EvaluationSink>,
    pub(super) policy: ViolationPolicy,
}

impl AttemptEngine {
    pub(crate) fn new(
        store: Arc<dyn AttemptStore>,
        clock: Arc<dyn Clock>,
        evaluation: Arc<dyn EvaluationSink>,
        policy: ViolationPolicy,
    ) -> Self {
        Self { store, clock, evaluation, policy }
    }

    pub(crate) fn store(&self) -> &dyn AttemptStore {
        self.store.as_ref()
    }

    /// Loads an attempt for `student_id`, then applies the lazy deadline.
    pub(super) async fn load_owned(
        &self,
        student_id: &str,
        attempt_id: &str,
    ) -> Result<Attempt, AttemptError> {
        let attempt =
            self.store.find_attempt(attempt_id).await?.ok_or(AttemptError::AttemptNotFound)?;

        if !attempt.is_owned_by(student_id) {
            tracing::warn!(attempt_id, student_id, "Attempt access by non-owner rejected");
            return Err(AttemptError::Forbidden);
        }

        self.enforce_deadline(attempt).await
    }

    /// Finalizes an open attempt whose time has run out. Returns the attempt
    /// as it stands afterwards.
    pub(crate) async fn enforce_deadline(&self, attempt: Attempt) -> Result<Attempt, AttemptError> {
        if attempt.state.is_terminal() || !timer::is_expired(&attempt, self.clock.now()) {
            return Ok(attempt);
        }

        tracing::info!(
            attempt_id = %attempt.id,
            exam_id = %attempt.exam_id,
            student_id = %attempt.student_id,
            "Attempt time elapsed; finalizing on access"
        );

        let finalized = self.finalize(&attempt.id, FinalizeReason::Timeout).await?;
        Ok(finalized.attempt)
    }

    /// Re-read after a conditional write was refused.
    pub(super) async fn reload_closed(&self, attempt_id: &str) -> Result<Attempt, AttemptError> {
        let attempt =
            self.store.find_attempt(attempt_id).await?.ok_or(AttemptError::AttemptNotFound)?;
        self.enforce_deadline(attempt).await
    }
}

use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use time::PrimitiveDateTime;

use crate::db::models::{Attempt, Exam, Paper, SavedAnswer, ViolationRecord};
use crate::db::types::FinalizeReason;
use crate::repositories::{
    attempts::{self, AttemptCounts, AttemptRef, DuplicateActive, NewAttempt},
    exams, papers,
};

#[derive(Debug, Error)]
pub(crate) enum StoreError {
    #[error("attempt store is unavailable")]
    Unavailable(#[source] sqlx::Error),
    #[error("attempt store query failed")]
    Query(#[source] sqlx::Error),
    #[error("attempt store did not converge: {0}")]
    Contention(&'static str),
}

impl StoreError {
    /// Connectivity problems the caller may retry.
    pub(crate) fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Contention(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => Self::Unavailable(err),
            other => Self::Query(other),
        }
    }
}

/// Persistence seam of the attempt engine. Every mutation is a single
/// conditional write against one attempt document.
#[async_trait]
pub(crate) trait AttemptStore: Send + Sync {
    async fn ping(&self) -> Result<(), StoreError>;

    async fn find_exam(&self, exam_id: &str) -> Result<Option<Exam>, StoreError>;

    async fn find_paper(&self, exam_id: &str, student_id: &str)
        -> Result<Option<Paper>, StoreError>;

    async fn find_attempt(&self, attempt_id: &str) -> Result<Option<Attempt>, StoreError>;

    async fn find_active(
        &self,
        exam_id: &str,
        student_id: &str,
    ) -> Result<Option<Attempt>, StoreError>;

    async fn count_terminal(&self, exam_id: &str, student_id: &str) -> Result<i64, StoreError>;

    /// `None` when a uniqueness rule rejected the insert.
    async fn insert_attempt(&self, attempt: NewAttempt<'_>) -> Result<Option<Attempt>, StoreError>;

    /// `false` when the attempt is closed or past its deadline at `answer.saved_at`.
    async fn upsert_answer(
        &self,
        attempt_id: &str,
        question_id: &str,
        answer: &SavedAnswer,
    ) -> Result<bool, StoreError>;

    /// Appends `record` if the log still has `expected_len` entries, closing
    /// the attempt in the same write when `finalize` is set. `None` when the
    /// attempt is closed, past its deadline, or the log moved on.
    async fn append_violation(
        &self,
        attempt_id: &str,
        record: &ViolationRecord,
        expected_len: usize,
        finalize: Option<FinalizeReason>,
    ) -> Result<Option<Attempt>, StoreError>;

    async fn touch(&self, attempt_id: &str, now: PrimitiveDateTime) -> Result<bool, StoreError>;

    /// Returns the finalized attempt only to the caller whose write applied.
    async fn finalize(
        &self,
        attempt_id: &str,
        reason: FinalizeReason,
        now: PrimitiveDateTime,
    ) -> Result<Option<Attempt>, StoreError>;

    async fn list_expired(
        &self,
        now: PrimitiveDateTime,
        limit: i64,
    ) -> Result<Vec<AttemptRef>, StoreError>;

    async fn duplicate_active(&self) -> Result<Vec<DuplicateActive>, StoreError>;

    async fn orphaned(&self) -> Result<Vec<AttemptRef>, StoreError>;

    async fn counts(&self) -> Result<AttemptCounts, StoreError>;
}

#[derive(Clone)]
pub(crate) struct PgAttemptStore {
    pool: PgPool,
}

impl PgAttemptStore {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AttemptStore for PgAttemptStore {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn find_exam(&self, exam_id: &str) -> Result<Option<Exam>, StoreError> {
        Ok(exams::find_by_id(&self.pool, exam_id).await?)
    }

    async fn find_paper(
        &self,
        exam_id: &str,
        student_id: &str,
    ) -> Result<Option<Paper>, StoreError> {
        Ok(papers::find_for_student(&self.pool, exam_id, student_id).await?)
    }

    async fn find_attempt(&self, attempt_id: &str) -> Result<Option<Attempt>, StoreError> {
        Ok(attempts::find_by_id(&self.pool, attempt_id).await?)
    }

    async fn find_active(
        &self,
        exam_id: &str,
        student_id: &str,
    ) -> Result<Option<Attempt>, StoreError> {
        Ok(attempts::find_active(&self.pool, exam_id, student_id).await?)
    }

    async fn count_terminal(&self, exam_id: &str, student_id: &str) -> Result<i64, StoreError> {
        Ok(attempts::count_terminal(&self.pool, exam_id, student_id).await?)
    }

    async fn insert_attempt(&self, attempt: NewAttempt<'_>) -> Result<Option<Attempt>, StoreError> {
        Ok(attempts::create(&self.pool, attempt).await?)
    }

    async fn upsert_answer(
        &self,
        attempt_id: &str,
        question_id: &str,
        answer: &SavedAnswer,
    ) -> Result<bool, StoreError> {
        Ok(attempts::upsert_answer(&self.pool, attempt_id, question_id, answer).await?)
    }

    async fn append_violation(
        &self,
        attempt_id: &str,
        record: &ViolationRecord,
        expected_len: usize,
        finalize: Option<FinalizeReason>,
    ) -> Result<Option<Attempt>, StoreError> {
        let expected_len = i32::try_from(expected_len).unwrap_or(i32::MAX);
        Ok(attempts::append_violation(&self.pool, attempt_id, record, expected_len, finalize)
            .await?)
    }

    async fn touch(&self, attempt_id: &str, now: PrimitiveDateTime) -> Result<bool, StoreError> {
        Ok(attempts::touch(&self.pool, attempt_id, now).await?)
    }

    async fn finalize(
        &self,
        attempt_id: &str,
        reason: FinalizeReason,
        now: PrimitiveDateTime,
    ) -> Result<Option<Attempt>, StoreError> {
        Ok(attempts::finalize(&self.pool, attempt_id, reason, now).await?)
    }

    async fn list_expired(
        &self,
        now: PrimitiveDateTime,
        limit: i64,
    ) -> Result<Vec<AttemptRef>, StoreError> {
        Ok(attempts::list_expired(&self.pool, now, limit).await?)
    }

    async fn duplicate_active(&self) -> Result<Vec<DuplicateActive>, StoreError> {
        Ok(attempts::duplicate_active(&self.pool).await?)
    }

    async fn orphaned(&self) -> Result<Vec<AttemptRef>, StoreError> {
        Ok(attempts::orphaned(&self.pool).await?)
    }

    async fn counts(&self) -> Result<AttemptCounts, StoreError> {
        Ok(attempts::counts(&self.pool).await?)
    }
}

use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use time::PrimitiveDateTime;

use crate::db::models::{Attempt, Paper, SavedAnswer, ViolationRecord};
use crate::db::types::{AttemptState, FinalizeReason};

pub(crate) const COLUMNS: &str = "\
    id, exam_id, student_id, attempt_number, state, started_at, duration_seconds, \
    submitted_at, finalize_reason, answers, violations, paper_snapshot, last_active_at, \
    created_at, updated_at";

/// Row-level guard shared by every mutation: the attempt is open and its
/// duration has not lapsed at the supplied instant.
const OPEN_AT: &str = "\
    state = 'in_progress' \
    AND started_at + make_interval(secs => duration_seconds) > $NOW";

pub(crate) struct NewAttempt<'a> {
    pub(crate) id: &'a str,
    pub(crate) exam_id: &'a str,
    pub(crate) student_id: &'a str,
    pub(crate) attempt_number: i32,
    pub(crate) started_at: PrimitiveDateTime,
    pub(crate) duration_seconds: i32,
    pub(crate) paper_snapshot: &'a Paper,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub(crate) struct AttemptRef {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) student_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub(crate) struct DuplicateActive {
    pub(crate) exam_id: String,
    pub(crate) student_id: String,
    pub(crate) active_count: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, FromRow)]
pub(crate) struct AttemptCounts {
    pub(crate) total: i64,
    pub(crate) in_progress: i64,
    pub(crate) submitted: i64,
    pub(crate) auto_submitted: i64,
    pub(crate) oldest_active_started_at: Option<PrimitiveDateTime>,
}

fn open_at(placeholder: &str) -> String {
    OPEN_AT.replace("$NOW", placeholder)
}

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Attempt>, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!("SELECT {COLUMNS} FROM exam_attempts WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub(crate) async fn find_active(
    pool: &PgPool,
    exam_id: &str,
    student_id: &str,
) -> Result<Option<Attempt>, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!(
        "SELECT {COLUMNS} FROM exam_attempts \
         WHERE exam_id = $1 AND student_id = $2 AND state = $3"
    ))
    .bind(exam_id)
    .bind(student_id)
    .bind(AttemptState::InProgress)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn count_terminal(
    pool: &PgPool,
    exam_id: &str,
    student_id: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT COUNT(*) FROM exam_attempts \
         WHERE exam_id = $1 AND student_id = $2 AND state <> $3",
    )
    .bind(exam_id)
    .bind(student_id)
    .bind(AttemptState::InProgress)
    .fetch_one(pool)
    .await
}

/// Inserts a fresh attempt. Returns `None` when a unique index rejected it:
/// another attempt is already active, or the attempt number is taken.
pub(crate) async fn create(
    pool: &PgPool,
    attempt: NewAttempt<'_>,
) -> Result<Option<Attempt>, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!(
        "INSERT INTO exam_attempts (
            id, exam_id, student_id, attempt_number, state, started_at, duration_seconds,
            answers, violations, paper_snapshot, last_active_at, created_at, updated_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,'{{}}'::jsonb,'[]'::jsonb,$8,$6,$6,$6)
        ON CONFLICT DO NOTHING
        RETURNING {COLUMNS}"
    ))
    .bind(attempt.id)
    .bind(attempt.exam_id)
    .bind(attempt.student_id)
    .bind(attempt.attempt_number)
    .bind(AttemptState::InProgress)
    .bind(attempt.started_at)
    .bind(attempt.duration_seconds)
    .bind(Json(attempt.paper_snapshot))
    .fetch_optional(pool)
    .await
}

pub(crate) async fn upsert_answer(
    pool: &PgPool,
    id: &str,
    question_id: &str,
    answer: &SavedAnswer,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(&format!(
        "UPDATE exam_attempts \
         SET answers = answers || jsonb_build_object($2::text, $3::jsonb), \
             last_active_at = $4, updated_at = $4 \
         WHERE id = $1 AND {}",
        open_at("$4")
    ))
    .bind(id)
    .bind(question_id)
    .bind(Json(answer))
    .bind(answer.saved_at)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Appends one violation when the log still holds `expected_len` entries.
/// With `finalize`, the same write closes the attempt. `None` when the attempt
/// stopped accepting writes or another append got there first.
pub(crate) async fn append_violation(
    pool: &PgPool,
    id: &str,
    record: &ViolationRecord,
    expected_len: i32,
    finalize: Option<FinalizeReason>,
) -> Result<Option<Attempt>, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!(
        "UPDATE exam_attempts \
         SET violations = violations || jsonb_build_array($2::jsonb), \
             last_active_at = $3, updated_at = $3, \
             state = COALESCE($5, state), \
             finalize_reason = COALESCE($6, finalize_reason), \
             submitted_at = CASE WHEN $6::finalizereason IS NULL THEN submitted_at ELSE $3 END \
         WHERE id = $1 AND jsonb_array_length(violations) = $4 AND {} \
         RETURNING {COLUMNS}",
        open_at("$3")
    ))
    .bind(id)
    .bind(Json(record))
    .bind(record.occurred_at)
    .bind(expected_len)
    .bind(finalize.map(|reason| reason.target_state()))
    .bind(finalize)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn touch(
    pool: &PgPool,
    id: &str,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(&format!(
        "UPDATE exam_attempts SET last_active_at = $2 WHERE id = $1 AND {}",
        open_at("$2")
    ))
    .bind(id)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// The only transition out of `in_progress`. Exactly one concurrent caller
/// gets the row back; the rest see `None`.
pub(crate) async fn finalize(
    pool: &PgPool,
    id: &str,
    reason: FinalizeReason,
    now: PrimitiveDateTime,
) -> Result<Option<Attempt>, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!(
        "UPDATE exam_attempts \
         SET state = $2, finalize_reason = $3, submitted_at = $4, updated_at = $4 \
         WHERE id = $1 AND state = $5 \
         RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(reason.target_state())
    .bind(reason)
    .bind(now)
    .bind(AttemptState::InProgress)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn list_expired(
    pool: &PgPool,
    now: PrimitiveDateTime,
    limit: i64,
) -> Result<Vec<AttemptRef>, sqlx::Error> {
    sqlx::query_as::<_, AttemptRef>(
        "SELECT id, exam_id, student_id FROM exam_attempts \
         WHERE state = $1 AND started_at + make_interval(secs => duration_seconds) <= $2 \
         ORDER BY started_at \
         LIMIT $3",
    )
    .bind(AttemptState::InProgress)
    .bind(now)
    .bind(limit.clamp(1, 10_000))
    .fetch_all(pool)
    .await
}

pub(crate) async fn duplicate_active(pool: &PgPool) -> Result<Vec<DuplicateActive>, sqlx::Error> {
    sqlx::query_as::<_, DuplicateActive>(
        "SELECT exam_id, student_id, COUNT(*) AS active_count FROM exam_attempts \
         WHERE state = $1 \
         GROUP BY exam_id, student_id \
         HAVING COUNT(*) > 1",
    )
    .bind(AttemptState::InProgress)
    .fetch_all(pool)
    .await
}

pub(crate) async fn orphaned(pool: &PgPool) -> Result<Vec<AttemptRef>, sqlx::Error> {
    sqlx::query_as::<_, AttemptRef>(
        "SELECT a.id, a.exam_id, a.student_id FROM exam_attempts a \
         LEFT JOIN exams e ON e.id = a.exam_id \
         WHERE e.id IS NULL \
         ORDER BY a.created_at",
    )
    .fetch_all(pool)
    .await
}

pub(crate) async fn counts(pool: &PgPool) -> Result<AttemptCounts, sqlx::Error> {
    sqlx::query_as::<_, AttemptCounts>(
        "SELECT COUNT(*) AS total, \
                COUNT(*) FILTER (WHERE state = 'in_progress') AS in_progress, \
                COUNT(*) FILTER (WHERE state = 'submitted') AS submitted, \
                COUNT(*) FILTER (WHERE state = 'auto_submitted') AS auto_submitted, \
                MIN(started_at) FILTER (WHERE state = 'in_progress') AS oldest_active_started_at \
         FROM exam_attempts",
    )
    .fetch_one(pool)
    .await
}

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::api::errors::ApiError;
use crate::api::guards::CurrentStudent;
use crate::api::validation::validate_payload;
use crate::core::state::AppState;
use crate::schemas::{
    AttemptRefRequest, AttemptView, HeartbeatResponse, LogViolationRequest, LogViolationResponse,
    SaveAnswerRequest, SaveAnswerResponse, StartAttemptRequest, SubmitResponse,
};
use crate::services::autosave::SaveAnswer;

/// `201` when a new attempt was opened, `200` when an open one was resumed.
pub(super) async fn start_attempt(
    CurrentStudent(student_id): CurrentStudent,
    State(state): State<AppState>,
    Json(payload): Json<StartAttemptRequest>,
) -> Result<(StatusCode, Json<AttemptView>), ApiError> {
    validate_payload(&payload)?;

    let limit = state.settings().attempts().start_rate_limit_per_minute;
    if !state.redis().allow_attempt_start(&student_id, limit).await {
        tracing::warn!(student_id, exam_id = %payload.exam_id, "Attempt start rate limited");
        return Err(ApiError::TooManyRequests("Too many start requests, slow down"));
    }

    let snapshot = state.engine().start(&student_id, &payload.exam_id).await?;
    let status = if snapshot.resumed { StatusCode::OK } else { StatusCode::CREATED };

    Ok((status, Json(AttemptView::from_snapshot(snapshot))))
}

pub(super) async fn save_answer(
    CurrentStudent(student_id): CurrentStudent,
    State(state): State<AppState>,
    Json(payload): Json<SaveAnswerRequest>,
) -> Result<Json<SaveAnswerResponse>, ApiError> {
    validate_payload(&payload)?;

    let ack = state
        .engine()
        .save_answer(
            &student_id,
            SaveAnswer {
                attempt_id: &payload.attempt_id,
                question_id: &payload.question_id,
                value: &payload.value,
                question_index: payload.question_index,
            },
        )
        .await?;

    Ok(Json(ack.into()))
}

pub(super) async fn log_violation(
    CurrentStudent(student_id): CurrentStudent,
    State(state): State<AppState>,
    Json(payload): Json<LogViolationRequest>,
) -> Result<Json<LogViolationResponse>, ApiError> {
    validate_payload(&payload)?;

    let outcome = state
        .engine()
        .log_violation(&student_id, &payload.attempt_id, payload.kind, payload.details)
        .await?;

    Ok(Json(outcome.into()))
}

pub(super) async fn submit_attempt(
    CurrentStudent(student_id): CurrentStudent,
    State(state): State<AppState>,
    Json(payload): Json<AttemptRefRequest>,
) -> Result<Json<SubmitResponse>, ApiError> {
    validate_payload(&payload)?;

    let finalized = state.engine().submit(&student_id, &payload.attempt_id).await?;
    Ok(Json(finalized.into()))
}

pub(super) async fn heartbeat(
    CurrentStudent(student_id): CurrentStudent,
    State(state): State<AppState>,
    Json(payload): Json<AttemptRefRequest>,
) -> Result<Json<HeartbeatResponse>, ApiError> {
    validate_payload(&payload)?;

    let beat = state.engine().heartbeat(&student_id, &payload.attempt_id).await?;
    Ok(Json(beat.into()))
}

pub(super) async fn get_attempt(
    Path(attempt_id): Path<String>,
    CurrentStudent(student_id): CurrentStudent,
    State(state): State<AppState>,
) -> Result<Json<AttemptView>, ApiError> {
    let snapshot = state.engine().view(&student_id, &attempt_id).await?;
    Ok(Json(AttemptView::from_snapshot(snapshot)))
}

use axum::{extract::State, Json};

use crate::api::errors::ApiError;
use crate::api::guards::CurrentStaff;
use crate::core::state::AppState;
use crate::services::attempt_safety::{AttemptStatistics, IntegrityReport, SweepReport};

pub(super) async fn statistics(
    CurrentStaff(_): CurrentStaff,
    State(state): State<AppState>,
) -> Result<Json<AttemptStatistics>, ApiError> {
    Ok(Json(state.engine().statistics().await?))
}

pub(super) async fn integrity(
    CurrentStaff(_): CurrentStaff,
    State(state): State<AppState>,
) -> Result<Json<IntegrityReport>, ApiError> {
    Ok(Json(state.engine().verify_integrity().await?))
}

/// Manual trigger for the sweep the worker runs on an interval.
pub(super) async fn close_expired(
    CurrentStaff(staff): CurrentStaff,
    State(state): State<AppState>,
) -> Result<Json<SweepReport>, ApiError> {
    let report = state.engine().close_expired_attempts().await?;
    tracing::info!(
        requested_by = %staff.sub,
        closed = report.closed,
        failed = report.failed,
        "Expired attempts closed on request"
    );
    Ok(Json(report))
}

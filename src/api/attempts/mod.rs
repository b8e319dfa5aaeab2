mod admin;
mod handlers;

use axum::{routing::get, routing::post, Router};

use crate::core::state::AppState;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/start", post(handlers::start_attempt))
        .route("/answer", post(handlers::save_answer))
        .route("/violation", post(handlers::log_violation))
        .route("/submit", post(handlers::submit_attempt))
        .route("/heartbeat", post(handlers::heartbeat))
        .route("/:attempt_id", get(handlers::get_attempt))
}

pub(crate) fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/stats", get(admin::statistics))
        .route("/integrity", get(admin::integrity))
        .route("/close-expired", post(admin::close_expired))
}

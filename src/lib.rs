pub(crate) mod api;
pub mod client;
pub(crate) mod core;
pub(crate) mod db;
pub(crate) mod repositories;
pub mod schemas;
pub(crate) mod services;
pub(crate) mod tasks;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use crate::core::time::SystemClock;
use crate::core::{config::Settings, redis::RedisHandle, state::AppState, telemetry};
use crate::repositories::store::PgAttemptStore;
use crate::services::engine::AttemptEngine;
use crate::services::evaluation;
use crate::services::violation_policy::ViolationPolicy;

async fn build_state(settings: Settings) -> anyhow::Result<AppState> {
    let db_pool = db::init_pool(&settings).await?;
    db::run_migrations(&db_pool).await?;

    let redis = RedisHandle::new(settings.redis().redis_url());
    if let Err(err) = redis.connect().await {
        tracing::error!(error = %err, "Failed to connect to Redis; start rate limiting disabled");
    } else {
        tracing::info!("Redis connected successfully");
    }

    let engine = AttemptEngine::new(
        Arc::new(PgAttemptStore::new(db_pool)),
        Arc::new(SystemClock),
        evaluation::sink_from_settings(&settings)?,
        ViolationPolicy::from_settings(settings.violations()),
    );

    Ok(AppState::new(settings, engine, redis))
}

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    let state = build_state(settings).await?;
    let app = api::router::router(state.clone());
    let listener = tokio::net::TcpListener::bind(state.settings().server_addr()).await?;

    tracing::info!(
        host = %state.settings().server_host(),
        port = state.settings().server_port(),
        environment = %state.settings().runtime().environment.as_str(),
        "Proctored exams API listening"
    );

    let result =
        axum::serve(listener, app).with_graceful_shutdown(core::shutdown::shutdown_signal()).await;

    state.redis().disconnect().await;
    tracing::info!("Redis disconnected");

    result?;

    Ok(())
}

pub async fn run_worker() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    let state = build_state(settings).await?;
    let result = tasks::scheduler::run(state.clone()).await;

    state.redis().disconnect().await;
    tracing::info!("Redis disconnected");

    result?;

    Ok(())
}

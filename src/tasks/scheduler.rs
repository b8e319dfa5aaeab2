use anyhow::Result;
use tokio::sync::watch;
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::core::shutdown::shutdown_channel;
use crate::core::state::AppState;

pub(crate) async fn run(state: AppState) -> Result<()> {
    let mut shutdown_rx = shutdown_channel();

    let handles = vec![
        tokio::spawn(close_expired_loop(state.clone(), shutdown_rx.clone())),
        tokio::spawn(integrity_audit_loop(state.clone(), shutdown_rx.clone())),
    ];

    tracing::info!(
        sweep_interval_seconds = state.settings().attempts().sweep_interval_seconds,
        integrity_interval_seconds = state.settings().attempts().integrity_check_interval_seconds,
        "Attempt maintenance worker started"
    );

    if shutdown_rx.changed().await.is_err() {
        tracing::warn!("Shutdown notifier dropped; stopping maintenance worker");
    }

    for handle in handles {
        if let Err(err) = handle.await {
            tracing::error!(error = %err, "Background task join failed");
        }
    }

    Ok(())
}

async fn close_expired_loop(state: AppState, mut shutdown: watch::Receiver<bool>) {
    let period = Duration::from_secs(state.settings().attempts().sweep_interval_seconds);
    let mut tick = interval(period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => {
                if let Err(err) = state.engine().close_expired_attempts().await {
                    tracing::error!(error = %err, "close_expired_attempts failed");
                }
            }
        }
    }
}

async fn integrity_audit_loop(state: AppState, mut shutdown: watch::Receiver<bool>) {
    let period =
        Duration::from_secs(state.settings().attempts().integrity_check_interval_seconds.max(1));
    let mut tick = interval(period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => {
                match state.engine().verify_integrity().await {
                    Ok(report) => {
                        for issue in &report.issues {
                            tracing::warn!(
                                issue = ?issue.kind,
                                exam_id = %issue.exam_id,
                                student_id = %issue.student_id,
                                attempt_id = issue.attempt_id.as_deref().unwrap_or("-"),
                                detail = %issue.detail,
                                "Attempt integrity issue"
                            );
                        }
                    }
                    Err(err) => tracing::error!(error = %err, "verify_integrity failed"),
                }
            }
        }
    }
}

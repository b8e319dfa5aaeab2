use std::sync::OnceLock;

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::config::Settings;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub(crate) fn init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROM_HANDLE.set(handle);
    describe();
    Ok(())
}

pub(crate) fn render() -> Option<String> {
    PROM_HANDLE.get().map(|handle| handle.render())
}

fn describe() {
    describe_counter!("attempts_started_total", "Attempts created by the gatekeeper");
    describe_counter!("attempts_resumed_total", "Start requests that resumed an active attempt");
    describe_counter!("attempts_finalized_total", "Attempts moved to a terminal state, by reason");
    describe_counter!("answers_saved_total", "Accepted autosave upserts");
    describe_counter!("violations_logged_total", "Integrity signals recorded, by type");
    describe_counter!("attempt_state_conflicts_total", "Mutations rejected on a closed attempt");
    describe_counter!("evaluation_handoffs_total", "Evaluation handoffs, by outcome");
    describe_histogram!("attempt_duration_used_seconds", "Seconds used at finalize");
    describe_counter!("http_requests_total", "API requests, by method, route and status");
    describe_histogram!("http_request_duration_seconds", "API request latency, by route");
}

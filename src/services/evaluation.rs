use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use time::PrimitiveDateTime;

use crate::core::config::Settings;
use crate::db::models::{Attempt, Paper, SavedAnswer, ViolationRecord};
use crate::db::types::{AttemptState, FinalizeReason};

const MAX_DELIVERY_RETRIES: u32 = 3;

/// Frozen copy of a finalized attempt handed to the evaluation subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationHandoff {
    pub attempt_id: String,
    pub exam_id: String,
    pub student_id: String,
    pub attempt_number: i32,
    pub state: AttemptState,
    pub finalize_reason: FinalizeReason,
    #[serde(with = "crate::core::time::primitive_rfc3339")]
    pub started_at: PrimitiveDateTime,
    #[serde(with = "crate::core::time::primitive_rfc3339")]
    pub submitted_at: PrimitiveDateTime,
    pub duration_seconds: i32,
    pub answers: BTreeMap<String, SavedAnswer>,
    pub paper_snapshot: Paper,
    pub violations: Vec<ViolationRecord>,
}

impl EvaluationHandoff {
    /// `None` for attempts that are still open.
    pub(crate) fn from_attempt(attempt: &Attempt) -> Option<Self> {
        let submitted_at = attempt.submitted_at?;
        let finalize_reason = attempt.finalize_reason?;

        Some(Self {
            attempt_id: attempt.id.clone(),
            exam_id: attempt.exam_id.clone(),
            student_id: attempt.student_id.clone(),
            attempt_number: attempt.attempt_number,
            state: attempt.state,
            finalize_reason,
            started_at: attempt.started_at,
            submitted_at,
            duration_seconds: attempt.duration_seconds,
            answers: attempt.answers.0.clone(),
            paper_snapshot: attempt.paper_snapshot.0.clone(),
            violations: attempt.violations.0.clone(),
        })
    }
}

#[async_trait]
pub(crate) trait EvaluationSink: Send + Sync {
    async fn deliver(&self, handoff: &EvaluationHandoff) -> Result<()>;
}

/// Used when no evaluation endpoint is configured.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct LogEvaluationSink;

#[async_trait]
impl EvaluationSink for LogEvaluationSink {
    async fn deliver(&self, handoff: &EvaluationHandoff) -> Result<()> {
        tracing::info!(
            attempt_id = %handoff.attempt_id,
            exam_id = %handoff.exam_id,
            student_id = %handoff.student_id,
            reason = handoff.finalize_reason.as_str(),
            answers = handoff.answers.len(),
            violations = handoff.violations.len(),
            "Evaluation endpoint not configured; handoff logged only"
        );
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub(crate) struct HttpEvaluationSink {
    client: Client,
    url: String,
    api_key: String,
}

impl HttpEvaluationSink {
    pub(crate) fn new(url: String, api_key: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(timeout)
            .build()
            .context("Failed to build evaluation HTTP client")?;

        Ok(Self { client, url, api_key })
    }

    async fn post_once(&self, handoff: &EvaluationHandoff) -> Result<()> {
        let mut request = self.client.post(&self.url).json(handoff);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        let response = request.send().await.context("Failed to call evaluation endpoint")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Evaluation endpoint rejected handoff (status {status}): {body}");
        }

        Ok(())
    }
}

#[async_trait]
impl EvaluationSink for HttpEvaluationSink {
    async fn deliver(&self, handoff: &EvaluationHandoff) -> Result<()> {
        let mut last_error = None;

        for attempt in 0..=MAX_DELIVERY_RETRIES {
            match self.post_once(handoff).await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    tracing::warn!(
                        attempt_id = %handoff.attempt_id,
                        attempt,
                        error = %err,
                        "Evaluation handoff failed"
                    );
                    last_error = Some(err);
                }
            }

            if attempt < MAX_DELIVERY_RETRIES {
                tokio::time::sleep(Duration::from_secs(2_u64.pow(attempt))).await;
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Evaluation handoff failed")))
    }
}

pub(crate) fn sink_from_settings(settings: &Settings) -> Result<std::sync::Arc<dyn EvaluationSink>> {
    let evaluation = settings.evaluation();
    match &evaluation.url {
        Some(url) => {
            let sink = HttpEvaluationSink::new(
                url.clone(),
                evaluation.api_key.clone(),
                Duration::from_secs(evaluation.request_timeout_seconds),
            )?;
            Ok(std::sync::Arc::new(sink))
        }
        None => Ok(std::sync::Arc::new(LogEvaluationSink)),
    }
}

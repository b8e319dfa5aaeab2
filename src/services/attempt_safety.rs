use serde::Serialize;

use crate::core::time::format_primitive;
use crate::db::types::FinalizeReason;
use crate::services::engine::{AttemptEngine, AttemptError};

const SWEEP_BATCH: i64 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub(crate) enum IntegrityIssueKind {
    MultipleActiveAttempts,
    OrphanAttempt,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct IntegrityIssue {
    #[serde(rename = "type")]
    pub(crate) kind: IntegrityIssueKind,
    pub(crate) exam_id: String,
    pub(crate) student_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) attempt_id: Option<String>,
    pub(crate) detail: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct IntegrityReport {
    pub(crate) healthy: bool,
    pub(crate) issues: Vec<IntegrityIssue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AttemptStatistics {
    pub(crate) total: i64,
    pub(crate) in_progress: i64,
    pub(crate) submitted: i64,
    pub(crate) auto_submitted: i64,
    pub(crate) oldest_active_started_at: Option<String>,
    pub(crate) oldest_active_age_seconds: Option<i64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SweepReport {
    pub(crate) scanned: usize,
    pub(crate) closed: usize,
    pub(crate) failed: usize,
}

impl AttemptEngine {
    /// Backstop for attempts nobody touched after their deadline.
    pub(crate) async fn close_expired_attempts(&self) -> Result<SweepReport, AttemptError> {
        let now = self.clock.now();
        let expired = self.store.list_expired(now, SWEEP_BATCH).await?;
        let mut report = SweepReport { scanned: expired.len(), ..SweepReport::default() };

        for attempt in expired {
            match self.finalize(&attempt.id, FinalizeReason::Timeout).await {
                Ok(finalized) if finalized.performed => report.closed += 1,
                Ok(_) => {}
                Err(err) => {
                    report.failed += 1;
                    tracing::error!(
                        attempt_id = %attempt.id,
                        exam_id = %attempt.exam_id,
                        student_id = %attempt.student_id,
                        error = %err,
                        "Failed to close expired attempt"
                    );
                }
            }
        }

        if report.scanned > 0 {
            tracing::info!(
                scanned = report.scanned,
                closed = report.closed,
                failed = report.failed,
                "Expired attempt sweep finished"
            );
        }

        Ok(report)
    }

    pub(crate) async fn verify_integrity(&self) -> Result<IntegrityReport, AttemptError> {
        let mut issues = Vec::new();

        for duplicate in self.store.duplicate_active().await? {
            issues.push(IntegrityIssue {
                kind: IntegrityIssueKind::MultipleActiveAttempts,
                detail: format!("{} attempts in progress", duplicate.active_count),
                exam_id: duplicate.exam_id,
                student_id: duplicate.student_id,
                attempt_id: None,
            });
        }

        for orphan in self.store.orphaned().await? {
            issues.push(IntegrityIssue {
                kind: IntegrityIssueKind::OrphanAttempt,
                detail: "exam no longer exists".to_string(),
                exam_id: orphan.exam_id,
                student_id: orphan.student_id,
                attempt_id: Some(orphan.id),
            });
        }

        if !issues.is_empty() {
            tracing::warn!(issues = issues.len(), "Attempt integrity check found issues");
        }

        Ok(IntegrityReport { healthy: issues.is_empty(), issues })
    }

    pub(crate) async fn statistics(&self) -> Result<AttemptStatistics, AttemptError> {
        let counts = self.store.counts().await?;
        let now = self.clock.now();

        Ok(AttemptStatistics {
            total: counts.total,
            in_progress: counts.in_progress,
            submitted: counts.submitted,
            auto_submitted: counts.auto_submitted,
            oldest_active_started_at: counts.oldest_active_started_at.map(format_primitive),
            oldest_active_age_seconds: counts
                .oldest_active_started_at
                .map(|started| (now - started).whole_seconds().max(0)),
        })
    }
}

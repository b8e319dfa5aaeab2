use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::time::format_primitive;
use crate::db::models::{Paper, SavedAnswer};
use crate::db::types::{AttemptState, FinalizeReason, ViolationKind};
use crate::services::autosave::AnswerAck;
use crate::services::finalize::{Finalized, Heartbeat, SessionSnapshot};
use crate::services::violation_policy::ViolationAction;
use crate::services::violations::ViolationOutcome;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct StartAttemptRequest {
    #[validate(length(min = 1, max = 128, message = "examId must be 1-128 characters"))]
    pub exam_id: String,
}

/// Resume view of an attempt: everything the client needs to render it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptView {
    pub attempt_id: String,
    pub exam_id: String,
    pub attempt_number: i32,
    pub state: AttemptState,
    pub started_at: String,
    pub duration_seconds: i32,
    pub remaining_seconds: i64,
    #[serde(default)]
    pub submitted_at: Option<String>,
    pub paper: Paper,
    pub previous_answers: BTreeMap<String, SavedAnswer>,
    pub total_violations: usize,
    #[serde(default)]
    pub resumed: bool,
}

impl AttemptView {
    pub(crate) fn from_snapshot(snapshot: SessionSnapshot) -> Self {
        let SessionSnapshot { attempt, remaining_seconds, resumed } = snapshot;
        Self {
            attempt_id: attempt.id,
            exam_id: attempt.exam_id,
            attempt_number: attempt.attempt_number,
            state: attempt.state,
            started_at: format_primitive(attempt.started_at),
            duration_seconds: attempt.duration_seconds,
            remaining_seconds,
            submitted_at: attempt.submitted_at.map(format_primitive),
            paper: attempt.paper_snapshot.0,
            previous_answers: attempt.answers.0,
            total_violations: attempt.violations.0.len(),
            resumed,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SaveAnswerRequest {
    #[validate(length(min = 1, message = "attemptId must not be empty"))]
    pub attempt_id: String,
    #[validate(length(min = 1, max = 128, message = "questionId must be 1-128 characters"))]
    pub question_id: String,
    #[validate(length(max = 10000, message = "answer must be at most 10000 characters"))]
    pub value: String,
    #[validate(range(min = 0, message = "questionIndex must be non-negative"))]
    pub question_index: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveAnswerResponse {
    pub saved: bool,
    pub saved_at: String,
    pub remaining_seconds: i64,
}

impl From<AnswerAck> for SaveAnswerResponse {
    fn from(ack: AnswerAck) -> Self {
        Self {
            saved: true,
            saved_at: format_primitive(ack.saved_at),
            remaining_seconds: ack.remaining_seconds,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LogViolationRequest {
    #[validate(length(min = 1, message = "attemptId must not be empty"))]
    pub attempt_id: String,
    #[serde(rename = "type")]
    pub kind: ViolationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 500, message = "details must be at most 500 characters"))]
    pub details: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogViolationResponse {
    pub total_violations: usize,
    pub action: ViolationAction,
    pub state: AttemptState,
}

impl From<ViolationOutcome> for LogViolationResponse {
    fn from(outcome: ViolationOutcome) -> Self {
        Self {
            total_violations: outcome.total_violations,
            action: outcome.action,
            state: outcome.state,
        }
    }
}

/// Body of `submit` and `heartbeat`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRefRequest {
    #[validate(length(min = 1, message = "attemptId must not be empty"))]
    pub attempt_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub state: AttemptState,
    #[serde(default)]
    pub submitted_at: Option<String>,
    #[serde(default)]
    pub finalize_reason: Option<FinalizeReason>,
}

impl From<Finalized> for SubmitResponse {
    fn from(finalized: Finalized) -> Self {
        Self {
            state: finalized.attempt.state,
            submitted_at: finalized.attempt.submitted_at.map(format_primitive),
            finalize_reason: finalized.attempt.finalize_reason,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatResponse {
    pub state: AttemptState,
    pub remaining_seconds: i64,
}

impl From<Heartbeat> for HeartbeatResponse {
    fn from(beat: Heartbeat) -> Self {
        Self { state: beat.state, remaining_seconds: beat.remaining_seconds }
    }
}

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::db::types::{AttemptState, ExamStatus, FinalizeReason, ViolationKind};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Exam {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) status: ExamStatus,
    pub(crate) start_time: PrimitiveDateTime,
    pub(crate) end_time: PrimitiveDateTime,
    pub(crate) duration_seconds: i32,
    pub(crate) attempts_allowed: i32,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaperQuestion {
    pub id: String,
    pub text: String,
    pub marks: f64,
}

/// Ordered question set assigned to one student for one exam.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paper {
    pub questions: Vec<PaperQuestion>,
    pub total_marks: f64,
}

impl Paper {
    pub(crate) fn contains_question(&self, question_id: &str) -> bool {
        self.questions.iter().any(|question| question.id == question_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedAnswer {
    pub value: String,
    #[serde(with = "crate::core::time::primitive_rfc3339")]
    pub saved_at: PrimitiveDateTime,
    pub question_index: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViolationRecord {
    #[serde(rename = "type")]
    pub kind: ViolationKind,
    #[serde(with = "crate::core::time::primitive_rfc3339")]
    pub occurred_at: PrimitiveDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Attempt {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) student_id: String,
    pub(crate) attempt_number: i32,
    pub(crate) state: AttemptState,
    pub(crate) started_at: PrimitiveDateTime,
    pub(crate) duration_seconds: i32,
    pub(crate) submitted_at: Option<PrimitiveDateTime>,
    pub(crate) finalize_reason: Option<FinalizeReason>,
    pub(crate) answers: Json<BTreeMap<String, SavedAnswer>>,
    pub(crate) violations: Json<Vec<ViolationRecord>>,
    pub(crate) paper_snapshot: Json<Paper>,
    pub(crate) last_active_at: PrimitiveDateTime,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

impl Attempt {
    pub(crate) fn is_owned_by(&self, student_id: &str) -> bool {
        self.student_id == student_id
    }
}

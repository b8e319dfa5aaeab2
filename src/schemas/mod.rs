use std::collections::HashMap;

use serde::Serialize;

pub mod attempt;

pub use crate::db::models::{Paper, PaperQuestion, SavedAnswer, ViolationRecord};
pub use crate::db::types::{AttemptState, FinalizeReason, ViolationKind};
pub use crate::services::evaluation::EvaluationHandoff;
pub use crate::services::violation_policy::ViolationAction;
pub use attempt::{
    AttemptRefRequest, AttemptView, HeartbeatResponse, LogViolationRequest, LogViolationResponse,
    SaveAnswerRequest, SaveAnswerResponse, StartAttemptRequest, SubmitResponse,
};

#[derive(Debug, Serialize)]
pub(crate) struct HealthResponse {
    pub(crate) service: String,
    pub(crate) status: String,
    pub(crate) components: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct RootResponse {
    pub(crate) message: String,
    pub(crate) version: String,
    pub(crate) api_prefix: String,
}

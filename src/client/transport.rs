use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::client::error::ClientError;
use crate::schemas::{
    AttemptRefRequest, AttemptView, HeartbeatResponse, LogViolationRequest, LogViolationResponse,
    SaveAnswerRequest, SaveAnswerResponse, StartAttemptRequest, SubmitResponse,
};

/// The attempt endpoints the session controller talks to.
#[async_trait]
pub trait ExamApi: Send + Sync {
    async fn start(&self, exam_id: &str) -> Result<AttemptView, ClientError>;
    async fn save_answer(
        &self,
        request: &SaveAnswerRequest,
    ) -> Result<SaveAnswerResponse, ClientError>;
    async fn log_violation(
        &self,
        request: &LogViolationRequest,
    ) -> Result<LogViolationResponse, ClientError>;
    async fn heartbeat(&self, attempt_id: &str) -> Result<HeartbeatResponse, ClientError>;
    async fn submit(&self, attempt_id: &str) -> Result<SubmitResponse, ClientError>;
}

#[async_trait]
impl<T: ExamApi + ?Sized> ExamApi for Arc<T> {
    async fn start(&self, exam_id: &str) -> Result<AttemptView, ClientError> {
        (**self).start(exam_id).await
    }

    async fn save_answer(
        &self,
        request: &SaveAnswerRequest,
    ) -> Result<SaveAnswerResponse, ClientError> {
        (**self).save_answer(request).await
    }

    async fn log_violation(
        &self,
        request: &LogViolationRequest,
    ) -> Result<LogViolationResponse, ClientError> {
        (**self).log_violation(request).await
    }

    async fn heartbeat(&self, attempt_id: &str) -> Result<HeartbeatResponse, ClientError> {
        (**self).heartbeat(attempt_id).await
    }

    async fn submit(&self, attempt_id: &str) -> Result<SubmitResponse, ClientError> {
        (**self).submit(attempt_id).await
    }
}

#[derive(Clone)]
pub struct HttpExamApi {
    http: Client,
    base_url: String,
    token: String,
}

impl HttpExamApi {
    /// `base_url` is the API root including the version prefix, e.g.
    /// `https://exams.example.org/api/v1`.
    pub fn new(base_url: &str, token: String, timeout: Duration) -> Result<Self, ClientError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        Ok(Self { http, base_url: base_url.trim_end_matches('/').to_string(), token })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/attempts/{path}", self.base_url)
    }

    async fn post<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let response = self
            .http
            .post(self.url(path))
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
    let status = response.status();
    if status.is_success() {
        return response.json::<T>().await.map_err(|e| ClientError::Decode(e.to_string()));
    }

    let body = response.text().await.unwrap_or_default();
    Err(ClientError::from_response(status.as_u16(), &body))
}

#[async_trait]
impl ExamApi for HttpExamApi {
    async fn start(&self, exam_id: &str) -> Result<AttemptView, ClientError> {
        self.post("start", &StartAttemptRequest { exam_id: exam_id.to_string() }).await
    }

    async fn save_answer(
        &self,
        request: &SaveAnswerRequest,
    ) -> Result<SaveAnswerResponse, ClientError> {
        self.post("answer", request).await
    }

    async fn log_violation(
        &self,
        request: &LogViolationRequest,
    ) -> Result<LogViolationResponse, ClientError> {
        self.post("violation", request).await
    }

    async fn heartbeat(&self, attempt_id: &str) -> Result<HeartbeatResponse, ClientError> {
        self.post("heartbeat", &AttemptRefRequest { attempt_id: attempt_id.to_string() }).await
    }

    async fn submit(&self, attempt_id: &str) -> Result<SubmitResponse, ClientError> {
        self.post("submit", &AttemptRefRequest { attempt_id: attempt_id.to_string() }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_join_without_double_slashes() {
        let api = HttpExamApi::new(
            "http://localhost:8000/api/v1/",
            "token".into(),
            Duration::from_secs(5),
        )
        .expect("client");
        assert_eq!(api.url("start"), "http://localhost:8000/api/v1/attempts/start");
    }

    #[tokio::test]
    async fn unreachable_server_is_a_retryable_transport_error() {
        let api =
            HttpExamApi::new("http://127.0.0.1:9", "token".into(), Duration::from_millis(500))
                .expect("client");

        let err = api.heartbeat("attempt-1").await.expect_err("no server");
        assert!(matches!(err, ClientError::Transport(_)));
        assert!(err.is_retryable());
    }
}

//! HTTP client for the task API: submission, status checks and the
//! health probe.

use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response};
use thiserror::Error;
use tracing::{info, warn};

use geosolve_core::payload::{
    ErrorBody, HealthPayload, SubmitRequest, SubmitResponse, TaskStatusPayload,
};
use geosolve_core::types::TaskId;

use crate::task::{self, SharedTracker};

#[derive(Error, Debug)]
pub enum SubmissionError {
    #[error("Problem statement is empty")]
    EmptyProblem,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server rejected the problem ({status}): {detail}")]
    Rejected { status: u16, detail: String },

    #[error("Invalid server response: {0}")]
    InvalidResponse(String),
}

#[derive(Error, Debug)]
pub enum StatusCheckError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Request failed ({status}): {body}")]
    Status { status: u16, body: String },

    #[error("Invalid server response: {0}")]
    InvalidResponse(String),
}

/// Outcome of a liveness probe against `/health`.
#[derive(Debug, Clone, PartialEq)]
pub enum HealthProbe {
    Alive(HealthPayload),
    Unreachable(String),
}

#[derive(Clone)]
pub struct TaskClient {
    client: Client,
    base_url: String,
    tracker: SharedTracker,
}

impl TaskClient {
    pub fn new(server_url: &str, tracker: SharedTracker) -> Self {
        Self {
            client: Client::new(),
            base_url: server_url.trim_end_matches('/').to_string(),
            tracker,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn tracker(&self) -> &SharedTracker {
        &self.tracker
    }

    /// Submit a problem statement. On success the new task replaces the
    /// tracked one; on failure the tracked task is left alone and a health
    /// probe is logged for diagnostics.
    pub async fn submit_problem(&self, text: &str) -> Result<TaskId, SubmissionError> {
        let problem = text.trim();
        if problem.is_empty() {
            return Err(SubmissionError::EmptyProblem);
        }

        match self.post_problem(problem).await {
            Ok(task_id) => {
                let previous = task::lock(&self.tracker).adopt(task_id.clone());
                if let Some(previous) = previous {
                    info!("Task {} supersedes {}", task_id, previous);
                }
                info!("Submitted problem, task_id={}", task_id);
                Ok(task_id)
            }
            Err(e) => {
                warn!("Submission failed: {}", e);
                match self.probe_health().await {
                    HealthProbe::Alive(_) => info!("Health probe: server is up"),
                    HealthProbe::Unreachable(reason) => {
                        warn!("Health probe: server unreachable: {}", reason)
                    }
                }
                Err(e)
            }
        }
    }

    async fn post_problem(&self, problem: &str) -> Result<TaskId, SubmissionError> {
        let resp = self
            .client
            .post(format!("{}/generate-commands", self.base_url))
            .json(&SubmitRequest::user(problem))
            .send()
            .await?;

        let status = resp.status();
        if !is_json(&resp) {
            let body = resp.text().await.unwrap_or_default();
            return Err(SubmissionError::InvalidResponse(format!(
                "expected JSON, got {} {}",
                status,
                truncate(&body, 200)
            )));
        }

        if !status.is_success() {
            let body: ErrorBody = resp.json().await.unwrap_or_default();
            return Err(SubmissionError::Rejected {
                status: status.as_u16(),
                detail: body.message().unwrap_or_else(|| "unknown error".to_string()),
            });
        }

        let body: SubmitResponse = resp
            .json()
            .await
            .map_err(|e| SubmissionError::InvalidResponse(e.to_string()))?;

        match body.task_id {
            Some(id) if !id.as_str().is_empty() => Ok(id),
            _ => Err(SubmissionError::InvalidResponse(
                "response carries no task_id".to_string(),
            )),
        }
    }

    /// Fetch the current state of a task. Single attempt.
    pub async fn check_task_status(
        &self,
        task_id: &TaskId,
    ) -> Result<TaskStatusPayload, StatusCheckError> {
        let resp = self
            .client
            .get(format!("{}/task/{}", self.base_url, task_id))
            .send()
            .await?;

        let resp = error_for_status(resp).await?;
        resp.json()
            .await
            .map_err(|e| StatusCheckError::InvalidResponse(e.to_string()))
    }

    pub async fn health(&self) -> Result<HealthPayload, StatusCheckError> {
        let resp = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;

        let resp = error_for_status(resp).await?;
        resp.json()
            .await
            .map_err(|e| StatusCheckError::InvalidResponse(e.to_string()))
    }

    pub async fn probe_health(&self) -> HealthProbe {
        match self.health().await {
            Ok(payload) => HealthProbe::Alive(payload),
            Err(e) => HealthProbe::Unreachable(e.to_string()),
        }
    }
}

fn is_json(resp: &Response) -> bool {
    resp.headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.contains("application/json"))
}

async fn error_for_status(resp: Response) -> Result<Response, StatusCheckError> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    Err(StatusCheckError::Status {
        status,
        body: truncate(&body, 200).to_string(),
    })
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geosolve_core::types::TaskStatus;
    use serde_json::json;
    use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

    use crate::task::TaskTracker;

    async fn mount_health(server: &MockServer, expect: u64) {
        Mock::given(matchers::method("GET"))
            .and(matchers::path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "healthy"})))
            .expect(expect)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_submit_adopts_task_id() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .and(matchers::path("/generate-commands"))
            .and(matchers::body_json(json!({
                "messages": [{"role": "user", "content": "Triangle ABC with AB = 5"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"task_id": "abc123"})))
            .expect(1)
            .mount(&server)
            .await;

        let tracker = TaskTracker::shared();
        task::lock(&tracker).adopt(TaskId::new("previous"));
        let client = TaskClient::new(&server.uri(), tracker.clone());

        let id = client
            .submit_problem("  Triangle ABC with AB = 5 \n")
            .await
            .unwrap();
        assert_eq!(id.as_str(), "abc123");
        assert_eq!(task::lock(&tracker).current_id(), Some(&TaskId::new("abc123")));
    }

    #[tokio::test]
    async fn test_empty_problem_makes_no_request() {
        let server = MockServer::start().await;
        Mock::given(matchers::any())
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = TaskClient::new(&server.uri(), TaskTracker::shared());
        let err = client.submit_problem("   \t\n").await.unwrap_err();
        assert!(matches!(err, SubmissionError::EmptyProblem));
    }

    #[tokio::test]
    async fn test_rejected_submission_keeps_tracked_task() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .and(matchers::path("/generate-commands"))
            .respond_with(ResponseTemplate::new(422).set_body_json(json!({"detail": "bad input"})))
            .expect(1)
            .mount(&server)
            .await;
        // Failure triggers one diagnostic probe
        mount_health(&server, 1).await;

        let tracker = TaskTracker::shared();
        task::lock(&tracker).adopt(TaskId::new("keep-me"));
        let client = TaskClient::new(&server.uri(), tracker.clone());

        let err = client.submit_problem("something").await.unwrap_err();
        assert!(matches!(err, SubmissionError::Rejected { status: 422, .. }));
        assert!(err.to_string().contains("bad input"));
        assert_eq!(task::lock(&tracker).current_id(), Some(&TaskId::new("keep-me")));
    }

    #[tokio::test]
    async fn test_rejected_without_detail() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .and(matchers::path("/generate-commands"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({})))
            .mount(&server)
            .await;
        mount_health(&server, 1).await;

        let client = TaskClient::new(&server.uri(), TaskTracker::shared());
        let err = client.submit_problem("something").await.unwrap_err();
        assert!(err.to_string().contains("unknown error"));
    }

    #[tokio::test]
    async fn test_non_json_response_is_invalid() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .and(matchers::path("/generate-commands"))
            .respond_with(ResponseTemplate::new(502).set_body_string("<html>Bad Gateway</html>"))
            .mount(&server)
            .await;
        mount_health(&server, 1).await;

        let tracker = TaskTracker::shared();
        let client = TaskClient::new(&server.uri(), tracker.clone());
        let err = client.submit_problem("something").await.unwrap_err();
        assert!(matches!(err, SubmissionError::InvalidResponse(_)));
        assert!(task::lock(&tracker).current_id().is_none());
    }

    #[tokio::test]
    async fn test_missing_task_id_is_invalid() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .and(matchers::path("/generate-commands"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "queued"})))
            .mount(&server)
            .await;
        mount_health(&server, 1).await;

        let client = TaskClient::new(&server.uri(), TaskTracker::shared());
        let err = client.submit_problem("something").await.unwrap_err();
        assert!(matches!(err, SubmissionError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_check_task_status() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("GET"))
            .and(matchers::path("/task/t1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "task_id": "t1",
                "status": "completed",
                "result": {"geogebra_commands": ["A=(0,0)"], "explanation": "done"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = TaskClient::new(&format!("{}/", server.uri()), TaskTracker::shared());
        let payload = client.check_task_status(&TaskId::new("t1")).await.unwrap();
        assert_eq!(payload.status, TaskStatus::Completed);
        assert_eq!(
            payload.completed_result().unwrap().explanation.as_deref(),
            Some("done")
        );
    }

    #[tokio::test]
    async fn test_check_task_status_failure() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("GET"))
            .and(matchers::path("/task/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
            .expect(1)
            .mount(&server)
            .await;

        let client = TaskClient::new(&server.uri(), TaskTracker::shared());
        let err = client
            .check_task_status(&TaskId::new("missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, StatusCheckError::Status { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_probe_health() {
        let server = MockServer::start().await;
        mount_health(&server, 1).await;
        let client = TaskClient::new(&server.uri(), TaskTracker::shared());
        assert!(matches!(client.probe_health().await, HealthProbe::Alive(_)));

        // Nothing listens on port 9 of localhost
        let client = TaskClient::new("http://127.0.0.1:9", TaskTracker::shared());
        assert!(matches!(
            client.probe_health().await,
            HealthProbe::Unreachable(_)
        ));
    }
}

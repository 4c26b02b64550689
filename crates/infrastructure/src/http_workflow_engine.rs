//! HTTP client for the durable workflow execution engine.

use async_trait::async_trait;
use keygate_application::{
    ExecutionDescription, ExecutionEvent, ExecutionStatus, TransitionTask, TransitionTaskKind,
    TransitionTaskOutcome, TransitionTaskQueue, WorkflowEngine,
};
use keygate_core::{AppError, AppResult};
use keygate_domain::WorkflowInput;
use serde::Deserialize;
use serde_json::Value;

/// HTTP adapter for the engine contract the core consumes: start, describe,
/// and stop executions, read event history, and drive the transition-task
/// queue the engine's scheduler exposes.
#[derive(Clone)]
pub struct HttpWorkflowEngine {
    http_client: reqwest::Client,
    base_url: String,
    shared_secret: String,
}

#[derive(Debug, Deserialize)]
struct DescribeExecutionResponse {
    execution_id: String,
    status: String,
    input: Value,
}

#[derive(Debug, Deserialize)]
struct ExecutionEventResponse {
    event_type: String,
    state_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExecutionHistoryResponse {
    events: Vec<ExecutionEventResponse>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TransitionTaskResponse {
    task_id: String,
    kind: String,
    input: WorkflowInput,
}

#[derive(Debug, Deserialize)]
struct PollTaskResponse {
    task: Option<TransitionTaskResponse>,
}

impl HttpWorkflowEngine {
    /// Creates a client for one engine endpoint.
    #[must_use]
    pub fn new(
        http_client: reqwest::Client,
        base_url: impl Into<String>,
        shared_secret: impl Into<String>,
    ) -> Self {
        Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            shared_secret: shared_secret.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send(
        &self,
        builder: reqwest::RequestBuilder,
        context: &str,
    ) -> AppResult<reqwest::Response> {
        let response = builder
            .bearer_auth(self.shared_secret.as_str())
            .send()
            .await
            .map_err(|error| {
                AppError::Internal(format!("{context} transport error: {error}"))
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<body unavailable>".to_owned());
        Err(match status {
            reqwest::StatusCode::NOT_FOUND => {
                AppError::NotFound(format!("{context}: {body}"))
            }
            reqwest::StatusCode::CONFLICT => AppError::Conflict(format!("{context}: {body}")),
            _ => AppError::Internal(format!(
                "{context} returned status {}: {body}",
                status.as_u16()
            )),
        })
    }
}

#[async_trait]
impl WorkflowEngine for HttpWorkflowEngine {
    async fn start_execution(&self, execution_id: &str, input: &Value) -> AppResult<()> {
        self.send(
            self.http_client
                .post(self.url("/v1/executions"))
                .json(&serde_json::json!({
                    "execution_id": execution_id,
                    "input": input,
                })),
            "start execution",
        )
        .await
        .map(|_| ())
    }

    async fn describe_execution(&self, execution_id: &str) -> AppResult<ExecutionDescription> {
        let context = "describe execution";
        let response = self
            .send(
                self.http_client
                    .get(self.url(&format!("/v1/executions/{execution_id}"))),
                context,
            )
            .await?;

        let body = response
            .json::<DescribeExecutionResponse>()
            .await
            .map_err(|error| {
                AppError::Internal(format!("{context} returned a malformed body: {error}"))
            })?;

        Ok(ExecutionDescription {
            execution_id: body.execution_id,
            status: ExecutionStatus::parse(body.status.as_str())?,
            input: body.input,
        })
    }

    async fn execution_history(&self, execution_id: &str) -> AppResult<Vec<ExecutionEvent>> {
        let context = "fetch execution history";
        let mut events = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut builder = self
                .http_client
                .get(self.url(&format!("/v1/executions/{execution_id}/history")));
            if let Some(token) = page_token.as_deref() {
                builder = builder.query(&[("page_token", token)]);
            }

            let response = self.send(builder, context).await?;
            let page = response
                .json::<ExecutionHistoryResponse>()
                .await
                .map_err(|error| {
                    AppError::Internal(format!("{context} returned a malformed body: {error}"))
                })?;

            events.extend(page.events.into_iter().map(|event| ExecutionEvent {
                event_type: event.event_type,
                state_name: event.state_name,
            }));

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => return Ok(events),
            }
        }
    }

    async fn stop_execution(&self, execution_id: &str) -> AppResult<()> {
        let result = self
            .send(
                self.http_client
                    .post(self.url(&format!("/v1/executions/{execution_id}/stop"))),
                "stop execution",
            )
            .await;

        match result {
            Ok(_) => Ok(()),
            // An execution that already finished needs no stopping.
            Err(error) if error.is_conflict() => Ok(()),
            Err(error) => Err(error),
        }
    }
}

#[async_trait]
impl TransitionTaskQueue for HttpWorkflowEngine {
    async fn poll_task(&self, worker_id: &str) -> AppResult<Option<TransitionTask>> {
        let context = "poll transition task";
        let response = self
            .send(
                self.http_client
                    .post(self.url("/v1/transition-tasks/poll"))
                    .json(&serde_json::json!({ "worker_id": worker_id })),
                context,
            )
            .await?;

        if response.status() == reqwest::StatusCode::NO_CONTENT {
            return Ok(None);
        }

        let body = response.json::<PollTaskResponse>().await.map_err(|error| {
            AppError::Internal(format!("{context} returned a malformed body: {error}"))
        })?;

        body.task
            .map(|task| {
                Ok(TransitionTask {
                    task_id: task.task_id,
                    kind: TransitionTaskKind::parse(task.kind.as_str())?,
                    input: task.input,
                })
            })
            .transpose()
    }

    async fn complete_task(&self, task_id: &str, outcome: TransitionTaskOutcome) -> AppResult<()> {
        let payload = match outcome {
            TransitionTaskOutcome::Succeeded => serde_json::json!({ "outcome": "succeeded" }),
            TransitionTaskOutcome::Failed { reason } => serde_json::json!({
                "outcome": "failed",
                "reason": reason,
            }),
        };

        self.send(
            self.http_client
                .post(self.url(&format!("/v1/transition-tasks/{task_id}/complete")))
                .json(&payload),
            "complete transition task",
        )
        .await
        .map(|_| ())
    }
}

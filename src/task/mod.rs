//! Task client — submits prompts to the generation backend and polls until
//! the task leaves the pending state.
//!
//! Backend contract:
//!
//! ```text
//! POST {base}/generateText   {"prompt": "..."}  -> {"task_id": "..."}
//! GET  {base}/task/{task_id}                    -> {"status": "Task Pending"} | <terminal payload>
//! ```
//!
//! The client is stateless between calls and cheap to clone
//! (`reqwest::Client` is an `Arc` internally).

pub mod poll;
pub mod wire;

use std::time::Duration;

use reqwest::{Client, Url};
use serde_json::Value;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub use poll::{Backoff, PollPolicy};
pub use wire::{Prompt, TaskHandle, TaskOutput, TaskStatus};

// ── Error ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("invalid backend url: {0}")]
    InvalidBackend(String),

    #[error("task submission failed: {0}")]
    Submission(String),

    #[error("task status check failed: {0}")]
    Poll(String),

    #[error("task {task_id} still pending after {polls} polls ({waited_secs}s)")]
    Timeout { task_id: String, polls: u32, waited_secs: u64 },

    #[error("task cancelled")]
    Cancelled,
}

// ── Client ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct TaskClient {
    client: Client,
    base: Url,
    policy: PollPolicy,
}

impl TaskClient {
    /// Build a client for the backend at `base_url`.
    ///
    /// `request_timeout` bounds every individual HTTP call; `policy` bounds
    /// the poll loop as a whole.
    pub fn new(
        base_url: &str,
        request_timeout: Duration,
        policy: PollPolicy,
    ) -> Result<Self, TaskError> {
        let mut base = Url::parse(base_url)
            .map_err(|e| TaskError::InvalidBackend(format!("{base_url}: {e}")))?;
        if !matches!(base.scheme(), "http" | "https") || base.cannot_be_a_base() {
            return Err(TaskError::InvalidBackend(format!(
                "{base_url}: expected an http(s) base url"
            )));
        }
        base.set_query(None);
        base.set_fragment(None);

        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| TaskError::InvalidBackend(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, base, policy })
    }

    pub fn base_url(&self) -> &str {
        self.base.as_str()
    }

    /// Create a task for `prompt` and return its handle.
    pub async fn submit(&self, prompt: &Prompt) -> Result<TaskHandle, TaskError> {
        let url = self.endpoint(&["generateText"]);
        debug!(%url, prompt_len = prompt.prompt.len(), "submitting task");

        let response = self.client.post(url).json(prompt).send().await.map_err(|e| {
            error!(error = %e, "task submission failed (transport)");
            TaskError::Submission(e.to_string())
        })?;
        let response = check_status(response).await.map_err(TaskError::Submission)?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| TaskError::Submission(format!("failed to parse response body: {e}")))?;

        let handle = wire::parse_submission(&body).map_err(|e| {
            warn!(error = %e, "backend accepted the prompt without a usable task id");
            TaskError::Submission(e)
        })?;

        info!(task_id = %handle, "task submitted");
        Ok(handle)
    }

    /// One status request for `handle`.
    pub async fn poll_once(&self, handle: &TaskHandle) -> Result<TaskStatus, TaskError> {
        let url = self.endpoint(&["task", handle.as_str()]);

        let response = self.client.get(url).send().await.map_err(|e| {
            error!(task_id = %handle, error = %e, "status check failed (transport)");
            TaskError::Poll(e.to_string())
        })?;
        let response = check_status(response).await.map_err(TaskError::Poll)?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| TaskError::Poll(format!("failed to parse response body: {e}")))?;

        TaskStatus::from_value(body).map_err(TaskError::Poll)
    }

    /// Poll `handle` until the backend reports something other than
    /// `"Task Pending"`, the poll policy runs out, or `cancel` fires.
    pub async fn await_result(
        &self,
        handle: &TaskHandle,
        cancel: &CancellationToken,
    ) -> Result<TaskOutput, TaskError> {
        let started = Instant::now();
        let deadline = self.policy.timeout.map(|t| started + t);
        let mut delay = self.policy.interval;
        let mut polls = 0u32;

        loop {
            polls += 1;
            let status = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(TaskError::Cancelled),
                status = self.poll_once(handle) => status?,
            };

            if let TaskStatus::Done(output) = status {
                info!(
                    task_id = %handle,
                    polls,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "task finished"
                );
                return Ok(output);
            }

            debug!(task_id = %handle, polls, next_delay_ms = delay.as_millis() as u64, "task pending");

            let out_of_time = deadline.is_some_and(|d| Instant::now() + delay > d);
            if self.policy.polls_exhausted(polls) || out_of_time {
                warn!(task_id = %handle, polls, "giving up on pending task");
                return Err(TaskError::Timeout {
                    task_id: handle.to_string(),
                    polls,
                    waited_secs: started.elapsed().as_secs(),
                });
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(TaskError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
            delay = self.policy.next_delay(delay);
        }
    }

    /// Submit `prompt` and wait for its terminal payload.
    pub async fn resolve(
        &self,
        prompt: &Prompt,
        cancel: &CancellationToken,
    ) -> Result<TaskOutput, TaskError> {
        let handle = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TaskError::Cancelled),
            handle = self.submit(prompt) => handle?,
        };
        self.await_result(&handle, cancel).await
    }

    /// `base` with `segments` appended as percent-encoded path segments.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        // Cannot fail: `new` rejects cannot-be-a-base URLs.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}

/// Pass a successful response through; turn anything else into an error
/// message carrying the status and (truncated) body.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, String> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read error body>".to_string());
    let body: String = body.chars().take(200).collect();

    error!(%status, body = %body, "backend returned HTTP error");
    Err(format!("HTTP {status}: {body}"))
}

//! Scripted generation backend for integration tests.
//!
//! Serves the task contract on `127.0.0.1:<random port>`:
//! `POST /generateText` answers with a fixed reply, `GET /task/{id}` walks a
//! list of status bodies (repeating the last one once exhausted).

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use serde_json::{Value, json};
use tokio::net::TcpListener;

#[derive(Default)]
struct Script {
    submit_status: Option<StatusCode>,
    submit_body: Value,
    statuses: Mutex<VecDeque<Value>>,
    last_status: Mutex<Value>,
    status_delay: Option<Duration>,
    prompts: Mutex<Vec<Value>>,
    polled_ids: Mutex<Vec<String>>,
    polls: AtomicUsize,
}

pub struct ScriptedBackend {
    pub url: String,
    script: Arc<Script>,
}

impl ScriptedBackend {
    /// Accepts every prompt as `task_id = "abc"` and serves `statuses` in order.
    pub async fn start(statuses: Vec<Value>) -> Self {
        Self::builder().statuses(statuses).spawn().await
    }

    pub fn builder() -> ScriptBuilder {
        ScriptBuilder {
            submit_status: None,
            submit_body: json!({ "task_id": "abc" }),
            statuses: Vec::new(),
            status_delay: None,
        }
    }

    /// Number of `GET /task/{id}` requests served.
    pub fn polls(&self) -> usize {
        self.script.polls.load(Ordering::SeqCst)
    }

    /// Bodies received on `POST /generateText`.
    pub fn prompts(&self) -> Vec<Value> {
        self.script.prompts.lock().unwrap().clone()
    }

    pub fn polled_ids(&self) -> Vec<String> {
        self.script.polled_ids.lock().unwrap().clone()
    }
}

pub struct ScriptBuilder {
    submit_status: Option<StatusCode>,
    submit_body: Value,
    statuses: Vec<Value>,
    status_delay: Option<Duration>,
}

impl ScriptBuilder {
    pub fn submit_reply(mut self, status: StatusCode, body: Value) -> Self {
        self.submit_status = Some(status);
        self.submit_body = body;
        self
    }

    pub fn statuses(mut self, statuses: Vec<Value>) -> Self {
        self.statuses = statuses;
        self
    }

    /// Delay every status response (simulates a slow backend).
    pub fn status_delay(mut self, delay: Duration) -> Self {
        self.status_delay = Some(delay);
        self
    }

    pub async fn spawn(self) -> ScriptedBackend {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        self.spawn_on(listener).await
    }

    pub async fn spawn_on(self, listener: TcpListener) -> ScriptedBackend {
        let last = self.statuses.last().cloned().unwrap_or_else(|| json!({}));
        let script = Arc::new(Script {
            submit_status: self.submit_status,
            submit_body: self.submit_body,
            statuses: Mutex::new(self.statuses.into()),
            last_status: Mutex::new(last),
            status_delay: self.status_delay,
            ..Script::default()
        });

        let router = Router::new()
            .route("/generateText", post(generate_text))
            .route("/task/{task_id}", get(task_status))
            .with_state(script.clone());

        let url = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        ScriptedBackend { url, script }
    }
}

async fn generate_text(
    State(script): State<Arc<Script>>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    script.prompts.lock().unwrap().push(body);
    (
        script.submit_status.unwrap_or(StatusCode::OK),
        Json(script.submit_body.clone()),
    )
}

async fn task_status(
    State(script): State<Arc<Script>>,
    Path(task_id): Path<String>,
) -> Json<Value> {
    script.polls.fetch_add(1, Ordering::SeqCst);
    script.polled_ids.lock().unwrap().push(task_id);
    if let Some(delay) = script.status_delay {
        tokio::time::sleep(delay).await;
    }
    let next = script.statuses.lock().unwrap().pop_front();
    match next {
        Some(v) => Json(v),
        None => Json(script.last_status.lock().unwrap().clone()),
    }
}

pub fn pending() -> Value {
    json!({ "status": "Task Pending" })
}

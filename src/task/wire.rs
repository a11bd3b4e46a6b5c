//! Backend wire types.
//!
//! The backend speaks loose JSON. Everything is decoded here into typed
//! values so the rest of the crate never walks a raw `serde_json::Value`.

use serde::Serialize;
use serde_json::{Map, Value};

/// Literal the backend uses in `status` while a task is still running.
pub const PENDING_STATUS: &str = "Task Pending";

/// Body of `POST /generateText`.
#[derive(Debug, Clone, Serialize)]
pub struct Prompt {
    pub prompt: String,
}

impl Prompt {
    pub fn new(text: impl Into<String>) -> Self {
        Self { prompt: text.into() }
    }
}

/// Opaque task identifier issued by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskHandle(String);

impl TaskHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Extract the task handle from a `/generateText` response body.
///
/// Only a non-empty string `task_id` is accepted.
pub fn parse_submission(body: &Value) -> Result<TaskHandle, String> {
    let obj = body
        .as_object()
        .ok_or_else(|| format!("expected a JSON object, got {}", kind_of(body)))?;

    match obj.get("task_id") {
        Some(Value::String(id)) if !id.trim().is_empty() => Ok(TaskHandle(id.clone())),
        Some(Value::String(_)) => Err("task_id is empty".to_string()),
        Some(other) => Err(format!("task_id must be a string, got {}", kind_of(other))),
        None => Err("response has no task_id".to_string()),
    }
}

/// Terminal payload: the backend's key/value pairs in the order received.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutput {
    fields: Map<String, Value>,
}

impl TaskOutput {
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl From<Map<String, Value>> for TaskOutput {
    fn from(fields: Map<String, Value>) -> Self {
        Self { fields }
    }
}

/// Decoded `GET /task/{id}` response.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskStatus {
    Pending,
    Done(TaskOutput),
}

impl TaskStatus {
    /// Classify a status body. Non-object bodies are rejected; any object
    /// whose `status` is not exactly [`PENDING_STATUS`] is terminal.
    pub fn from_value(body: Value) -> Result<Self, String> {
        match body {
            Value::Object(obj) => {
                let pending = matches!(
                    obj.get("status"),
                    Some(Value::String(s)) if s == PENDING_STATUS
                );
                if pending {
                    Ok(TaskStatus::Pending)
                } else {
                    Ok(TaskStatus::Done(TaskOutput::from(obj)))
                }
            }
            other => Err(format!("expected a JSON object, got {}", kind_of(&other))),
        }
    }
}

fn kind_of(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

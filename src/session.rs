//! Session handler — turns chat events into task-client calls and renders
//! the outcome as a single UI message.
//!
//! Holds no per-session state: channels call [`SessionHandler::on_chat_start`]
//! when a conversation opens and [`SessionHandler::on_message`] for every
//! user message. Failures never escape as errors; they come back as an
//! [`MessageKind::Error`] message so the channel loop keeps going.

use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use crate::task::{Prompt, TaskClient, TaskOutput};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Welcome,
    Answer,
    Error,
}

/// One message emitted to the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub kind: MessageKind,
    pub content: String,
}

impl ChatMessage {
    pub fn is_error(&self) -> bool {
        self.kind == MessageKind::Error
    }
}

pub struct SessionHandler {
    client: TaskClient,
    model_name: String,
}

impl SessionHandler {
    pub fn new(client: TaskClient, model_name: impl Into<String>) -> Self {
        Self { client, model_name: model_name.into() }
    }

    pub fn client(&self) -> &TaskClient {
        &self.client
    }

    /// Greeting sent when a chat opens.
    pub fn on_chat_start(&self) -> ChatMessage {
        ChatMessage {
            kind: MessageKind::Welcome,
            content: format!("Welcome to the {} chatbot!", self.model_name),
        }
    }

    /// Resolve `text` through the backend and return exactly one reply.
    pub async fn on_message(&self, text: &str, cancel: &CancellationToken) -> ChatMessage {
        let exchange_id = Uuid::new_v4();
        let span = info_span!("exchange", id = %exchange_id);

        async {
            info!(text_len = text.len(), "message received");
            let prompt = Prompt::new(text);

            match self.client.resolve(&prompt, cancel).await {
                Ok(output) => {
                    if output.is_empty() {
                        warn!("task finished with an empty payload");
                    }
                    ChatMessage {
                        kind: MessageKind::Answer,
                        content: format!(
                            "The answer from {}: \n{}",
                            self.model_name,
                            render_output(&output)
                        ),
                    }
                }
                Err(e) => {
                    warn!(error = %e, "exchange failed");
                    ChatMessage {
                        kind: MessageKind::Error,
                        content: format!("Sorry, the request failed: {e}"),
                    }
                }
            }
        }
        .instrument(span)
        .await
    }
}

/// `key: value` pairs joined by blank lines, in backend order.
///
/// Strings are shown bare; any other JSON value as its JSON text.
pub fn render_output(output: &TaskOutput) -> String {
    output
        .fields()
        .map(|(key, value)| match value {
            Value::String(s) => format!("{key}: {s}"),
            other => format!("{key}: {other}"),
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

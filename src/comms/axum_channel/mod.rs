//! Axum-based HTTP channel — a JSON chat surface where every request runs on
//! its own task, so one user's long generation never stalls another's.
//!
//! ```text
//! GET    /api/health
//! POST   /api/session                 — chat start: new session + welcome
//! DELETE /api/session/{session_id}    — end session, cancel its exchanges
//! POST   /api/message                 — one message, one reply
//! ```
//!
//! `run()` drives the axum event loop; the shutdown [`CancellationToken`] is
//! wired to axum's graceful shutdown.

mod api;

use std::sync::Arc;

use axum::{
    Router,
    routing::{delete, get, post},
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::AppError;
use crate::runtime::{Component, ComponentFuture};

use super::state::{CommsEvent, CommsState};

/// Router state injected into every handler. Cheap to clone.
#[derive(Clone)]
pub(crate) struct AxumState {
    pub channel_id: Arc<str>,
    pub comms: Arc<CommsState>,
}

pub struct AxumChannel {
    channel_id: String,
    bind_addr: String,
    state: Arc<CommsState>,
}

impl AxumChannel {
    pub fn new(
        channel_id: impl Into<String>,
        bind_addr: impl Into<String>,
        state: Arc<CommsState>,
    ) -> Self {
        Self {
            channel_id: channel_id.into(),
            bind_addr: bind_addr.into(),
            state,
        }
    }
}

impl Component for AxumChannel {
    fn id(&self) -> &str {
        &self.channel_id
    }

    fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture {
        Box::pin(run_axum(self.channel_id, self.bind_addr, self.state, shutdown))
    }
}

async fn run_axum(
    channel_id: String,
    bind_addr: String,
    comms: Arc<CommsState>,
    shutdown: CancellationToken,
) -> Result<(), AppError> {
    let router = build_router(AxumState {
        channel_id: Arc::from(channel_id.as_str()),
        comms: comms.clone(),
    });

    let listener = TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| AppError::Comms(format!("axum bind failed on {bind_addr}: {e}")))?;

    info!(%channel_id, %bind_addr, "axum channel listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| AppError::Comms(format!("axum server error: {e}")))?;

    info!(%channel_id, "axum channel shut down");
    comms.report_event(CommsEvent::ChannelShutdown { channel_id });
    Ok(())
}

fn build_router(state: AxumState) -> Router {
    Router::new()
        .route("/api/health",               get(api::health))
        .route("/api/session",              post(api::start_session))
        .route("/api/session/{session_id}", delete(api::end_session))
        .route("/api/message",              post(api::message))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::{Body, to_bytes};
    use axum::http::{Method, Request, StatusCode};
    use serde_json::{Value, json};
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    use super::*;
    use crate::session::SessionHandler;
    use crate::task::{PollPolicy, TaskClient};

    fn router() -> (Router, Arc<CommsState>) {
        let client =
            TaskClient::new("http://127.0.0.1:9", Duration::from_secs(1), PollPolicy::default())
                .unwrap();
        let handler = Arc::new(SessionHandler::new(client, "test-model"));
        let (tx, _rx) = mpsc::channel(8);
        let comms = Arc::new(CommsState::new(handler, tx, CancellationToken::new()));
        let state = AxumState { channel_id: Arc::from("http0"), comms: comms.clone() };
        (build_router(state), comms)
    }

    async fn call(router: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                req = req.header("content-type", "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };
        let resp = router.clone().oneshot(req.body(body).unwrap()).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), 64 * 1024).await.unwrap();
        let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, value)
    }

    #[tokio::test]
    async fn health_reports_backend() {
        let (router, _) = router();
        let (status, body) = call(&router, Method::GET, "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["backend"], "http://127.0.0.1:9/");
    }

    #[tokio::test]
    async fn start_session_returns_welcome() {
        let (router, comms) = router();
        let (status, body) = call(&router, Method::POST, "/api/session", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"]["kind"], "welcome");
        assert_eq!(body["message"]["content"], "Welcome to the test-model chatbot!");
        assert!(body["session_id"].as_str().is_some_and(|s| !s.is_empty()));
        assert_eq!(comms.session_count(), 1);
    }

    #[tokio::test]
    async fn end_session_then_unknown() {
        let (router, _) = router();
        let (_, body) = call(&router, Method::POST, "/api/session", None).await;
        let uri = format!("/api/session/{}", body["session_id"].as_str().unwrap());

        let (status, _) = call(&router, Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, body) = call(&router, Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "unknown_session");
    }

    #[tokio::test]
    async fn empty_message_rejected() {
        let (router, _) = router();
        let (status, body) =
            call(&router, Method::POST, "/api/message", Some(json!({ "message": "   " }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "empty_message");
    }

    #[tokio::test]
    async fn message_for_unknown_session_is_404() {
        let (router, _) = router();
        let (status, _) = call(
            &router,
            Method::POST,
            "/api/message",
            Some(json!({ "message": "hi", "session_id": "nope" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn backend_failure_is_an_error_reply_not_an_http_error() {
        let (router, _) = router();
        let (status, body) =
            call(&router, Method::POST, "/api/message", Some(json!({ "message": "Hello" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"]["kind"], "error");
        assert!(body["session_id"].is_null());
    }
}

//! Shared state for comms channels — the capability boundary between a UI
//! surface and the session handler.
//!
//! Channels receive an `Arc<CommsState>` and go through the typed methods
//! below. Chat sessions opened over HTTP are tracked here so they can be
//! torn down (cancelling their in-flight exchanges) independently of each
//! other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use uuid::Uuid;

use crate::session::{ChatMessage, SessionHandler};

/// Events a channel sends back to the comms manager.
#[derive(Debug)]
pub enum CommsEvent {
    /// Channel has stopped (clean exit or EOF).
    ChannelShutdown { channel_id: String },
    /// A chat session was opened on the channel.
    SessionStarted { channel_id: String, session_id: String },
    /// A chat session was closed; its exchanges were cancelled.
    SessionEnded { session_id: String },
}

pub struct CommsState {
    session: Arc<SessionHandler>,
    event_tx: mpsc::Sender<CommsEvent>,
    /// Process-wide shutdown; every exchange token derives from it.
    shutdown: CancellationToken,
    sessions: Mutex<HashMap<String, CancellationToken>>,
}

impl CommsState {
    pub fn new(
        session: Arc<SessionHandler>,
        event_tx: mpsc::Sender<CommsEvent>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            session,
            event_tx,
            shutdown,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn backend_url(&self) -> &str {
        self.session.client().base_url()
    }

    /// Open a chat session: register a cancellation scope and return the
    /// session id with the welcome message.
    pub fn open_session(&self, channel_id: &str) -> (String, ChatMessage) {
        let session_id = Uuid::new_v4().to_string();
        let token = self.shutdown.child_token();
        self.lock_sessions().insert(session_id.clone(), token);

        self.report_event(CommsEvent::SessionStarted {
            channel_id: channel_id.to_string(),
            session_id: session_id.clone(),
        });
        (session_id, self.session.on_chat_start())
    }

    /// Close `session_id`, cancelling anything still running in it.
    /// Returns `false` for unknown ids.
    pub fn close_session(&self, session_id: &str) -> bool {
        let Some(token) = self.lock_sessions().remove(session_id) else {
            return false;
        };
        token.cancel();
        self.report_event(CommsEvent::SessionEnded { session_id: session_id.to_string() });
        true
    }

    /// Cancellation token for one exchange in `session_id`, or `None` if the
    /// session is unknown.
    pub fn session_token(&self, session_id: &str) -> Option<CancellationToken> {
        self.lock_sessions().get(session_id).map(CancellationToken::child_token)
    }

    /// Cancellation token for an exchange outside any tracked session.
    pub fn exchange_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }

    pub fn session_count(&self) -> usize {
        self.lock_sessions().len()
    }

    /// Welcome message for a channel that is its own single session.
    pub fn welcome(&self, channel_id: &str) -> ChatMessage {
        self.report_event(CommsEvent::SessionStarted {
            channel_id: channel_id.to_string(),
            session_id: channel_id.to_string(),
        });
        self.session.on_chat_start()
    }

    /// Run one user message through the session handler.
    pub async fn send_message(&self, content: &str, cancel: &CancellationToken) -> ChatMessage {
        self.session.on_message(content, cancel).await
    }

    /// Report an event to the comms manager. Drops the event with a warning
    /// if the manager is behind or gone.
    pub fn report_event(&self, event: CommsEvent) {
        if let Err(e) = self.event_tx.try_send(event) {
            warn!("comms event dropped: {e}");
        }
    }

    fn lock_sessions(&self) -> std::sync::MutexGuard<'_, HashMap<String, CancellationToken>> {
        // A panic while holding the lock leaves the map itself consistent.
        self.sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

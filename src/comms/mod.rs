//! Comms subsystem — the UI surfaces users chat through.
//!
//! Each channel (console, HTTP) implements [`Component`] and is spawned as
//! an independent task by [`start`]. Channels capture their shared
//! [`Arc<CommsState>`] at construction time.
//!
//! An intra-subsystem [`mpsc`] channel lets running channels report
//! lifecycle events (sessions opened/closed, channel exit). The manager task
//! behind the returned [`SubsystemHandle`] keeps session counts from those
//! events while it waits on the channels.

mod state;
#[cfg(feature = "channel-axum")]
pub mod axum_channel;
#[cfg(feature = "channel-pty")]
pub mod pty;

pub use state::{CommsEvent, CommsState};

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::AppError;
use crate::runtime::{Component, SubsystemHandle, spawn_components};
use crate::session::SessionHandler;

/// Spawn all configured channels and return a [`SubsystemHandle`].
///
/// Synchronous: returns as soon as the tasks are spawned. If any channel
/// fails, `shutdown` is cancelled so the others stop too.
pub fn start(
    config: &Config,
    session: Arc<SessionHandler>,
    shutdown: CancellationToken,
) -> SubsystemHandle {
    let (event_tx, event_rx) = mpsc::channel::<CommsEvent>(32);
    let state = Arc::new(CommsState::new(session, event_tx, shutdown.clone()));

    let mut components: Vec<Box<dyn Component>> = Vec::new();

    #[cfg(feature = "channel-pty")]
    {
        if config.comms_pty_should_load() {
            info!("loading pty channel");
            components.push(Box::new(pty::PtyChannel::new("pty0", state.clone())));
        }
    }

    #[cfg(feature = "channel-axum")]
    {
        if config.comms_http_should_load() {
            info!(bind = %config.comms.http.bind, "loading axum channel");
            components.push(Box::new(axum_channel::AxumChannel::new(
                "http0",
                config.comms.http.bind.clone(),
                state.clone(),
            )));
        }
    }

    #[cfg(not(feature = "channel-axum"))]
    {
        if config.comms_http_should_load() {
            warn!("http channel enabled in config but built without the channel-axum feature");
        }
    }

    if components.is_empty() {
        warn!("no comms channels configured — nothing to do");
    }

    // Only the channels hold senders now; the queue closes when they exit.
    drop(state);
    let channels = spawn_components(components, shutdown);
    SubsystemHandle::from_handle(tokio::spawn(manage(event_rx, channels)))
}

/// Session bookkeeping kept by the comms manager.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CommsStats {
    pub sessions_opened: usize,
    pub sessions_ended: usize,
    pub channels_stopped: usize,
}

impl CommsStats {
    fn record(&mut self, event: &CommsEvent) {
        match event {
            CommsEvent::ChannelShutdown { channel_id } => {
                self.channels_stopped += 1;
                debug!(channel_id, "channel reported shutdown");
            }
            CommsEvent::SessionStarted { channel_id, session_id } => {
                self.sessions_opened += 1;
                debug!(channel_id, session_id, open = self.open_sessions(), "chat session started");
            }
            CommsEvent::SessionEnded { session_id } => {
                self.sessions_ended += 1;
                debug!(session_id, open = self.open_sessions(), "chat session ended");
            }
        }
    }

    /// Sessions started but never explicitly ended.
    pub fn open_sessions(&self) -> usize {
        self.sessions_opened.saturating_sub(self.sessions_ended)
    }
}

/// Manager task: services the event queue while the channels run, then
/// returns the channels' result.
async fn manage(
    mut events: mpsc::Receiver<CommsEvent>,
    channels: SubsystemHandle,
) -> Result<(), AppError> {
    let mut stats = CommsStats::default();
    let mut join = std::pin::pin!(channels.join());

    let result = loop {
        tokio::select! {
            Some(event) = events.recv() => stats.record(&event),
            result = &mut join => break result,
        }
    };
    while let Ok(event) = events.try_recv() {
        stats.record(&event);
    }

    info!(
        sessions_opened = stats.sessions_opened,
        sessions_left_open = stats.open_sessions(),
        channels_stopped = stats.channels_stopped,
        "comms stopped"
    );
    result
}

//! PTY (console) comms channel — one chat session on stdin/stdout.
//!
//! Prints the welcome on start, then sends each non-empty line through
//! [`CommsState::send_message`] and prints the single reply. Runs until the
//! `shutdown` token is cancelled (Ctrl-C) or stdin is closed.

use std::io::Write as _;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::runtime::{Component, ComponentFuture};

use super::state::{CommsEvent, CommsState};

pub struct PtyChannel {
    channel_id: String,
    state: Arc<CommsState>,
}

impl PtyChannel {
    pub fn new(channel_id: impl Into<String>, state: Arc<CommsState>) -> Self {
        Self { channel_id: channel_id.into(), state }
    }
}

impl Component for PtyChannel {
    fn id(&self) -> &str {
        &self.channel_id
    }

    fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture {
        Box::pin(run_pty(self.channel_id, self.state, shutdown))
    }
}

async fn run_pty(
    channel_id: String,
    state: Arc<CommsState>,
    shutdown: CancellationToken,
) -> Result<(), AppError> {
    info!(%channel_id, "pty channel started");
    println!("─────────────────────────────────");
    println!(" taskchat console  (Ctrl-C to quit)");
    println!("─────────────────────────────────");
    println!("{}", state.welcome(&channel_id).content);

    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();

    loop {
        print!("> ");
        let _ = std::io::stdout().flush();

        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                println!("\n[pty] shutdown signal received — closing console channel");
                info!("pty channel shutting down");
                break;
            }

            line = lines.next_line() => {
                match line {
                    Err(e) => {
                        warn!("pty read error: {e}");
                        break;
                    }
                    Ok(None) => {
                        info!("pty stdin closed");
                        break;
                    }
                    Ok(Some(input)) => {
                        let input = input.trim();
                        if input.is_empty() { continue; }

                        debug!(input_len = input.len(), "pty received line");

                        // Shutdown cancels the exchange; the reply then reports
                        // the cancellation and the loop exits on the next turn.
                        let cancel = state.exchange_token();
                        let reply = state.send_message(input, &cancel).await;
                        println!("{}", reply.content);
                    }
                }
            }
        }
    }

    state.report_event(CommsEvent::ChannelShutdown { channel_id });
    Ok(())
}

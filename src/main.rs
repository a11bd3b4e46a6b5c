//! taskchat — entry point.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Load config
//!   3. Resolve effective log level (CLI `-v` flags > env > config)
//!   4. Init logger once
//!   5. Resolve the backend url (explicit or discovered; fatal on failure)
//!   6. Build task client + session handler
//!   7. Spawn Ctrl-C → shutdown signal watcher
//!   8. Run comms channels until they exit or shutdown

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use taskchat::error::AppError;
use taskchat::session::SessionHandler;
use taskchat::task::{PollPolicy, TaskClient};
use taskchat::{comms, config, discovery, logger};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    // Load .env if present — ignore errors (file is optional).
    let _ = dotenvy::dotenv();

    let args = parse_cli_args();

    let mut config = config::load(args.config_path.as_deref())?;
    if args.no_console {
        config.comms.pty.enabled = false;
    }

    let effective_log_level = args.log_level.unwrap_or(config.log_level.as_str());
    logger::init(effective_log_level, args.log_level.is_some())?;

    info!(
        app_name = %config.app_name,
        configured_log_level = %config.log_level,
        effective_log_level = %effective_log_level,
        "config loaded"
    );

    let backend_url = discovery::resolve_backend_url(&config.backend).await?;

    let policy = PollPolicy::from(&config.polling);
    info!(
        backend = %backend_url,
        interval_ms = policy.interval.as_millis() as u64,
        timeout_s = ?policy.timeout.map(|t| t.as_secs()),
        max_polls = ?policy.max_polls,
        "task client ready"
    );
    let client = TaskClient::new(
        &backend_url,
        Duration::from_secs(config.backend.request_timeout_seconds),
        policy,
    )
    .map_err(|e| AppError::Config(e.to_string()))?;

    let session = Arc::new(SessionHandler::new(client, config.session.model_name.clone()));

    let shutdown = CancellationToken::new();
    let ctrlc_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received — initiating shutdown");
            ctrlc_token.cancel();
        }
    });

    let handle = comms::start(&config, session, shutdown.clone());
    let result = handle.join().await;

    shutdown.cancel();
    info!("taskchat stopped");
    result
}

struct CliArgs {
    log_level: Option<&'static str>,
    config_path: Option<String>,
    no_console: bool,
}

fn parse_cli_args() -> CliArgs {
    let mut verbosity = 0u8;
    let mut config_path = None;
    let mut no_console = false;

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        if arg == "--" {
            break;
        }

        match arg.as_str() {
            "-h" | "--help" => {
                println!("Usage: taskchat [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -h, --help                 Print help");
                println!("  -f, --config <PATH>        Path to configuration file (default: config/default.toml)");
                println!("      --no-console           Disable the interactive console channel");
                println!("  -v, -vv, -vvv, -vvvv       Increase logging verbosity");
                println!();
                println!("Environment:");
                println!("  TASKCHAT_BACKEND_URL       Backend base url (overrides [backend] url)");
                println!("  TASKCHAT_LOG_LEVEL         Log level (overrides [app] log_level)");
                std::process::exit(0);
            }
            "--no-console" => no_console = true,
            "-f" | "--config" => {
                if let Some(path) = iter.next() {
                    config_path = Some(path);
                } else {
                    eprintln!("error: -f/--config requires a path argument");
                    std::process::exit(1);
                }
            }
            "--verbose" => verbosity = verbosity.saturating_add(1),
            a if a.starts_with('-') && a.len() > 1 && a.chars().skip(1).all(|c| c == 'v') => {
                verbosity = verbosity.saturating_add((a.len() - 1) as u8);
            }
            _ => {}
        }
    }

    CliArgs {
        log_level: logger::level_for_verbosity(verbosity),
        config_path,
        no_console,
    }
}

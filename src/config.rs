//! Configuration loading with env-var overrides.
//!
//! Reads `config/default.toml` relative to the current working directory (or
//! an explicit `-f` path), then applies `TASKCHAT_BACKEND_URL` and
//! `TASKCHAT_LOG_LEVEL` env overrides.

use std::{env, fs, path::Path};

use serde::Deserialize;

use crate::error::AppError;
use crate::logger;

const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Public IP discovery used to build the backend URL when none is configured.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub enabled: bool,
    /// Lookup endpoint; must answer `{"ip": "<address>"}`.
    pub endpoint: String,
    /// Port the backend listens on at the discovered address.
    pub port: u16,
}

/// Task backend configuration (`[backend]`).
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Explicit base URL, e.g. `http://10.0.0.5:8000`. Takes precedence over
    /// discovery.
    pub url: Option<String>,
    /// Per-request HTTP timeout in seconds.
    pub request_timeout_seconds: u64,
    pub discovery: DiscoveryConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffMode {
    Fixed,
    Exponential,
}

/// Status polling bounds (`[polling]`).
#[derive(Debug, Clone)]
pub struct PollConfig {
    pub interval_ms: u64,
    pub backoff: BackoffMode,
    pub backoff_factor: f64,
    pub max_interval_ms: u64,
    /// `0` disables the deadline.
    pub timeout_seconds: u64,
    pub max_polls: Option<u32>,
}

/// Session handler configuration (`[session]`).
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Model name shown in the welcome message and reply header.
    pub model_name: String,
}

/// PTY (console) channel configuration.
#[derive(Debug, Clone)]
pub struct PtyConfig {
    pub enabled: bool,
}

/// HTTP channel configuration.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub enabled: bool,
    /// Socket address to bind the HTTP channel to.
    pub bind: String,
}

/// Comms subsystem configuration.
#[derive(Debug, Clone)]
pub struct CommsConfig {
    pub pty: PtyConfig,
    pub http: HttpConfig,
}

/// Fully-resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub app_name: String,
    pub log_level: String,
    pub backend: BackendConfig,
    pub polling: PollConfig,
    pub session: SessionConfig,
    pub comms: CommsConfig,
}

impl Config {
    /// Returns `true` if the PTY channel should be loaded.
    pub fn comms_pty_should_load(&self) -> bool {
        self.comms.pty.enabled
    }

    /// Returns `true` if the HTTP channel should be loaded.
    pub fn comms_http_should_load(&self) -> bool {
        self.comms.http.enabled
    }
}

// ── Raw TOML shape ────────────────────────────────────────────────────────────

#[derive(Deserialize, Default)]
struct RawConfig {
    #[serde(default)]
    app: RawApp,
    #[serde(default)]
    backend: RawBackend,
    #[serde(default)]
    polling: RawPolling,
    #[serde(default)]
    session: RawSession,
    #[serde(default)]
    comms: RawComms,
}

#[derive(Deserialize)]
struct RawApp {
    #[serde(default = "default_app_name")]
    name: String,
    #[serde(default = "default_log_level")]
    log_level: String,
}

impl Default for RawApp {
    fn default() -> Self {
        Self { name: default_app_name(), log_level: default_log_level() }
    }
}

#[derive(Deserialize)]
struct RawBackend {
    #[serde(default)]
    url: Option<String>,
    #[serde(default = "default_request_timeout_seconds")]
    request_timeout_seconds: u64,
    #[serde(default)]
    discovery: RawDiscovery,
}

impl Default for RawBackend {
    fn default() -> Self {
        Self {
            url: None,
            request_timeout_seconds: default_request_timeout_seconds(),
            discovery: RawDiscovery::default(),
        }
    }
}

#[derive(Deserialize)]
struct RawDiscovery {
    /// Defaults to `false`: discovery needs outbound internet access.
    #[serde(default = "default_false")]
    enabled: bool,
    #[serde(default = "default_discovery_endpoint")]
    endpoint: String,
    #[serde(default = "default_backend_port")]
    port: u16,
}

impl Default for RawDiscovery {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_discovery_endpoint(),
            port: default_backend_port(),
        }
    }
}

#[derive(Deserialize)]
struct RawPolling {
    #[serde(default = "default_interval_ms")]
    interval_ms: u64,
    #[serde(default = "default_backoff")]
    backoff: BackoffMode,
    #[serde(default = "default_backoff_factor")]
    backoff_factor: f64,
    #[serde(default = "default_max_interval_ms")]
    max_interval_ms: u64,
    #[serde(default = "default_timeout_seconds")]
    timeout_seconds: u64,
    #[serde(default)]
    max_polls: Option<u32>,
}

impl Default for RawPolling {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            backoff: default_backoff(),
            backoff_factor: default_backoff_factor(),
            max_interval_ms: default_max_interval_ms(),
            timeout_seconds: default_timeout_seconds(),
            max_polls: None,
        }
    }
}

#[derive(Deserialize)]
struct RawSession {
    #[serde(default = "default_model_name")]
    model_name: String,
}

impl Default for RawSession {
    fn default() -> Self {
        Self { model_name: default_model_name() }
    }
}

#[derive(Deserialize, Default)]
struct RawComms {
    #[serde(default)]
    pty: RawPty,
    #[serde(default)]
    http: RawHttp,
}

#[derive(Deserialize)]
struct RawPty {
    #[serde(default = "default_true")]
    enabled: bool,
}

impl Default for RawPty {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Deserialize)]
struct RawHttp {
    /// Defaults to `false`: HTTP must be explicitly enabled.
    #[serde(default = "default_false")]
    enabled: bool,
    #[serde(default = "default_http_bind")]
    bind: String,
}

impl Default for RawHttp {
    fn default() -> Self {
        Self { enabled: false, bind: default_http_bind() }
    }
}

fn default_app_name() -> String { "taskchat".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_request_timeout_seconds() -> u64 { 30 }
fn default_discovery_endpoint() -> String { "https://api64.ipify.org?format=json".to_string() }
fn default_backend_port() -> u16 { 8000 }
fn default_interval_ms() -> u64 { 2000 }
fn default_backoff() -> BackoffMode { BackoffMode::Fixed }
fn default_backoff_factor() -> f64 { 2.0 }
fn default_max_interval_ms() -> u64 { 30_000 }
fn default_timeout_seconds() -> u64 { 600 }
fn default_model_name() -> String { "meta-llama/Llama-2-7b-chat-hf".to_string() }
fn default_http_bind() -> String { "127.0.0.1:8080".to_string() }
fn default_true() -> bool { true }
fn default_false() -> bool { false }

// ── Loading ───────────────────────────────────────────────────────────────────

/// Load config from `config_path` (or `config/default.toml`), then apply
/// env-var overrides.
///
/// With no explicit path and no `config/default.toml` on disk, built-in
/// defaults are used.
pub fn load(config_path: Option<&str>) -> Result<Config, AppError> {
    let backend_url_override = env::var("TASKCHAT_BACKEND_URL").ok();
    let log_level_override = env::var("TASKCHAT_LOG_LEVEL").ok();

    match config_path {
        Some(path) => load_from(
            Path::new(path),
            backend_url_override.as_deref(),
            log_level_override.as_deref(),
        ),
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => load_from(
            Path::new(DEFAULT_CONFIG_PATH),
            backend_url_override.as_deref(),
            log_level_override.as_deref(),
        ),
        None => resolve(
            RawConfig::default(),
            backend_url_override.as_deref(),
            log_level_override.as_deref(),
        ),
    }
}

/// Internal loader — accepts an explicit path and optional overrides.
/// Tests pass overrides directly instead of mutating env vars.
pub fn load_from(
    path: &Path,
    backend_url_override: Option<&str>,
    log_level_override: Option<&str>,
) -> Result<Config, AppError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;

    let parsed: RawConfig = toml::from_str(&raw)
        .map_err(|e| AppError::Config(format!("parse error in {}: {e}", path.display())))?;

    resolve(parsed, backend_url_override, log_level_override)
}

fn resolve(
    parsed: RawConfig,
    backend_url_override: Option<&str>,
    log_level_override: Option<&str>,
) -> Result<Config, AppError> {
    let p = parsed.polling;
    if p.interval_ms == 0 {
        return Err(AppError::Config("polling.interval_ms must be greater than 0".into()));
    }
    if !p.backoff_factor.is_finite() || p.backoff_factor < 1.0 {
        return Err(AppError::Config(format!(
            "polling.backoff_factor must be a finite number >= 1.0, got {}",
            p.backoff_factor
        )));
    }
    if p.max_interval_ms < p.interval_ms {
        return Err(AppError::Config(format!(
            "polling.max_interval_ms ({}) is below polling.interval_ms ({})",
            p.max_interval_ms, p.interval_ms
        )));
    }
    if p.max_polls == Some(0) {
        return Err(AppError::Config("polling.max_polls must be at least 1".into()));
    }

    let log_level = log_level_override.unwrap_or(&parsed.app.log_level).trim().to_string();
    logger::parse_level(&log_level).map_err(|e| AppError::Config(format!("app.log_level: {e}")))?;

    let url = backend_url_override
        .map(str::to_string)
        .or(parsed.backend.url)
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty());

    Ok(Config {
        app_name: parsed.app.name,
        log_level,
        backend: BackendConfig {
            url,
            request_timeout_seconds: parsed.backend.request_timeout_seconds,
            discovery: DiscoveryConfig {
                enabled: parsed.backend.discovery.enabled,
                endpoint: parsed.backend.discovery.endpoint,
                port: parsed.backend.discovery.port,
            },
        },
        polling: PollConfig {
            interval_ms: p.interval_ms,
            backoff: p.backoff,
            backoff_factor: p.backoff_factor,
            max_interval_ms: p.max_interval_ms,
            timeout_seconds: p.timeout_seconds,
            max_polls: p.max_polls,
        },
        session: SessionConfig { model_name: parsed.session.model_name },
        comms: CommsConfig {
            pty: PtyConfig { enabled: parsed.comms.pty.enabled },
            http: HttpConfig {
                enabled: parsed.comms.http.enabled,
                bind: parsed.comms.http.bind,
            },
        },
    })
}

// ── test helpers ──────────────────────────────────────────────────────────────

impl Config {
    /// Config pointing at `backend_url` with fast polling and no channels.
    pub fn test_default(backend_url: &str) -> Self {
        Self {
            app_name: "test".into(),
            log_level: "info".into(),
            backend: BackendConfig {
                url: Some(backend_url.to_string()),
                request_timeout_seconds: 5,
                discovery: DiscoveryConfig {
                    enabled: false,
                    endpoint: default_discovery_endpoint(),
                    port: default_backend_port(),
                },
            },
            polling: PollConfig {
                interval_ms: 10,
                backoff: BackoffMode::Fixed,
                backoff_factor: 2.0,
                max_interval_ms: 100,
                timeout_seconds: 10,
                max_polls: None,
            },
            session: SessionConfig { model_name: "test-model".into() },
            comms: CommsConfig {
                pty: PtyConfig { enabled: false },
                http: HttpConfig { enabled: false, bind: default_http_bind() },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MINIMAL_TOML: &str = r#"
[app]
name = "test-chat"
log_level = "info"

[backend]
url = "http://10.0.0.5:8000"
"#;

    fn write_toml(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn parse_basic_config() {
        let f = write_toml(MINIMAL_TOML);
        let cfg = load_from(f.path(), None, None).unwrap();
        assert_eq!(cfg.app_name, "test-chat");
        assert_eq!(cfg.backend.url.as_deref(), Some("http://10.0.0.5:8000"));
        assert_eq!(cfg.session.model_name, "meta-llama/Llama-2-7b-chat-hf");
    }

    #[test]
    fn polling_defaults() {
        let f = write_toml(MINIMAL_TOML);
        let cfg = load_from(f.path(), None, None).unwrap();
        assert_eq!(cfg.polling.interval_ms, 2000);
        assert_eq!(cfg.polling.backoff, BackoffMode::Fixed);
        assert_eq!(cfg.polling.timeout_seconds, 600);
        assert_eq!(cfg.polling.max_polls, None);
        assert_eq!(cfg.backend.request_timeout_seconds, 30);
    }

    #[test]
    fn empty_file_uses_defaults() {
        let f = write_toml("");
        let cfg = load_from(f.path(), None, None).unwrap();
        assert_eq!(cfg.app_name, "taskchat");
        assert!(cfg.backend.url.is_none());
        assert!(!cfg.backend.discovery.enabled);
        assert_eq!(cfg.backend.discovery.port, 8000);
        assert!(cfg.comms_pty_should_load());
        assert!(!cfg.comms_http_should_load());
    }

    #[test]
    fn exponential_backoff_parses() {
        let f = write_toml(
            r#"
[polling]
backoff = "exponential"
backoff_factor = 1.5
max_interval_ms = 8000
max_polls = 20
"#,
        );
        let cfg = load_from(f.path(), None, None).unwrap();
        assert_eq!(cfg.polling.backoff, BackoffMode::Exponential);
        assert_eq!(cfg.polling.backoff_factor, 1.5);
        assert_eq!(cfg.polling.max_polls, Some(20));
    }

    #[test]
    fn unknown_backoff_errors() {
        let f = write_toml("[polling]\nbackoff = \"jittered\"\n");
        let msg = load_from(f.path(), None, None).unwrap_err().to_string();
        assert!(msg.contains("parse error"));
    }

    #[test]
    fn zero_interval_rejected() {
        let f = write_toml("[polling]\ninterval_ms = 0\n");
        assert!(load_from(f.path(), None, None).is_err());
    }

    #[test]
    fn max_interval_below_interval_rejected() {
        let f = write_toml("[polling]\ninterval_ms = 5000\nmax_interval_ms = 1000\n");
        let msg = load_from(f.path(), None, None).unwrap_err().to_string();
        assert!(msg.contains("max_interval_ms"));
    }

    #[test]
    fn missing_file_errors() {
        let result = load_from(Path::new("/nonexistent/config.toml"), None, None);
        let msg = result.unwrap_err().to_string();
        assert!(msg.contains("config error"));
    }

    #[test]
    fn env_backend_url_override() {
        let f = write_toml(MINIMAL_TOML);
        let cfg = load_from(f.path(), Some("http://192.168.1.9:9000"), None).unwrap();
        assert_eq!(cfg.backend.url.as_deref(), Some("http://192.168.1.9:9000"));
    }

    #[test]
    fn blank_backend_url_is_unset() {
        let f = write_toml("[backend]\nurl = \"  \"\n");
        let cfg = load_from(f.path(), None, None).unwrap();
        assert!(cfg.backend.url.is_none());
    }

    #[test]
    fn non_finite_backoff_factor_rejected() {
        for factor in ["nan", "inf", "-inf"] {
            let f = write_toml(&format!(
                "[polling]\nbackoff = \"exponential\"\nbackoff_factor = {factor}\n"
            ));
            let msg = load_from(f.path(), None, None).unwrap_err().to_string();
            assert!(msg.contains("backoff_factor"), "{factor}: {msg}");
        }
    }

    #[test]
    fn huge_backoff_factor_polls_at_the_cap() {
        let f = write_toml(
            "[polling]\nbackoff = \"exponential\"\nbackoff_factor = 1e300\nmax_interval_ms = 4000\n",
        );
        let cfg = load_from(f.path(), None, None).unwrap();
        let policy = crate::task::PollPolicy::from(&cfg.polling);
        assert_eq!(policy.next_delay(policy.interval), std::time::Duration::from_secs(4));
    }

    #[test]
    fn unknown_log_level_rejected() {
        let f = write_toml("[app]\nlog_level = \"verbose\"\n");
        let msg = load_from(f.path(), None, None).unwrap_err().to_string();
        assert!(msg.contains("unrecognised log level"), "{msg}");
    }

    #[test]
    fn unknown_env_log_level_rejected() {
        let f = write_toml(MINIMAL_TOML);
        assert!(load_from(f.path(), None, Some("verbose")).is_err());
    }

    #[test]
    fn env_log_level_override() {
        let f = write_toml(MINIMAL_TOML);
        let cfg = load_from(f.path(), None, Some("debug")).unwrap();
        assert_eq!(cfg.log_level, "debug");
    }
}

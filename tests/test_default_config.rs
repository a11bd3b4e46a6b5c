//! The shipped `config/default.toml` loads and matches the documented defaults.

use std::path::Path;
use std::time::Duration;

use taskchat::config::{self, BackoffMode};
use taskchat::task::PollPolicy;

#[test]
fn default_config_file_exists() {
    assert!(Path::new("config/default.toml").is_file(), "config/default.toml missing");
}

#[test]
fn default_config_loads() {
    let cfg = config::load_from(Path::new("config/default.toml"), None, None).unwrap();
    assert_eq!(cfg.app_name, "taskchat");
    assert_eq!(cfg.backend.url.as_deref(), Some("http://127.0.0.1:8000"));
    assert!(!cfg.backend.discovery.enabled);
    assert_eq!(cfg.backend.discovery.endpoint, "https://api64.ipify.org?format=json");
    assert_eq!(cfg.session.model_name, "meta-llama/Llama-2-7b-chat-hf");
    assert!(cfg.comms_pty_should_load());
    assert!(!cfg.comms_http_should_load());
}

#[test]
fn default_polling_is_two_seconds_fixed_and_bounded() {
    let cfg = config::load_from(Path::new("config/default.toml"), None, None).unwrap();
    assert_eq!(cfg.polling.backoff, BackoffMode::Fixed);

    let policy = PollPolicy::from(&cfg.polling);
    assert_eq!(policy.interval, Duration::from_secs(2));
    assert_eq!(policy.timeout, Some(Duration::from_secs(600)));
    assert_eq!(policy.max_polls, None);
}

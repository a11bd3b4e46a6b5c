//! Poll scheduling for [`super::TaskClient::await_result`].

use std::time::Duration;

use crate::config::{BackoffMode, PollConfig};

/// How the delay between status polls evolves.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    Fixed,
    Exponential { factor: f64, max: Duration },
}

/// Bounds and pacing for one poll loop.
#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    /// Delay before the second poll.
    pub interval: Duration,
    pub backoff: Backoff,
    /// Overall deadline; `None` polls until the task finishes.
    pub timeout: Option<Duration>,
    pub max_polls: Option<u32>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            backoff: Backoff::Fixed,
            timeout: Some(Duration::from_secs(600)),
            max_polls: None,
        }
    }
}

impl PollPolicy {
    pub fn fixed(interval: Duration) -> Self {
        Self { interval, ..Self::default() }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_polls(mut self, max_polls: u32) -> Self {
        self.max_polls = Some(max_polls);
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Delay to use after `current`. Saturates at `max` when the product
    /// does not fit a `Duration` (overflow, NaN).
    pub fn next_delay(&self, current: Duration) -> Duration {
        match self.backoff {
            Backoff::Fixed => current,
            Backoff::Exponential { factor, max } => {
                Duration::try_from_secs_f64(current.as_secs_f64() * factor)
                    .map_or(max, |d| d.min(max))
            }
        }
    }

    /// `true` once `polls` requests have used up the poll budget.
    pub fn polls_exhausted(&self, polls: u32) -> bool {
        self.max_polls.is_some_and(|max| polls >= max)
    }
}

impl From<&PollConfig> for PollPolicy {
    fn from(cfg: &PollConfig) -> Self {
        let backoff = match cfg.backoff {
            BackoffMode::Fixed => Backoff::Fixed,
            BackoffMode::Exponential => Backoff::Exponential {
                factor: cfg.backoff_factor,
                max: Duration::from_millis(cfg.max_interval_ms),
            },
        };
        Self {
            interval: Duration::from_millis(cfg.interval_ms),
            backoff,
            timeout: (cfg.timeout_seconds > 0).then(|| Duration::from_secs(cfg.timeout_seconds)),
            max_polls: cfg.max_polls,
        }
    }
}

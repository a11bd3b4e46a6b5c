//! Application-wide error types.

use thiserror::Error;

use crate::discovery::DiscoveryError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error("logger error: {0}")]
    Logger(String),

    #[error("backend discovery failed: {0}")]
    Discovery(DiscoveryError),

    #[error("comms error: {0}")]
    Comms(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A missing backend url with discovery off is a configuration problem, not
/// a failed lookup.
impl From<DiscoveryError> for AppError {
    fn from(e: DiscoveryError) -> Self {
        match e {
            DiscoveryError::NotConfigured => AppError::Config(e.to_string()),
            other => AppError::Discovery(other),
        }
    }
}

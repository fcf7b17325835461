//! Error types for each stage of the deal pipeline.

use std::time::Duration;
use thiserror::Error;

/// Errors raised by storefront adapters.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Upstream unreachable or non-success status.
    #[error("network error: {0}")]
    Network(String),

    /// Response did not have the expected shape.
    #[error("parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Parse(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}

/// Errors raised by the currency rate adapter.
#[derive(Error, Debug)]
pub enum RateError {
    /// Upstream unreachable and nothing cached.
    #[error("rate unavailable for {from}->{to}: {reason}")]
    Unavailable {
        from: String,
        to: String,
        reason: String,
    },
}

/// Errors raised by the deal store.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("database rejected request: {status} - {body}")]
    Rejected { status: u16, body: String },

    #[error("stored document is malformed: {0}")]
    Malformed(String),
}

/// Errors raised by notification sinks.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("notification channel closed")]
    ChannelClosed,
}

/// Missing or invalid configuration. Fatal at startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Failure of a whole scheduled run.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("a run is already in progress")]
    AlreadyRunning,

    #[error("{stage} timed out after {after:?}")]
    Timeout { stage: &'static str, after: Duration },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Rate(#[from] RateError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_keeps_sub_second_precision() {
        let err = RunError::Timeout {
            stage: "store fetch",
            after: Duration::from_millis(50),
        };
        assert_eq!(err.to_string(), "store fetch timed out after 50ms");
    }
}

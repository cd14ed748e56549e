//! Continuous profiling error types.

use std::time::Duration;

use thiserror::Error;

/// Errors that end a single scrape cycle.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("invalid target url: {0}")]
    InvalidTarget(#[from] url::ParseError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("transport error: {0}")]
    Transport(#[from] hyper_util::client::legacy::Error),

    #[error("server returned HTTP status {0}")]
    Status(String),

    #[error("failed to read body: {0}")]
    Body(#[source] hyper::Error),

    #[error("scrape timed out after {0:?}")]
    Timeout(Duration),

    #[error("scrape cancelled")]
    Cancelled,

    #[error("failed to write scrape data: {0}")]
    Write(#[from] std::io::Error),
}

/// Errors reported by a profile storage backend.
#[derive(Debug, Error)]
pub enum ProfileStoreError {
    #[error("profile storage is closed")]
    Closed,

    #[error("profile storage backend error: {0}")]
    Backend(String),
}

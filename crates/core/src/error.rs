use std::sync::Arc;

use chrono::NaiveDate;

/// Result alias that carries the custom [`QuakeReplayError`] type.
pub type Result<T> = std::result::Result<T, QuakeReplayError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum QuakeReplayError {
    /// Free-form failure that does not warrant its own variant.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The upstream service answered with a non-success status.
    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("start date {start} is after end date {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },
    /// A single event row could not be turned into a [`crate::SeismicEvent`].
    #[error("invalid event record: {0}")]
    InvalidRecord(String),
    #[error("invalid boundary geometry: {0}")]
    Geometry(String),
    /// An overlay load failure shared by every caller attached to the load.
    #[error("overlay load failed: {0}")]
    Overlay(Arc<QuakeReplayError>),
}

impl QuakeReplayError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}

impl From<&str> for QuakeReplayError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for QuakeReplayError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}

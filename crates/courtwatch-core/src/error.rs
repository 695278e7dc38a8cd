//! Courtwatch error types.

use chrono::NaiveDate;

/// Workspace-wide error.
#[derive(Debug, thiserror::Error)]
pub enum CourtwatchError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Transport error: {0}")]
    Transport(String),

    /// Every verified proxy failed for one date.
    #[error("Query failed for {date}: {reason}")]
    QueryFailed {
        date: NaiveDate,
        reason: String,
        /// Last raw response body seen, kept for diagnostics.
        last_response: Option<String>,
    },

    /// The backend answered with a structure we do not understand.
    #[error("Unrecognized response shape: {0}")]
    ParseShape(String),

    #[error("Delivery failed: {0}")]
    DeliveryFailed(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Invalid time: {0}")]
    InvalidTime(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CourtwatchError>;

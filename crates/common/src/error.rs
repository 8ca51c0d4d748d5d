//! Unified error type for htb-stats.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("HTB API error (status={status}): {message}")]
    HtbApi { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    /// The profile call answered but without a usable name or country code.
    #[error("Could not retrieve user profile")]
    MissingIdentity,

    #[error("Store error: {0}")]
    Store(String),
}

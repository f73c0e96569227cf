//! REST client error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    /// Backend not reachable
    #[error("Backend unavailable at {0}")]
    Unavailable(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Not found: {0}")]
    NotFound(String),

    /// Non-success status other than 404
    #[error("Backend returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),
}

impl ApiError {
    pub(crate) fn from_send(error: reqwest::Error, url: &str) -> Self {
        if error.is_timeout() {
            ApiError::Timeout
        } else if error.is_connect() {
            ApiError::Unavailable(url.to_string())
        } else {
            ApiError::Request(error)
        }
    }
}

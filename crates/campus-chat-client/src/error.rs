use thiserror::Error;

use campus_chat_shared::error::{ChatError, FetchKind};

/// Errors produced by the REST collaborator.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status code.
    #[error("Server returned {status}: {message}")]
    Status { status: u16, message: String },

    /// The envelope reported `success: false`.
    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Malformed response: {0}")]
    Decode(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Invalid API URL: {0}")]
    InvalidUrl(String),
}

impl ApiError {
    pub fn into_chat(self, what: FetchKind) -> ChatError {
        ChatError::fetch_failed(what, self.to_string())
    }
}

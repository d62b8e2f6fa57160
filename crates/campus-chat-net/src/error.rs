use thiserror::Error;

use campus_chat_shared::ChatError;

#[derive(Error, Debug)]
pub enum NetError {
    /// No live connection exists for this session.
    #[error("Not connected")]
    NotConnected,

    #[error("Invalid endpoint: {0}")]
    InvalidUrl(String),

    #[error("Handshake failed: {0}")]
    Handshake(String),
}

impl From<NetError> for ChatError {
    fn from(e: NetError) -> Self {
        match e {
            NetError::NotConnected => ChatError::NotConnected,
            other => ChatError::Protocol(other.to_string()),
        }
    }
}

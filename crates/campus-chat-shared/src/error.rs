use thiserror::Error;

/// Error taxonomy of the chat subsystem.
///
/// Malformed inbound payloads have no variant: the normalizer
/// degrades them to placeholder records instead of failing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    /// A send was attempted with no live transport. Not queued for retry.
    #[error("Not connected to the chat server")]
    NotConnected,

    /// Contact-list or history fetch failed. Already loaded state is kept.
    #[error("Failed to load {what}: {reason}")]
    FetchFailed { what: FetchKind, reason: String },

    /// Empty or whitespace-only text was rejected locally.
    #[error("Message is empty")]
    EmptyMessage,

    #[error("No conversation is open")]
    NoOpenConversation,

    /// The identity provider has not authenticated a session.
    #[error("Chat is inactive: no authenticated session")]
    Inactive,

    #[error("Protocol error: {0}")]
    Protocol(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    Contacts,
    History,
}

impl std::fmt::Display for FetchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchKind::Contacts => f.write_str("contacts"),
            FetchKind::History => f.write_str("conversation history"),
        }
    }
}

impl ChatError {
    pub fn fetch_failed(what: FetchKind, reason: impl Into<String>) -> Self {
        Self::FetchFailed {
            what,
            reason: reason.into(),
        }
    }
}

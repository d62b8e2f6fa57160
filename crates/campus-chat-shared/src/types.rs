use serde::{Deserialize, Serialize};

/// Opaque user identifier as issued by the backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for the placeholder identity produced from malformed input.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn short(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(8)
            .map(|(i, _)| i)
            .unwrap_or(self.0.len());
        &self.0[..end]
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The identity-bearing record a message sender is resolved to.
///
/// Display fields are denormalized copies carried by the event and are
/// never treated as authoritative.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SenderRef {
    pub id: UserId,
    pub handle: Option<String>,
    pub display_name: Option<String>,
}

impl SenderRef {
    pub fn new(id: impl Into<UserId>) -> Self {
        Self {
            id: id.into(),
            handle: None,
            display_name: None,
        }
    }

    /// Placeholder sender for payloads that carried no usable identity.
    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn is_unknown(&self) -> bool {
        self.id.is_empty()
    }
}

/// The authenticated local user, as exposed by the identity provider.
#[derive(Clone, PartialEq, Eq)]
pub struct LocalIdentity {
    pub id: UserId,
    pub handle: String,
    /// Opaque bearer credential.
    pub token: String,
}

impl LocalIdentity {
    pub fn new(id: impl Into<UserId>, handle: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            handle: handle.into(),
            token: token.into(),
        }
    }
}

// The bearer token must never end up in logs.
impl std::fmt::Debug for LocalIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalIdentity")
            .field("id", &self.id)
            .field("handle", &self.handle)
            .field("token", &"<redacted>")
            .finish()
    }
}

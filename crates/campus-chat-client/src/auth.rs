use campus_chat_shared::LocalIdentity;

/// What the identity provider currently reports.
///
/// The chat subsystem stays dormant unless the session is
/// `Authenticated`: it does not connect, fetch, or publish state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    /// Stored credentials are still being checked.
    Resolving,
    Unauthenticated,
    Authenticated(LocalIdentity),
}

impl SessionStatus {
    pub fn identity(&self) -> Option<&LocalIdentity> {
        match self {
            SessionStatus::Authenticated(me) => Some(me),
            _ => None,
        }
    }
}

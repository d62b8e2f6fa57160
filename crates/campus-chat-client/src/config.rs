//! Client configuration loaded from environment variables.
//!
//! Every setting has a default suitable for a local development backend,
//! so the client starts with nothing but a session credential.

use std::time::Duration;

use campus_chat_shared::constants::{
    DEFAULT_API_URL, DEFAULT_FETCH_TIMEOUT_SECS, DEFAULT_RECONNECT_DELAY_MS, DEFAULT_SOCKET_URL,
};
use campus_chat_shared::LocalIdentity;

use crate::badge::BadgePolicy;

#[derive(Clone)]
pub struct ClientConfig {
    /// REST API base URL.
    /// Env: `CHAT_API_URL`
    pub api_url: String,

    /// Real-time endpoint.
    /// Env: `CHAT_SOCKET_URL`
    pub socket_url: String,

    /// Timeout applied to contact and history fetches.
    /// Env: `CHAT_FETCH_TIMEOUT_SECS`
    pub fetch_timeout: Duration,

    /// Base delay of the transport's reconnect backoff.
    /// Env: `CHAT_RECONNECT_DELAY_MS`
    pub reconnect_delay: Duration,

    /// Env: `CHAT_BADGE_POLICY` (`count-all` | `skip-open`)
    pub badge_policy: BadgePolicy,

    // -- Session credential (headless client only) --
    /// Env: `CHAT_USER_ID`
    pub user_id: Option<String>,

    /// Env: `CHAT_USER_HANDLE`
    pub user_handle: Option<String>,

    /// Env: `CHAT_TOKEN`
    pub token: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            socket_url: DEFAULT_SOCKET_URL.to_string(),
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            reconnect_delay: Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS),
            badge_policy: BadgePolicy::default(),
            user_id: None,
            user_handle: None,
            token: None,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("CHAT_API_URL") {
            config.api_url = url.trim_end_matches('/').to_string();
        }

        if let Some(url) = lookup("CHAT_SOCKET_URL") {
            config.socket_url = url;
        }

        if let Some(val) = lookup("CHAT_FETCH_TIMEOUT_SECS") {
            match val.parse::<u64>() {
                Ok(secs) if secs > 0 => config.fetch_timeout = Duration::from_secs(secs),
                _ => tracing::warn!(value = %val, "Invalid CHAT_FETCH_TIMEOUT_SECS, using default"),
            }
        }

        if let Some(val) = lookup("CHAT_RECONNECT_DELAY_MS") {
            match val.parse::<u64>() {
                Ok(ms) => config.reconnect_delay = Duration::from_millis(ms),
                Err(_) => tracing::warn!(value = %val, "Invalid CHAT_RECONNECT_DELAY_MS, using default"),
            }
        }

        if let Some(val) = lookup("CHAT_BADGE_POLICY") {
            match val.parse::<BadgePolicy>() {
                Ok(policy) => config.badge_policy = policy,
                Err(e) => tracing::warn!(value = %val, error = %e, "Invalid CHAT_BADGE_POLICY, using default"),
            }
        }

        config.user_id = lookup("CHAT_USER_ID").filter(|s| !s.is_empty());
        config.user_handle = lookup("CHAT_USER_HANDLE").filter(|s| !s.is_empty());
        config.token = lookup("CHAT_TOKEN").filter(|s| !s.is_empty());

        config
    }

    /// The configured session credential, when both id and token are set.
    pub fn identity(&self) -> Option<LocalIdentity> {
        let id = self.user_id.clone()?;
        let token = self.token.clone()?;
        let handle = self.user_handle.clone().unwrap_or_else(|| id.clone());
        Some(LocalIdentity::new(id, handle, token))
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_url", &self.api_url)
            .field("socket_url", &self.socket_url)
            .field("fetch_timeout", &self.fetch_timeout)
            .field("reconnect_delay", &self.reconnect_delay)
            .field("badge_policy", &self.badge_policy)
            .field("user_id", &self.user_id)
            .field("user_handle", &self.user_handle)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

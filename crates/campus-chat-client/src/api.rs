//! REST collaborator: contact snapshot, conversation history and
//! mark-as-read.
//!
//! Responses come wrapped in `{ success, data, message }`. The envelope is
//! unwrapped by [`unwrap_envelope`] and the payload handed to the message
//! normalizer, so nothing here trusts the server's field shapes.

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde_json::Value;
use tracing::debug;

use campus_chat_shared::normalize::{normalize_contacts, normalize_messages};
use campus_chat_shared::{ContactSummary, LocalIdentity, Message, UserId};

use crate::error::ApiError;

#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn fetch_contacts(&self, me: &LocalIdentity) -> Result<Vec<ContactSummary>, ApiError>;

    async fn fetch_history(
        &self,
        me: &LocalIdentity,
        peer: &UserId,
    ) -> Result<Vec<Message>, ApiError>;

    async fn mark_read(&self, me: &LocalIdentity, peer: &UserId) -> Result<(), ApiError>;
}

/// [`ChatApi`] over HTTP with a bearer credential.
#[derive(Clone)]
pub struct HttpChatApi {
    client: Client,
    base_url: Url,
}

impl HttpChatApi {
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: &str) -> Result<Self, ApiError> {
        let base_url = Url::parse(base_url).map_err(|e| ApiError::InvalidUrl(e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::InvalidUrl(base_url.to_string()));
        }
        Ok(Self { client, base_url })
    }

    pub fn contacts_url(&self) -> Url {
        self.endpoint(&["chat", "contacts"])
    }

    pub fn history_url(&self, peer: &UserId) -> Url {
        self.endpoint(&["chat", peer.as_str()])
    }

    pub fn read_url(&self, peer: &UserId) -> Url {
        self.endpoint(&["chat", peer.as_str(), "read"])
    }

    /// Append path segments to the base URL, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // Checked in the constructor: the base URL has a path.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn read_body(resp: reqwest::Response) -> Result<(StatusCode, Value), ApiError> {
        let status = resp.status();
        let text = resp.text().await?;
        // Error pages are not always JSON.
        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
        Ok((status, body))
    }
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn fetch_contacts(&self, me: &LocalIdentity) -> Result<Vec<ContactSummary>, ApiError> {
        let resp = self
            .client
            .get(self.contacts_url())
            .bearer_auth(&me.token)
            .send()
            .await?;
        let (status, body) = Self::read_body(resp).await?;
        let data = unwrap_envelope(status, body)?;
        let contacts = normalize_contacts(&data);
        debug!(count = contacts.len(), "Fetched contacts");
        Ok(contacts)
    }

    async fn fetch_history(
        &self,
        me: &LocalIdentity,
        peer: &UserId,
    ) -> Result<Vec<Message>, ApiError> {
        let resp = self
            .client
            .get(self.history_url(peer))
            .bearer_auth(&me.token)
            .send()
            .await?;
        let (status, body) = Self::read_body(resp).await?;
        let data = unwrap_envelope(status, body)?;
        Ok(normalize_messages(history_messages(&data)))
    }

    async fn mark_read(&self, me: &LocalIdentity, peer: &UserId) -> Result<(), ApiError> {
        let resp = self
            .client
            .put(self.read_url(peer))
            .bearer_auth(&me.token)
            .send()
            .await?;
        let (status, body) = Self::read_body(resp).await?;
        unwrap_envelope(status, body).map(|_| ())
    }
}

/// Extract `data` from a response envelope.
///
/// A non-success status or `success: false` becomes an error carrying the
/// envelope's `message` when present. Bodies that are not an envelope at
/// all are passed through as data.
pub fn unwrap_envelope(status: StatusCode, body: Value) -> Result<Value, ApiError> {
    let message = body
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string);

    if !status.is_success() {
        return Err(ApiError::Status {
            status: status.as_u16(),
            message: message
                .or_else(|| body.as_str().map(str::to_string))
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("").to_string()),
        });
    }

    match body {
        Value::Object(mut map) if map.contains_key("success") => {
            if map.get("success").and_then(Value::as_bool) != Some(true) {
                return Err(ApiError::Rejected(
                    message.unwrap_or_else(|| "request failed".to_string()),
                ));
            }
            Ok(map.remove("data").unwrap_or(Value::Null))
        }
        Value::String(text) => Err(ApiError::Decode(format!("expected JSON, got {text:?}"))),
        other => Ok(other),
    }
}

/// History payloads are `{ messages: [...] }` or a bare array.
pub fn history_messages(data: &Value) -> &Value {
    match data.get("messages") {
        Some(messages) => messages,
        None => data,
    }
}

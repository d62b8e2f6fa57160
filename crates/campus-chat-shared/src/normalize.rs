//! Message normalizer.
//!
//! The backend is loose about shapes: a sender may arrive as a bare id
//! string or as an embedded user document, ids may be `_id` or `id`, and the
//! text may sit under `content` or `message`. Everything here is total.
//! Malformed input yields placeholder values (empty ids, empty text) rather
//! than an error, because the output feeds rendering that must degrade
//! gracefully.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::constants::SKELETON_DISPLAY_NAME;
use crate::models::{ContactSummary, Message};
use crate::types::{MessageId, SenderRef, UserId};

/// Convert one raw message record into the canonical [`Message`].
pub fn normalize_message(raw: &Value) -> Message {
    let sender = raw
        .get("senderId")
        .or_else(|| raw.get("sender"))
        .map(resolve_sender)
        .unwrap_or_default();

    let receiver_id = raw
        .get("receiverId")
        .or_else(|| raw.get("receiver"))
        .map(resolve_sender)
        .filter(|r| !r.is_unknown())
        .map(|r| r.id);

    let content = text_field(raw, "content")
        .or_else(|| text_field(raw, "message"))
        .unwrap_or_default();

    Message {
        id: MessageId(id_field(raw).unwrap_or_default()),
        sender,
        receiver_id,
        content,
        created_at: raw.get("createdAt").and_then(parse_timestamp),
    }
}

/// Normalize a JSON array of raw messages. Anything else yields no messages.
pub fn normalize_messages(raw: &Value) -> Vec<Message> {
    raw.as_array()
        .map(|items| items.iter().map(normalize_message).collect())
        .unwrap_or_default()
}

/// Resolve a sender field, either a bare identifier or an embedded object,
/// into a [`SenderRef`].
pub fn resolve_sender(raw: &Value) -> SenderRef {
    match raw {
        Value::String(_) | Value::Number(_) => SenderRef {
            id: UserId(scalar_string(raw).unwrap_or_default()),
            handle: None,
            display_name: None,
        },
        Value::Object(_) => SenderRef {
            id: UserId(id_field(raw).unwrap_or_default()),
            handle: text_field(raw, "userName").or_else(|| text_field(raw, "handle")),
            display_name: text_field(raw, "fullName").or_else(|| text_field(raw, "displayName")),
        },
        _ => SenderRef::unknown(),
    }
}

/// Convert one contact record from the contacts endpoint.
///
/// Records without an identifier cannot be keyed and are dropped.
pub fn normalize_contact(raw: &Value) -> Option<ContactSummary> {
    let peer_id = id_field(raw).filter(|id| !id.is_empty())?;
    let unread_count = raw
        .get("unreadCount")
        .and_then(Value::as_u64)
        .map(|n| u32::try_from(n).unwrap_or(u32::MAX))
        .unwrap_or(0);

    Some(ContactSummary {
        peer_id: UserId(peer_id),
        display_name: text_field(raw, "fullName")
            .unwrap_or_else(|| SKELETON_DISPLAY_NAME.to_string()),
        handle: text_field(raw, "userName").unwrap_or_default(),
        last_message: text_field(raw, "lastMessage"),
        last_message_time: raw.get("lastMessageTime").and_then(parse_timestamp),
        unread_count,
    })
}

pub fn normalize_contacts(raw: &Value) -> Vec<ContactSummary> {
    raw.as_array()
        .map(|items| items.iter().filter_map(normalize_contact).collect())
        .unwrap_or_default()
}

/// RFC 3339 strings and epoch-millisecond numbers are accepted.
pub fn parse_timestamp(raw: &Value) -> Option<DateTime<Utc>> {
    match raw {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    }
}

fn id_field(raw: &Value) -> Option<String> {
    raw.get("_id")
        .or_else(|| raw.get("id"))
        .and_then(scalar_string)
}

fn scalar_string(raw: &Value) -> Option<String> {
    match raw {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn text_field(raw: &Value, key: &str) -> Option<String> {
    raw.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

//! Canonical chat models.
//!
//! Everything downstream of the normalizer works on these shapes only; raw
//! server payloads never leave the normalization boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{SKELETON_DISPLAY_NAME, SKELETON_PREVIEW};
use crate::types::{MessageId, SenderRef, UserId};

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A single chat message. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Server-assigned identifier, unique within a conversation.
    pub id: MessageId,
    /// Resolved sender. Never a bare identifier after normalization.
    pub sender: SenderRef,
    /// Recipient, when the payload carried one.
    pub receiver_id: Option<UserId>,
    pub content: String,
    /// `None` when the payload carried no parseable timestamp.
    pub created_at: Option<DateTime<Utc>>,
}

impl Message {
    pub fn sender_id(&self) -> &UserId {
        &self.sender.id
    }

    pub fn is_from(&self, user: &UserId) -> bool {
        !user.is_empty() && &self.sender.id == user
    }
}

// ---------------------------------------------------------------------------
// ContactSummary
// ---------------------------------------------------------------------------

/// One row of the conversation list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ContactSummary {
    pub peer_id: UserId,
    pub display_name: String,
    pub handle: String,
    pub last_message: Option<String>,
    pub last_message_time: Option<DateTime<Utc>>,
    pub unread_count: u32,
}

impl ContactSummary {
    pub fn new(peer_id: impl Into<UserId>, display_name: impl Into<String>) -> Self {
        Self {
            peer_id: peer_id.into(),
            display_name: display_name.into(),
            handle: String::new(),
            last_message: None,
            last_message_time: None,
            unread_count: 0,
        }
    }

    /// Locally synthesized entry for a peer with no recorded conversation.
    pub fn skeleton(peer: &SenderRef) -> Self {
        Self {
            peer_id: peer.id.clone(),
            display_name: peer
                .display_name
                .clone()
                .unwrap_or_else(|| SKELETON_DISPLAY_NAME.to_string()),
            handle: peer.handle.clone().unwrap_or_default(),
            last_message: Some(SKELETON_PREVIEW.to_string()),
            last_message_time: None,
            unread_count: 0,
        }
    }
}

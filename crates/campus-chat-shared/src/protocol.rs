use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::{
    EVENT_CONNECT, EVENT_DISCONNECT, EVENT_ERROR, EVENT_MESSAGE_SENT, EVENT_RECEIVE_MESSAGE,
};
use crate::models::Message;
use crate::normalize::normalize_message;
use crate::types::UserId;

/// One frame on the real-time connection: a named event plus its payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl Frame {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_text(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Payload of the outbound `sendMessage` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessagePayload {
    pub receiver_id: UserId,
    pub content: String,
}

impl SendMessagePayload {
    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "receiverId": self.receiver_id,
            "content": self.content,
        })
    }
}

/// Inbound real-time events after normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// Another party sent a message to the local user.
    ReceiveMessage(Message),
    /// Confirmation echo of the local user's own send.
    MessageSent(Message),
    /// Transport or application error notice. Never fatal.
    Error(String),
    Connected,
    Disconnected,
    Unknown(String),
}

impl InboundEvent {
    /// Parse a named event and its payload. Total, like the normalizer.
    pub fn parse(event: &str, data: &Value) -> Self {
        match event {
            EVENT_RECEIVE_MESSAGE => Self::ReceiveMessage(message_of(data)),
            EVENT_MESSAGE_SENT => Self::MessageSent(message_of(data)),
            EVENT_ERROR => Self::Error(error_text(data)),
            EVENT_CONNECT => Self::Connected,
            EVENT_DISCONNECT => Self::Disconnected,
            other => Self::Unknown(other.to_string()),
        }
    }
}

fn message_of(data: &Value) -> Message {
    normalize_message(data.get("message").unwrap_or(&Value::Null))
}

fn error_text(data: &Value) -> String {
    match data {
        Value::String(s) => s.clone(),
        Value::Object(_) => data
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| data.to_string()),
        Value::Null => "unknown error".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_frame_text_roundtrip() {
        let frame = Frame::new(EVENT_RECEIVE_MESSAGE, json!({ "message": { "_id": "m1" } }));
        let text = frame.to_text().unwrap();
        assert_eq!(Frame::from_text(&text).unwrap(), frame);
    }

    #[test]
    fn test_frame_without_data() {
        let frame = Frame::from_text(r#"{"event":"connect"}"#).unwrap();
        assert_eq!(frame.data, Value::Null);
    }

    #[test]
    fn test_send_payload_wire_names() {
        let payload = SendMessagePayload {
            receiver_id: UserId::from("u2"),
            content: "hello".into(),
        };
        assert_eq!(
            payload.to_value(),
            json!({ "receiverId": "u2", "content": "hello" })
        );
    }

    #[test]
    fn test_parse_message_events() {
        let data = json!({ "message": { "_id": "m1", "senderId": "u2", "content": "hi" } });
        match InboundEvent::parse(EVENT_RECEIVE_MESSAGE, &data) {
            InboundEvent::ReceiveMessage(m) => assert_eq!(m.sender.id, UserId::from("u2")),
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(matches!(
            InboundEvent::parse(EVENT_MESSAGE_SENT, &data),
            InboundEvent::MessageSent(_)
        ));
    }

    #[test]
    fn test_parse_error_event() {
        assert_eq!(
            InboundEvent::parse(EVENT_ERROR, &json!({ "message": "receiver not found" })),
            InboundEvent::Error("receiver not found".into())
        );
        assert_eq!(
            InboundEvent::parse(EVENT_ERROR, &json!("boom")),
            InboundEvent::Error("boom".into())
        );
    }

    #[test]
    fn test_parse_unknown_event() {
        assert_eq!(
            InboundEvent::parse("typing", &Value::Null),
            InboundEvent::Unknown("typing".into())
        );
    }
}

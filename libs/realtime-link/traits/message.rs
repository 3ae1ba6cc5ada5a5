//! Wire-level message model
//!
//! Every frame exchanged with the server is a [`Message`]. Identity is the
//! `id` field: two messages are duplicates iff their ids match.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Kind of a [`Message`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Connect,
    Disconnect,
    Heartbeat,
    Notification,
    Message,
    StatusUpdate,
    RealtimeUpdate,
    Error,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Connect => "connect",
            MessageType::Disconnect => "disconnect",
            MessageType::Heartbeat => "heartbeat",
            MessageType::Notification => "notification",
            MessageType::Message => "message",
            MessageType::StatusUpdate => "status_update",
            MessageType::RealtimeUpdate => "realtime_update",
            MessageType::Error => "error",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A realtime message
///
/// Immutable once constructed: fields are private and the `with_*` methods
/// consume the value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(rename = "type")]
    kind: MessageType,
    #[serde(rename = "data", default)]
    payload: Value,
    timestamp: i64,
    id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    room_id: Option<String>,
}

impl Message {
    /// Create a message with a fresh unique id and the current timestamp (ms)
    pub fn new(kind: MessageType, payload: Value) -> Self {
        Self {
            kind,
            payload,
            timestamp: chrono::Utc::now().timestamp_millis(),
            id: uuid::Uuid::new_v4().to_string(),
            user_id: None,
            room_id: None,
        }
    }

    /// Create a notification message
    pub fn notification(payload: Value) -> Self {
        Self::new(MessageType::Notification, payload)
    }

    /// Create a heartbeat probe
    pub fn heartbeat() -> Self {
        Self::new(MessageType::Heartbeat, Value::Null)
    }

    /// Rebuild a message from stored parts, keeping its original identity
    pub fn from_parts(
        id: impl Into<String>,
        kind: MessageType,
        payload: Value,
        timestamp: i64,
    ) -> Self {
        Self {
            kind,
            payload,
            timestamp,
            id: id.into(),
            user_id: None,
            room_id: None,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_room(mut self, room_id: impl Into<String>) -> Self {
        self.room_id = Some(room_id.into());
        self
    }

    pub fn with_user_opt(mut self, user_id: Option<String>) -> Self {
        self.user_id = user_id;
        self
    }

    pub fn with_room_opt(mut self, room_id: Option<String>) -> Self {
        self.room_id = room_id;
        self
    }

    #[inline]
    pub fn kind(&self) -> MessageType {
        self.kind
    }

    #[inline]
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    #[inline]
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn room_id(&self) -> Option<&str> {
        self.room_id.as_deref()
    }

    /// Check if this is a notification-type message
    #[inline]
    pub fn is_notification(&self) -> bool {
        self.kind == MessageType::Notification
    }

    /// Check if this is a heartbeat probe or response
    #[inline]
    pub fn is_heartbeat(&self) -> bool {
        self.kind == MessageType::Heartbeat
    }

    /// Duplicate check by identity
    pub fn is_duplicate_of(&self, other: &Message) -> bool {
        self.id == other.id
    }
}

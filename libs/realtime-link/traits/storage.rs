use crate::traits::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::traits::message::{Message, MessageType};

/// A notification whose delivery must survive connectivity gaps and restarts
///
/// Mutated in place by the retry sweep (`delivered`, `retry_count`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineNotification {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub payload: Value,
    pub timestamp: i64,
    pub delivered: bool,
    pub retry_count: u32,
    pub max_retries: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
}

impl OfflineNotification {
    /// Record a message that could not be transmitted
    pub fn from_message(message: &Message, max_retries: u32) -> Self {
        Self {
            id: message.id().to_string(),
            kind: message.kind(),
            payload: message.payload().clone(),
            timestamp: message.timestamp(),
            delivered: false,
            retry_count: 0,
            max_retries,
            user_id: message.user_id().map(str::to_string),
            room_id: message.room_id().map(str::to_string),
        }
    }

    /// Rebuild the original message for retransmission
    pub fn to_message(&self) -> Message {
        Message::from_parts(&self.id, self.kind, self.payload.clone(), self.timestamp)
            .with_user_opt(self.user_id.clone())
            .with_room_opt(self.room_id.clone())
    }

    /// Eligible for another automatic retry
    pub fn is_retryable(&self) -> bool {
        !self.delivered && self.retry_count < self.max_retries
    }

    /// Out of retries and still undelivered
    pub fn is_exhausted(&self) -> bool {
        !self.delivered && self.retry_count >= self.max_retries
    }
}

/// Durable storage for offline notifications
///
/// The whole collection is read once and written as full snapshots, never
/// row by row. A write either fully lands or the previous snapshot is kept.
pub trait NotificationStorage: Send {
    /// Read the full persisted collection
    fn read_all(&self) -> Result<Vec<OfflineNotification>>;

    /// Replace the persisted collection
    fn write_all(&mut self, items: &[OfflineNotification]) -> Result<()>;
}

use crate::traits::error::{RealtimeError, Result};
use crate::traits::message::Message;

/// Raw frame exchanged with the transport
/// Can be Text or Binary data
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsMessage {
    Text(String),
    Binary(Vec<u8>),
}

impl WsMessage {
    /// Get the message as text, if it is text
    pub fn as_text(&self) -> Option<&str> {
        match self {
            WsMessage::Text(s) => Some(s),
            WsMessage::Binary(_) => None,
        }
    }

    /// Get the message as binary, if it is binary
    pub fn as_binary(&self) -> Option<&[u8]> {
        match self {
            WsMessage::Text(_) => None,
            WsMessage::Binary(b) => Some(b),
        }
    }

    /// Check if message is text
    pub fn is_text(&self) -> bool {
        matches!(self, WsMessage::Text(_))
    }

    /// Check if message is binary
    pub fn is_binary(&self) -> bool {
        matches!(self, WsMessage::Binary(_))
    }
}

/// Trait for encoding and decoding messages on the wire
///
/// Every field of [`Message`] must survive `decode(encode(m))`.
pub trait MessageCodec: Send + Sync {
    /// Serialize a message into a frame
    fn encode(&self, message: &Message) -> Result<WsMessage>;

    /// Parse a received frame
    ///
    /// # Returns
    /// * `Ok(message)` - Frame decoded
    /// * `Err(RealtimeError::ParseError)` - Malformed frame, caller drops it
    fn decode(&self, frame: &WsMessage) -> Result<Message>;
}

/// Structured-text codec: one JSON object per frame
///
/// Binary frames are accepted when they carry UTF-8 JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl MessageCodec for JsonCodec {
    fn encode(&self, message: &Message) -> Result<WsMessage> {
        serde_json::to_string(message)
            .map(WsMessage::Text)
            .map_err(|e| RealtimeError::Serialization(e.to_string()))
    }

    fn decode(&self, frame: &WsMessage) -> Result<Message> {
        let parsed = match frame {
            WsMessage::Text(text) => serde_json::from_str(text),
            WsMessage::Binary(data) => serde_json::from_slice(data),
        };
        parsed.map_err(|e| RealtimeError::ParseError(e.to_string()))
    }
}

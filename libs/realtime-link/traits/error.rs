use std::time::Duration;
use thiserror::Error;

/// Main error type for realtime-link
///
/// The engine never returns these to the caller of `send`/`connect`; they are
/// reported through `on_error` observers and the `ClientEvent::Error` stream.
#[derive(Error, Debug, Clone)]
pub enum RealtimeError {
    /// Transport level failure (refused, TLS, abrupt close)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Connection closed unexpectedly
    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    /// Frame could not be decoded into a message
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Message could not be encoded for the wire
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Channel send error (engine task gone)
    #[error("Channel send error: {0}")]
    ChannelSend(String),

    /// Channel receive error (engine task gone)
    #[error("Channel receive error: {0}")]
    ChannelReceive(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Reconnection attempts exhausted
    #[error("Reconnection failed after {attempts} attempts: {reason}")]
    ReconnectionFailed { attempts: u32, reason: String },

    /// No heartbeat response within the timeout window
    #[error("Heartbeat timed out after {0:?}")]
    HeartbeatTimeout(Duration),

    /// Durable store could not be read or written
    #[error("Storage error: {0}")]
    Storage(String),

    /// Outbound queue is full and its overflow policy dropped or rejected a message
    #[error("Message queue full (capacity {capacity}), dropped message {dropped_id}")]
    QueueOverflow { capacity: usize, dropped_id: String },

    /// Operation requires an open channel
    #[error("Not connected")]
    NotConnected,

    /// Invalid state transition
    #[error("Invalid state transition: {0}")]
    InvalidState(String),
}

impl From<serde_json::Error> for RealtimeError {
    fn from(e: serde_json::Error) -> Self {
        RealtimeError::Serialization(e.to_string())
    }
}

impl From<std::io::Error> for RealtimeError {
    fn from(e: std::io::Error) -> Self {
        RealtimeError::Storage(e.to_string())
    }
}

/// Result type for realtime-link operations
pub type Result<T> = std::result::Result<T, RealtimeError>;

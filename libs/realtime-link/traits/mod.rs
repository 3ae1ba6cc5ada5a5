//! # realtime-link traits
//!
//! Core traits and types shared by every layer of the engine:
//!
//! - **Message / MessageType**: the wire-level message model
//! - **MessageCodec**: encode and decode frames (`JsonCodec` by default)
//! - **Transport / TransportHandle**: the external duplex channel
//! - **NotificationStorage**: durable snapshot store for offline notifications
//! - **ReconnectionStrategy**: backoff policy between reconnection attempts
//! - **PongDetector**: match heartbeat responses to probes
//! - **HeaderProvider**: per-handshake HTTP headers

pub mod error;
pub mod headers;
pub mod message;
pub mod parser;
pub mod pong_detector;
pub mod reconnect;
pub mod storage;
pub mod transport;

// Re-export commonly used types
pub use error::{RealtimeError, Result};
pub use headers::{HeaderProvider, Headers, NoHeaders, StaticHeaders};
pub use message::{Message, MessageType};
pub use parser::{JsonCodec, MessageCodec, WsMessage};
pub use pong_detector::{HeartbeatEcho, PongDetector, StrictHeartbeatEcho};
pub use reconnect::{ExponentialBackoff, FixedDelay, NeverReconnect, ReconnectionStrategy};
pub use storage::{NotificationStorage, OfflineNotification};
pub use transport::{
    Transport, TransportEvent, TransportEventKind, TransportEventSink, TransportHandle,
};

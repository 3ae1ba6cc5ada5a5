//! Heartbeat Response Detection
//!
//! Decides whether an incoming message answers the outstanding heartbeat
//! probe. Servers differ: some echo the probe verbatim, some answer with a
//! fresh heartbeat message of their own.

use crate::traits::message::Message;

/// Trait for detecting heartbeat responses in the message stream
///
/// # Example
///
/// ```rust,ignore
/// use realtime_link::traits::{Message, PongDetector};
///
/// struct RoomScopedPong;
///
/// impl PongDetector for RoomScopedPong {
///     fn is_pong(&self, probe: &Message, received: &Message) -> bool {
///         received.is_heartbeat() && received.room_id() == probe.room_id()
///     }
/// }
/// ```
pub trait PongDetector: Send + Sync {
    /// Check if `received` answers the outstanding `probe`
    fn is_pong(&self, probe: &Message, received: &Message) -> bool;
}

/// Accepts any heartbeat-typed message as the response
#[derive(Debug, Clone, Copy, Default)]
pub struct HeartbeatEcho;

impl PongDetector for HeartbeatEcho {
    fn is_pong(&self, _probe: &Message, received: &Message) -> bool {
        received.is_heartbeat()
    }
}

/// Requires the peer to echo the probe's id
#[derive(Debug, Clone, Copy, Default)]
pub struct StrictHeartbeatEcho;

impl PongDetector for StrictHeartbeatEcho {
    fn is_pong(&self, probe: &Message, received: &Message) -> bool {
        received.is_heartbeat() && received.id() == probe.id()
    }
}

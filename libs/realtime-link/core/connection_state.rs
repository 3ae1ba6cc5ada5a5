//! Connection status and lock-free shared views of it
//!
//! The engine task is the only writer. Facade handles on other threads read
//! the atomics without going through the command channel.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

/// Lifecycle of the realtime connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ConnectionStatus {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    Reconnecting = 3,
    Error = 4,
}

impl ConnectionStatus {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => ConnectionStatus::Connecting,
            2 => ConnectionStatus::Connected,
            3 => ConnectionStatus::Reconnecting,
            4 => ConnectionStatus::Error,
            _ => ConnectionStatus::Disconnected,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Reconnecting => "reconnecting",
            ConnectionStatus::Error => "error",
        }
    }

    /// Check whether `self -> next` is a legal transition
    ///
    /// `disconnect()` and host-offline may move any state to `Disconnected`.
    /// `Connected` is only reachable from `Connecting`.
    pub fn can_transition_to(self, next: ConnectionStatus) -> bool {
        use ConnectionStatus::*;

        if self == next {
            return false;
        }
        match (self, next) {
            (_, Disconnected) => true,
            (Disconnected, Connecting) => true,
            (Connecting, Connected | Reconnecting | Error) => true,
            (Connected, Reconnecting | Error) => true,
            (Reconnecting, Connecting | Error) => true,
            (Error, Connecting | Reconnecting) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Atomic connection status, readable from any thread
#[derive(Debug)]
pub struct AtomicConnectionStatus {
    inner: AtomicU8,
}

impl AtomicConnectionStatus {
    pub fn new(status: ConnectionStatus) -> Self {
        Self {
            inner: AtomicU8::new(status as u8),
        }
    }

    #[inline]
    pub fn get(&self) -> ConnectionStatus {
        ConnectionStatus::from_u8(self.inner.load(Ordering::Acquire))
    }

    #[inline]
    pub fn set(&self, status: ConnectionStatus) {
        self.inner.store(status as u8, Ordering::Release);
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.get() == ConnectionStatus::Connected
    }
}

/// Counters updated by the engine
#[derive(Debug, Default)]
pub struct AtomicMetrics {
    messages_sent: AtomicU64,
    messages_received: AtomicU64,
    reconnect_count: AtomicU64,
    queued: AtomicU64,
    offline_pending: AtomicU64,
}

impl AtomicMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn increment_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_reconnects(&self) {
        self.reconnect_count.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn set_queued(&self, len: usize) {
        self.queued.store(len as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn set_offline_pending(&self, len: usize) {
        self.offline_pending.store(len as u64, Ordering::Relaxed);
    }

    pub fn messages_sent(&self) -> u64 {
        self.messages_sent.load(Ordering::Relaxed)
    }

    pub fn messages_received(&self) -> u64 {
        self.messages_received.load(Ordering::Relaxed)
    }

    pub fn reconnect_count(&self) -> u64 {
        self.reconnect_count.load(Ordering::Relaxed)
    }

    pub fn queued(&self) -> u64 {
        self.queued.load(Ordering::Relaxed)
    }

    pub fn offline_pending(&self) -> u64 {
        self.offline_pending.load(Ordering::Relaxed)
    }
}

/// Client metrics snapshot
#[derive(Debug, Clone)]
pub struct Metrics {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub reconnect_count: u64,
    pub queued: u64,
    pub offline_pending: u64,
    pub connection_status: ConnectionStatus,
}

impl Metrics {
    pub(crate) fn snapshot(metrics: &AtomicMetrics, status: &AtomicConnectionStatus) -> Self {
        Self {
            messages_sent: metrics.messages_sent(),
            messages_received: metrics.messages_received(),
            reconnect_count: metrics.reconnect_count(),
            queued: metrics.queued(),
            offline_pending: metrics.offline_pending(),
            connection_status: status.get(),
        }
    }
}

//! # realtime-link
//!
//! Client-side connection and delivery engine: keeps a realtime channel to a
//! server open, detects silent failures with heartbeats, reconnects with
//! bounded exponential backoff, and guarantees eventual delivery of
//! notifications made while the host was offline.
//!
//! ## Features
//!
//! - **Explicit state machine**: `disconnected -> connecting -> connected`,
//!   with `reconnecting` and `error` for failures; every transition is observable
//! - **Single engine task**: commands, transport events and timers are
//!   serialized through one loop, so no engine state is behind a lock
//! - **Durable offline store**: full-snapshot persistence with bounded retries
//! - **Pluggable**: transport, codec, storage, backoff and heartbeat matching
//!
//! ## Example
//!
//! ```rust,ignore
//! use realtime_link::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let manager = RealtimeManager::builder()
//!         .url("wss://campus.example.com/realtime")
//!         .transport(TungsteniteTransport::new())
//!         .heartbeat(Duration::from_secs(30), Duration::from_secs(10))
//!         .reconnect_strategy(ExponentialBackoff::new(Duration::from_secs(1), Some(5)))
//!         .storage(JsonFileStorage::new("data/offline.json"))
//!         .build()
//!         .await?;
//!
//!     let _status = manager.on_status_change(|from, to| println!("{from} -> {to}"));
//!     manager.connect()?;
//!     manager.send_notification(serde_json::json!({"msg": "hello"}))?;
//!
//!     manager.shutdown().await
//! }
//! ```

pub mod core;
pub mod manager;
pub mod traits;

// Re-export all traits
pub use traits::*;

// Re-export core engine pieces
pub use self::core::{
    ClientConfig, ClientEvent, ConnectionStateMachine, ConnectionStatus, EnqueueOutcome,
    FlushReport, HeartbeatConfig, JsonFileStorage, MemoryStorage, MessageQueue, Metrics,
    OfflineNotificationStore, OverflowPolicy, QueuePolicy, Reaction, RetryReport, Subscription,
    TungsteniteTransport,
};

// Re-export manager
pub use self::manager::{
    ConnectivityMonitor, HostSignal, ProbeConfig, ProbeTarget, RealtimeManager,
    RealtimeManagerBuilder,
};

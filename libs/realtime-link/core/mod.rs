//! # realtime-link core
//!
//! Deterministic building blocks of the connection engine. Nothing in here
//! spawns tasks or reads the clock except the WebSocket transport; the
//! manager drives everything else with explicit instants.
//!
//! - `state_machine`: connection lifecycle, heartbeat and reconnect timers
//! - `queue`: outbound FIFO while the channel is down
//! - `offline_store`: durable record of notifications made while offline
//! - `observers`: callback and channel subscribers

pub mod config;
pub mod connection_state;
pub mod heartbeat;
pub mod observers;
pub mod offline_store;
pub mod queue;
pub mod state_machine;
pub mod storage;
pub mod tungstenite;

// Re-export main types
pub use config::{
    ClientConfig, DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_OFFLINE_MAX_RETRIES,
    DEFAULT_RECONNECT_INTERVAL,
};
pub use connection_state::{AtomicConnectionStatus, AtomicMetrics, ConnectionStatus, Metrics};
pub use heartbeat::{HeartbeatConfig, HeartbeatDue, HeartbeatMonitor};
pub use observers::{ClientEvent, Observers, Subscription};
pub use offline_store::{OfflineNotificationStore, RetryReport};
pub use queue::{EnqueueOutcome, FlushReport, MessageQueue, OverflowPolicy, QueuePolicy};
pub use state_machine::{ConnectionStateMachine, Reaction};
pub use storage::{JsonFileStorage, MemoryStorage};
pub use tungstenite::TungsteniteTransport;

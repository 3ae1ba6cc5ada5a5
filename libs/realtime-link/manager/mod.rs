//! # realtime-link manager
//!
//! The facade callers hold, the engine task behind it and the optional host
//! connectivity monitor.

pub mod builder;
pub mod connectivity;
pub(crate) mod engine;
pub mod manager;

pub use builder::{states, RealtimeManagerBuilder};
pub use connectivity::{probe, ConnectivityMonitor, ProbeConfig, ProbeTarget, Reachability};
pub use manager::{HostSignal, RealtimeManager};

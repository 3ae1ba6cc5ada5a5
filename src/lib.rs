//! Campus realtime client
//!
//! Composition root for the realtime notification client.
//!
//! ## Architecture
//!
//! - **realtime_link**: connection engine, queue and offline store (re-exported from workspace)
//! - **config**: YAML settings with environment overrides
//! - **logging**: tracing initialization
//! - **bin_common**: Common utilities for binary executables (CLI, runners)
//!
//! ## Usage in Binaries
//!
//! ```rust,ignore
//! use campus_realtime::bin_common::{load_config_from_env, ConfigType};
//! use campus_realtime::config::RealtimeSettings;
//!
//! let settings = RealtimeSettings::load(load_config_from_env(ConfigType::Realtime))?;
//! let manager = RealtimeManager::builder().config(settings.to_client_config());
//! ```

// Re-export workspace libraries for convenience
pub use realtime_link;

pub mod config;
pub mod logging;

// Binary common utilities
pub mod bin_common {
    //! Common utilities for binary executables

    pub mod cli;
    pub mod runner;

    pub use cli::{config_path_from_args, load_config_from_env, parse_args, ConfigType};
    pub use runner::{BinaryRunner, RunConfig, ShutdownFlag};
}

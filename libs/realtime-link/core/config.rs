use crate::core::heartbeat::HeartbeatConfig;
use crate::core::queue::QueuePolicy;
use crate::traits::*;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Default base interval for reconnection backoff
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_millis(1000);
/// Default number of automatic reconnection attempts
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;
/// Default retry budget for each offline notification
pub const DEFAULT_OFFLINE_MAX_RETRIES: u32 = 3;

/// Configuration for the connection engine
///
/// Usually produced by `RealtimeManager::builder()`; constructed directly
/// when driving a `ConnectionStateMachine` by hand.
pub struct ClientConfig {
    /// Server URL (wss:// or ws://)
    pub(crate) url: String,

    /// Sub-protocols requested on open
    pub(crate) protocols: Vec<String>,

    /// Heartbeat timing (None = no liveness probing)
    pub(crate) heartbeat: Option<HeartbeatConfig>,

    /// Matches heartbeat responses to probes
    pub(crate) pong_detector: Arc<dyn PongDetector>,

    /// Reconnection policy after unclean closes and heartbeat timeouts
    pub(crate) reconnect_strategy: Box<dyn ReconnectionStrategy>,

    /// Wire encoding
    pub(crate) codec: Arc<dyn MessageCodec>,

    /// Capacity and overflow policy of the outbound queue
    pub(crate) queue_policy: QueuePolicy,

    /// Retry budget given to each new offline notification
    pub(crate) offline_max_retries: u32,
}

impl ClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            protocols: Vec::new(),
            heartbeat: Some(HeartbeatConfig::default()),
            pong_detector: Arc::new(HeartbeatEcho),
            reconnect_strategy: Box::new(ExponentialBackoff::new(
                DEFAULT_RECONNECT_INTERVAL,
                Some(DEFAULT_MAX_RECONNECT_ATTEMPTS),
            )),
            codec: Arc::new(JsonCodec),
            queue_policy: QueuePolicy::unbounded(),
            offline_max_retries: DEFAULT_OFFLINE_MAX_RETRIES,
        }
    }

    pub fn with_protocols(mut self, protocols: Vec<String>) -> Self {
        self.protocols = protocols;
        self
    }

    pub fn with_heartbeat(mut self, heartbeat: Option<HeartbeatConfig>) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    pub fn with_pong_detector(mut self, detector: Arc<dyn PongDetector>) -> Self {
        self.pong_detector = detector;
        self
    }

    pub fn with_reconnect_strategy(mut self, strategy: Box<dyn ReconnectionStrategy>) -> Self {
        self.reconnect_strategy = strategy;
        self
    }

    pub fn with_codec(mut self, codec: Arc<dyn MessageCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_queue_policy(mut self, policy: QueuePolicy) -> Self {
        self.queue_policy = policy;
        self
    }

    pub fn with_offline_max_retries(mut self, max_retries: u32) -> Self {
        self.offline_max_retries = max_retries;
        self
    }

    /// Get a reference to the URL
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn protocols(&self) -> &[String] {
        &self.protocols
    }

    /// Check if heartbeat is configured
    pub fn has_heartbeat(&self) -> bool {
        self.heartbeat.is_some()
    }

    pub fn heartbeat(&self) -> Option<HeartbeatConfig> {
        self.heartbeat
    }

    pub fn max_reconnect_attempts(&self) -> Option<u32> {
        self.reconnect_strategy.max_attempts()
    }

    pub fn queue_policy(&self) -> QueuePolicy {
        self.queue_policy
    }

    pub fn offline_max_retries(&self) -> u32 {
        self.offline_max_retries
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.url.is_empty() {
            return Err(RealtimeError::Configuration("url must not be empty".into()));
        }
        if let Some(hb) = self.heartbeat {
            if hb.interval.is_zero() || hb.timeout.is_zero() {
                return Err(RealtimeError::Configuration(
                    "heartbeat interval and timeout must be greater than 0".into(),
                ));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("url", &self.url)
            .field("protocols", &self.protocols)
            .field("heartbeat", &self.heartbeat)
            .field("max_reconnect_attempts", &self.max_reconnect_attempts())
            .field("queue_policy", &self.queue_policy)
            .field("offline_max_retries", &self.offline_max_retries)
            .finish()
    }
}

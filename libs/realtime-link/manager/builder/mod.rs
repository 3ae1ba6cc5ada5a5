pub mod states;

use crate::core::connection_state::{AtomicConnectionStatus, AtomicMetrics};
use crate::core::{
    ClientConfig, ConnectionStateMachine, ConnectionStatus, HeartbeatConfig, MemoryStorage,
    MessageQueue, Observers, OfflineNotificationStore, QueuePolicy,
};
use crate::manager::engine::{Engine, EngineCommand};
use crate::manager::manager::RealtimeManager;
use crate::traits::*;
use states::*;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::unbounded_channel;
use tracing::{debug, info};

/// Type-state builder for [`RealtimeManager`]
///
/// The URL and the transport must be set before `build` is available;
/// everything else has a default.
pub struct RealtimeManagerBuilder<U, T>
where
    U: UrlState,
    T: TransportState,
{
    _state: TypeState<U, T>,
    config: ClientConfig,
    transport: Option<Arc<dyn Transport>>,
    storage: Option<Box<dyn NotificationStorage>>,
    online: bool,
    connect_on_start: bool,
}

impl RealtimeManagerBuilder<NoUrl, NoTransport> {
    /// Create a new builder instance
    pub fn new() -> Self {
        Self {
            _state: TypeState::new(),
            config: ClientConfig::new(String::new()),
            transport: None,
            storage: None,
            online: true,
            connect_on_start: false,
        }
    }
}

impl Default for RealtimeManagerBuilder<NoUrl, NoTransport> {
    fn default() -> Self {
        Self::new()
    }
}

// URL setting
impl<T> RealtimeManagerBuilder<NoUrl, T>
where
    T: TransportState,
{
    pub fn url(mut self, url: impl Into<String>) -> RealtimeManagerBuilder<HasUrl, T> {
        self.config.url = url.into();
        self.retype()
    }

    /// Start from a complete engine configuration
    pub fn config(mut self, config: ClientConfig) -> RealtimeManagerBuilder<HasUrl, T> {
        self.config = config;
        self.retype()
    }
}

// Transport setting
impl<U> RealtimeManagerBuilder<U, NoTransport>
where
    U: UrlState,
{
    pub fn transport(self, transport: impl Transport + 'static) -> RealtimeManagerBuilder<U, HasTransport> {
        self.shared_transport(Arc::new(transport))
    }

    pub fn shared_transport(
        mut self,
        transport: Arc<dyn Transport>,
    ) -> RealtimeManagerBuilder<U, HasTransport> {
        self.transport = Some(transport);
        self.retype()
    }
}

// Optional settings
impl<U, T> RealtimeManagerBuilder<U, T>
where
    U: UrlState,
    T: TransportState,
{
    /// Add a sub-protocol to request on open
    pub fn protocol(mut self, protocol: impl Into<String>) -> Self {
        self.config.protocols.push(protocol.into());
        self
    }

    pub fn protocols(mut self, protocols: Vec<String>) -> Self {
        self.config.protocols = protocols;
        self
    }

    /// Probe every `interval`, reconnect if a probe is unanswered for `timeout`
    pub fn heartbeat(mut self, interval: Duration, timeout: Duration) -> Self {
        self.config.heartbeat = Some(HeartbeatConfig { interval, timeout });
        self
    }

    /// Disable liveness probing
    pub fn no_heartbeat(mut self) -> Self {
        self.config.heartbeat = None;
        self
    }

    /// Set how heartbeat responses are matched to probes
    ///
    /// Defaults to [`HeartbeatEcho`].
    pub fn pong_detector(mut self, detector: Arc<dyn PongDetector>) -> Self {
        self.config.pong_detector = detector;
        self
    }

    /// Defaults to exponential backoff from 1s with 5 attempts.
    pub fn reconnect_strategy(mut self, strategy: impl ReconnectionStrategy + 'static) -> Self {
        self.config.reconnect_strategy = Box::new(strategy);
        self
    }

    pub fn codec(mut self, codec: impl MessageCodec + 'static) -> Self {
        self.config.codec = Arc::new(codec);
        self
    }

    pub fn queue_policy(mut self, policy: QueuePolicy) -> Self {
        self.config.queue_policy = policy;
        self
    }

    pub fn offline_max_retries(mut self, max_retries: u32) -> Self {
        self.config.offline_max_retries = max_retries;
        self
    }

    /// Durable store for offline notifications
    ///
    /// Defaults to a [`MemoryStorage`], which does not survive a restart.
    pub fn storage(mut self, storage: impl NotificationStorage + 'static) -> Self {
        self.storage = Some(Box::new(storage));
        self
    }

    /// Host connectivity at startup (default: online)
    pub fn online(mut self, online: bool) -> Self {
        self.online = online;
        self
    }

    /// Open the connection as soon as the engine starts
    pub fn connect_on_start(mut self, connect: bool) -> Self {
        self.connect_on_start = connect;
        self
    }

    fn retype<U2, T2>(self) -> RealtimeManagerBuilder<U2, T2>
    where
        U2: UrlState,
        T2: TransportState,
    {
        RealtimeManagerBuilder {
            _state: TypeState::new(),
            config: self.config,
            transport: self.transport,
            storage: self.storage,
            online: self.online,
            connect_on_start: self.connect_on_start,
        }
    }
}

// Build method - only available when all required fields are set
impl RealtimeManagerBuilder<HasUrl, HasTransport> {
    /// Load the offline store and start the engine task
    ///
    /// Must be called from within a tokio runtime.
    pub async fn build(self) -> Result<RealtimeManager> {
        self.config.validate()?;
        let transport = self
            .transport
            .ok_or_else(|| RealtimeError::Configuration("transport must be set".into()))?;
        let storage = self
            .storage
            .unwrap_or_else(|| Box::new(MemoryStorage::new()));

        debug!("Building realtime manager: {:?}", self.config);

        let observers = Observers::new();
        let status = Arc::new(AtomicConnectionStatus::new(ConnectionStatus::Disconnected));
        let metrics = Arc::new(AtomicMetrics::new());
        let online = Arc::new(AtomicBool::new(self.online));
        let (command_tx, command_rx) = unbounded_channel();
        let (event_tx, event_rx) = unbounded_channel();

        let store = OfflineNotificationStore::load(storage, self.config.offline_max_retries);
        let queue = MessageQueue::new(self.config.queue_policy);
        let url = self.config.url.clone();
        let machine = ConnectionStateMachine::new(
            self.config,
            transport,
            event_tx,
            Arc::clone(&observers),
            Arc::clone(&status),
            Arc::clone(&metrics),
        );

        let engine = Engine::new(
            machine,
            queue,
            store,
            Arc::clone(&observers),
            Arc::clone(&metrics),
            Arc::clone(&online),
        );

        if self.connect_on_start {
            // Queued before the task starts, so it is the first thing it does
            let _ = command_tx.send(EngineCommand::Connect);
        }
        let handle = tokio::spawn(engine.run(command_rx, event_rx));
        info!("Realtime manager started for {}", url);

        Ok(RealtimeManager::from_parts(
            command_tx, observers, status, metrics, online, handle,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullTransport;

    impl Transport for NullTransport {
        fn open(
            &self,
            _url: &str,
            _protocols: &[String],
            _events: TransportEventSink,
        ) -> Result<Box<dyn TransportHandle>> {
            Err(RealtimeError::Transport("unused".into()))
        }
    }

    #[tokio::test]
    async fn test_build_with_defaults() {
        let manager = RealtimeManager::builder()
            .url("ws://localhost:9000")
            .transport(NullTransport)
            .build()
            .await
            .unwrap();

        assert_eq!(manager.status(), ConnectionStatus::Disconnected);
        assert!(manager.is_online());
        assert!(!manager.is_ready());
        manager.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_build_rejects_invalid_config() {
        let result = RealtimeManager::builder()
            .transport(NullTransport)
            .url("ws://localhost:9000")
            .heartbeat(Duration::ZERO, Duration::from_secs(1))
            .build()
            .await;

        assert!(matches!(result, Err(RealtimeError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_config_sets_url() {
        let manager = RealtimeManager::builder()
            .config(ClientConfig::new("ws://configured").with_heartbeat(None))
            .transport(NullTransport)
            .online(false)
            .build()
            .await
            .unwrap();

        assert!(!manager.is_online());
        manager.shutdown().await.unwrap();
    }
}

use crate::core::connection_state::{AtomicConnectionStatus, AtomicMetrics};
use crate::core::{ClientEvent, ConnectionStatus, Metrics, Observers, Subscription};
use crate::manager::builder::{states, RealtimeManagerBuilder};
use crate::manager::engine::EngineCommand;
use crate::traits::*;
use crossbeam_channel::Receiver;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Facade over the realtime engine
///
/// Every method returns immediately: commands are handed to the engine task
/// and their outcome is observed through the `on_*` callbacks or
/// [`subscribe`](Self::subscribe). `Err` from a command only means the engine
/// has already stopped.
///
/// # Example
/// ```ignore
/// let manager = RealtimeManager::builder()
///     .url("wss://campus.example.com/realtime")
///     .transport(TungsteniteTransport::new())
///     .storage(JsonFileStorage::new("data/offline.json"))
///     .build()
///     .await?;
///
/// let _sub = manager.on_message(|msg| println!("{}: {}", msg.kind(), msg.payload()));
/// manager.connect()?;
/// manager.send_notification(json!({"msg": "lesson started"}))?;
/// ```
pub struct RealtimeManager {
    commands: UnboundedSender<EngineCommand>,
    observers: Arc<Observers>,
    status: Arc<AtomicConnectionStatus>,
    metrics: Arc<AtomicMetrics>,
    online: Arc<AtomicBool>,
    engine: Option<JoinHandle<()>>,
}

impl RealtimeManager {
    /// Start building a manager
    pub fn builder() -> RealtimeManagerBuilder<states::NoUrl, states::NoTransport> {
        RealtimeManagerBuilder::new()
    }

    pub(crate) fn from_parts(
        commands: UnboundedSender<EngineCommand>,
        observers: Arc<Observers>,
        status: Arc<AtomicConnectionStatus>,
        metrics: Arc<AtomicMetrics>,
        online: Arc<AtomicBool>,
        engine: JoinHandle<()>,
    ) -> Self {
        Self {
            commands,
            observers,
            status,
            metrics,
            online,
            engine: Some(engine),
        }
    }

    /// Open the connection
    ///
    /// From `error` this restarts the reconnection budget; from
    /// `reconnecting` it skips the remaining backoff.
    pub fn connect(&self) -> Result<()> {
        self.command(EngineCommand::Connect)
    }

    /// Close the connection cleanly and stop any automatic reconnection
    pub fn disconnect(&self) -> Result<()> {
        self.command(EngineCommand::Disconnect)
    }

    /// Send a message now, or hold it until it can be sent
    pub fn send(&self, message: Message) -> Result<()> {
        self.command(EngineCommand::Send(message))
    }

    /// Send a notification with a fresh id, returning that id
    pub fn send_notification(&self, payload: Value) -> Result<String> {
        let message = Message::notification(payload);
        let id = message.id().to_string();
        self.send(message)?;
        Ok(id)
    }

    /// Host connectivity came back
    pub fn host_online(&self) -> Result<()> {
        self.command(EngineCommand::HostOnline)
    }

    /// Host lost connectivity
    pub fn host_offline(&self) -> Result<()> {
        self.command(EngineCommand::HostOffline)
    }

    /// Handle for platform connectivity signals
    pub fn host_signal(&self) -> HostSignal {
        HostSignal {
            commands: self.commands.clone(),
        }
    }

    /// Retry undelivered offline notifications now (or on the next open)
    pub fn retry_offline(&self) -> Result<()> {
        self.command(EngineCommand::RetryOffline)
    }

    /// Remove delivered offline notifications, returning how many were removed
    pub async fn clear_delivered(&self) -> Result<usize> {
        self.request(EngineCommand::ClearDelivered).await
    }

    /// Snapshot of the offline store
    pub async fn offline_notifications(&self) -> Result<Vec<OfflineNotification>> {
        self.request(EngineCommand::OfflineSnapshot).await
    }

    /// Ids of messages waiting in the outbound queue, in send order
    pub async fn queued_message_ids(&self) -> Result<Vec<String>> {
        self.request(EngineCommand::QueuedIds).await
    }

    /// Offline notifications still eligible for retry
    pub fn pending_offline_count(&self) -> u64 {
        self.metrics.offline_pending()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status.get()
    }

    /// Check if messages are currently written straight to the channel
    pub fn is_ready(&self) -> bool {
        self.status.is_connected()
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    pub fn metrics(&self) -> Metrics {
        Metrics::snapshot(&self.metrics, &self.status)
    }

    pub fn on_status_change<F>(&self, f: F) -> Subscription
    where
        F: Fn(ConnectionStatus, ConnectionStatus) + Send + Sync + 'static,
    {
        self.observers.on_status_change(f)
    }

    pub fn on_connect<F>(&self, f: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.observers.on_connect(f)
    }

    pub fn on_disconnect<F>(&self, f: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.observers.on_disconnect(f)
    }

    pub fn on_error<F>(&self, f: F) -> Subscription
    where
        F: Fn(&RealtimeError) + Send + Sync + 'static,
    {
        self.observers.on_error(f)
    }

    pub fn on_message<F>(&self, f: F) -> Subscription
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        self.observers.on_message(f)
    }

    pub fn on_message_type<F>(&self, kind: MessageType, f: F) -> Subscription
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        self.observers.on_message_type(kind, f)
    }

    /// Stream of every [`ClientEvent`]
    pub fn subscribe(&self) -> (Receiver<ClientEvent>, Subscription) {
        self.observers.subscribe()
    }

    /// Stop the engine
    ///
    /// Closes the transport cleanly, drops whatever is still queued, writes
    /// the offline store one last time and waits for the engine task.
    pub async fn shutdown(mut self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(EngineCommand::Shutdown(tx)).is_ok() {
            let _ = rx.await;
        }

        if let Some(engine) = self.engine.take() {
            if let Err(e) = engine.await {
                warn!("Engine task ended abnormally: {}", e);
                return Err(RealtimeError::ChannelReceive(e.to_string()));
            }
        }
        info!("Realtime manager shut down");
        Ok(())
    }

    fn command(&self, cmd: EngineCommand) -> Result<()> {
        self.commands
            .send(cmd)
            .map_err(|_| RealtimeError::ChannelSend("engine stopped".into()))
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> EngineCommand) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.command(make(tx))?;
        rx.await
            .map_err(|_| RealtimeError::ChannelReceive("engine stopped".into()))
    }
}

impl Drop for RealtimeManager {
    fn drop(&mut self) {
        if self.engine.is_some() {
            debug!("Realtime manager dropped without shutdown, stopping engine");
            let (tx, _rx) = oneshot::channel();
            let _ = self.commands.send(EngineCommand::Shutdown(tx));
        }
    }
}

/// Cloneable sender for host online/offline transitions
#[derive(Clone)]
pub struct HostSignal {
    commands: UnboundedSender<EngineCommand>,
}

impl HostSignal {
    #[cfg(test)]
    pub(crate) fn from_sender(commands: UnboundedSender<EngineCommand>) -> Self {
        Self { commands }
    }

    pub fn online(&self) -> Result<()> {
        self.commands
            .send(EngineCommand::HostOnline)
            .map_err(|_| RealtimeError::ChannelSend("engine stopped".into()))
    }

    pub fn offline(&self) -> Result<()> {
        self.commands
            .send(EngineCommand::HostOffline)
            .map_err(|_| RealtimeError::ChannelSend("engine stopped".into()))
    }
}

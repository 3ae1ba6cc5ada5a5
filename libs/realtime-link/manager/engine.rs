//! Engine task
//!
//! The single event loop that owns the state machine, the outbound queue and
//! the offline store. Caller commands, transport events and timer expiry are
//! all serialized through one `select!`, so none of the three needs a lock.

use crate::core::{
    ConnectionStateMachine, ConnectionStatus, EnqueueOutcome, MessageQueue, Observers,
    OfflineNotificationStore, Reaction,
};
use crate::core::connection_state::AtomicMetrics;
use crate::traits::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::oneshot;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

/// Requests from the facade to the engine task
pub(crate) enum EngineCommand {
    Connect,
    Disconnect,
    Send(Message),
    HostOnline,
    HostOffline,
    RetryOffline,
    ClearDelivered(oneshot::Sender<usize>),
    OfflineSnapshot(oneshot::Sender<Vec<OfflineNotification>>),
    QueuedIds(oneshot::Sender<Vec<String>>),
    Shutdown(oneshot::Sender<()>),
}

pub(crate) struct Engine {
    machine: ConnectionStateMachine,
    queue: MessageQueue,
    store: OfflineNotificationStore,
    observers: Arc<Observers>,
    metrics: Arc<AtomicMetrics>,
    online: Arc<AtomicBool>,
    /// A sweep was requested while the channel was down
    retry_pending: bool,
}

impl Engine {
    pub(crate) fn new(
        machine: ConnectionStateMachine,
        queue: MessageQueue,
        store: OfflineNotificationStore,
        observers: Arc<Observers>,
        metrics: Arc<AtomicMetrics>,
        online: Arc<AtomicBool>,
    ) -> Self {
        let retry_pending = store.pending_count() > 0;
        if retry_pending {
            info!(
                "{} undelivered offline notifications will be retried on connect",
                store.pending_count()
            );
        }

        let engine = Self {
            machine,
            queue,
            store,
            observers,
            metrics,
            online,
            retry_pending,
        };
        engine.refresh_metrics();
        engine
    }

    pub(crate) async fn run(
        mut self,
        mut commands: UnboundedReceiver<EngineCommand>,
        mut events: UnboundedReceiver<TransportEvent>,
    ) {
        debug!("Engine task started");

        loop {
            let deadline = self.machine.next_deadline();
            let timer = async move {
                match deadline {
                    Some(at) => sleep_until(at).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                biased;

                cmd = commands.recv() => match cmd {
                    Some(EngineCommand::Shutdown(done)) => {
                        self.shutdown();
                        let _ = done.send(());
                        return;
                    }
                    Some(cmd) => self.handle_command(cmd),
                    None => {
                        debug!("All manager handles dropped");
                        self.shutdown();
                        return;
                    }
                },

                Some(event) = events.recv() => {
                    let reaction = self.machine.handle_event(event, Instant::now());
                    self.react(reaction);
                }

                _ = timer => {
                    self.machine.fire_timers(Instant::now());
                }
            }

            self.refresh_metrics();
        }
    }

    fn handle_command(&mut self, cmd: EngineCommand) {
        match cmd {
            EngineCommand::Connect => self.machine.connect(Instant::now()),
            EngineCommand::Disconnect => self.machine.disconnect(),
            EngineCommand::Send(message) => self.send(message),
            EngineCommand::HostOnline => self.host_online(),
            EngineCommand::HostOffline => self.host_offline(),
            EngineCommand::RetryOffline => self.retry_offline(),
            EngineCommand::ClearDelivered(reply) => {
                let _ = reply.send(self.store.clear_delivered());
            }
            EngineCommand::OfflineSnapshot(reply) => {
                let _ = reply.send(self.store.items().to_vec());
            }
            EngineCommand::QueuedIds(reply) => {
                let _ = reply.send(self.queue.ids());
            }
            // Handled by the run loop
            EngineCommand::Shutdown(_) => {}
        }
    }

    fn react(&mut self, reaction: Reaction) {
        match reaction {
            Reaction::Opened => {
                let report = self.queue.flush(|m| self.machine.transmit(m));
                if report.remaining > 0 {
                    warn!("{} queued messages left after flush", report.remaining);
                    if self.retry_pending {
                        debug!("Link not accepting writes, offline retry stays deferred");
                    }
                    return;
                }
                if self.retry_pending && self.machine.is_connected() {
                    self.sweep();
                }
            }
            Reaction::Received(message) => self.observers.message(&message),
            Reaction::Nothing => {}
        }
    }

    /// Route an outbound message
    ///
    /// Open channel: write it. Host offline and a notification: durable
    /// store. Anything else: in-memory queue until the next open.
    fn send(&mut self, message: Message) {
        if self.machine.is_connected() {
            match self.machine.transmit(&message) {
                Ok(()) => return,
                Err(e) => warn!("Send of {} failed, holding it: {}", message.id(), e),
            }
        }

        if !self.is_online() && message.is_notification() {
            self.store.record(&message);
            return;
        }

        match self.queue.enqueue(message) {
            EnqueueOutcome::Queued => {}
            EnqueueOutcome::Discarded(_) => {}
            EnqueueOutcome::Evicted(dropped) | EnqueueOutcome::Rejected(dropped) => {
                self.observers.error(&RealtimeError::QueueOverflow {
                    capacity: self.queue.policy().capacity.unwrap_or(0),
                    dropped_id: dropped.id().to_string(),
                });
            }
        }
    }

    fn host_online(&mut self) {
        info!("Host reports online");
        self.online.store(true, Ordering::Release);
        if self.machine.status() == ConnectionStatus::Disconnected {
            self.machine.connect(Instant::now());
        }
        self.retry_offline();
    }

    fn host_offline(&mut self) {
        info!("Host reports offline");
        self.online.store(false, Ordering::Release);
        self.machine.disconnect();
    }

    fn retry_offline(&mut self) {
        if self.machine.is_connected() {
            self.sweep();
        } else if self.store.pending_count() > 0 {
            debug!("Channel not open, offline retry deferred until connected");
            self.retry_pending = true;
        }
    }

    fn sweep(&mut self) {
        self.retry_pending = false;
        self.store.retry_all(|m| self.machine.transmit(m));
    }

    fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    fn shutdown(&mut self) {
        info!("Shutting down realtime engine");
        self.machine.disconnect();
        let dropped = self.queue.clear();
        if dropped > 0 {
            warn!("Dropped {} queued messages on shutdown", dropped);
        }
        self.store.persist();
        self.refresh_metrics();
    }

    fn refresh_metrics(&self) {
        self.metrics.set_queued(self.queue.len());
        self.metrics.set_offline_pending(self.store.pending_count());
    }
}

//! Connection State Machine
//!
//! Owns the [`ConnectionStatus`], the transport link, the heartbeat monitor
//! and the reconnection timer.
//!
//! ```text
//!  disconnected ──connect()──> connecting ──open──> connected
//!        ^                        │  │                 │  │
//!        │ clean close            │  └──unclean close──┤  └──heartbeat timeout
//!        └────────────────────────┴────────────────────┤
//!                                                      v
//!   error <──attempts exhausted── (policy) ──> reconnecting ──backoff──> connecting
//! ```
//!
//! Time never advances on its own here: callers pass `now` into every
//! operation and sleep until `next_deadline()` themselves. That keeps the
//! machine single-threaded and deterministic, and lets tests drive it with
//! synthetic instants.

use crate::core::config::ClientConfig;
use crate::core::connection_state::{AtomicConnectionStatus, AtomicMetrics, ConnectionStatus};
use crate::core::heartbeat::{HeartbeatDue, HeartbeatMonitor};
use crate::core::observers::Observers;
use crate::traits::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// What the owner of the machine must do after an event
#[derive(Debug, Clone, PartialEq)]
pub enum Reaction {
    Nothing,
    /// Channel just opened: flush pending work
    Opened,
    /// Application message received
    Received(Message),
}

struct Link {
    generation: u64,
    handle: Box<dyn TransportHandle>,
}

pub struct ConnectionStateMachine {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    event_tx: UnboundedSender<TransportEvent>,
    observers: Arc<Observers>,
    shared_status: Arc<AtomicConnectionStatus>,
    metrics: Arc<AtomicMetrics>,
    status: ConnectionStatus,
    link: Option<Link>,
    generation: u64,
    attempts: u32,
    heartbeat: Option<HeartbeatMonitor>,
    reconnect_at: Option<Instant>,
}

impl ConnectionStateMachine {
    pub fn new(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        event_tx: UnboundedSender<TransportEvent>,
        observers: Arc<Observers>,
        shared_status: Arc<AtomicConnectionStatus>,
        metrics: Arc<AtomicMetrics>,
    ) -> Self {
        let heartbeat = config
            .heartbeat
            .map(|hb| HeartbeatMonitor::new(hb, Arc::clone(&config.pong_detector)));
        shared_status.set(ConnectionStatus::Disconnected);

        Self {
            config,
            transport,
            event_tx,
            observers,
            shared_status,
            metrics,
            status: ConnectionStatus::Disconnected,
            link: None,
            generation: 0,
            attempts: 0,
            heartbeat,
            reconnect_at: None,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    #[inline]
    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    /// Attempts made since the last successful open
    pub fn reconnect_attempts(&self) -> u32 {
        self.attempts
    }

    /// When the pending reconnection fires, if one is scheduled
    pub fn reconnect_deadline(&self) -> Option<Instant> {
        self.reconnect_at
    }

    pub fn heartbeat(&self) -> Option<&HeartbeatMonitor> {
        self.heartbeat.as_ref()
    }

    /// Generation of the current transport link
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Delay the policy would apply before attempt `attempt` (1-based)
    pub fn backoff_delay(&self, attempt: u32) -> Option<Duration> {
        self.config
            .reconnect_strategy
            .next_delay(attempt.saturating_sub(1))
    }

    /// Caller-initiated connect
    ///
    /// Valid from `disconnected` and `error`; from `reconnecting` it skips the
    /// remaining backoff. Resets the attempt budget.
    pub fn connect(&mut self, now: Instant) {
        match self.status {
            ConnectionStatus::Connecting | ConnectionStatus::Connected => {
                debug!("connect() ignored while {}", self.status);
            }
            ConnectionStatus::Disconnected
            | ConnectionStatus::Error
            | ConnectionStatus::Reconnecting => {
                self.reconnect_at = None;
                self.attempts = 0;
                self.open(now);
            }
        }
    }

    /// Caller-initiated disconnect
    ///
    /// Cancels every timer, closes the transport cleanly and suppresses any
    /// pending reconnection.
    pub fn disconnect(&mut self) {
        self.reconnect_at = None;
        self.attempts = 0;
        self.stop_heartbeat();
        if let Some(mut link) = self.link.take() {
            debug!("Closing transport link {}", link.generation);
            link.handle.close();
        }
        self.transition(ConnectionStatus::Disconnected);
    }

    /// Feed a transport event
    pub fn handle_event(&mut self, event: TransportEvent, now: Instant) -> Reaction {
        let current = self.link.as_ref().map(|l| l.generation);
        if current != Some(event.generation) {
            debug!(
                "Ignoring stale transport event from link {} (current {:?})",
                event.generation, current
            );
            return Reaction::Nothing;
        }

        match event.kind {
            TransportEventKind::Open => self.on_open(now),
            TransportEventKind::Message(frame) => self.on_frame(frame, now),
            TransportEventKind::Close { clean } => {
                self.link = None;
                if clean {
                    info!("Connection closed cleanly");
                    self.attempts = 0;
                    self.transition(ConnectionStatus::Disconnected);
                } else {
                    warn!("Connection closed unexpectedly");
                    self.schedule_reconnect(now, "connection closed unexpectedly");
                }
                Reaction::Nothing
            }
            TransportEventKind::Error(reason) => {
                error!("Transport error: {}", reason);
                self.fail(RealtimeError::Transport(reason));
                Reaction::Nothing
            }
        }
    }

    /// Earliest pending timer
    pub fn next_deadline(&self) -> Option<Instant> {
        let heartbeat = self.heartbeat.as_ref().and_then(|hb| hb.next_deadline());
        match (heartbeat, self.reconnect_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Run every timer due at `now`
    pub fn fire_timers(&mut self, now: Instant) {
        if let Some(at) = self.reconnect_at {
            if at <= now {
                self.reconnect_at = None;
                if self.status == ConnectionStatus::Reconnecting {
                    info!("Reconnecting (attempt {})", self.attempts);
                    self.open(now);
                }
            }
        }

        if self.status != ConnectionStatus::Connected {
            return;
        }
        let due = match &self.heartbeat {
            Some(hb) => hb.poll(now),
            None => HeartbeatDue::Idle,
        };
        match due {
            HeartbeatDue::TimedOut => {
                let timeout = self
                    .heartbeat
                    .as_ref()
                    .map(|hb| hb.config().timeout)
                    .unwrap_or_default();
                warn!("No heartbeat response within {:?}, forcing reconnect", timeout);
                self.observers.error(&RealtimeError::HeartbeatTimeout(timeout));
                self.drop_link();
                self.schedule_reconnect(now, "heartbeat timeout");
            }
            HeartbeatDue::Probe => {
                let probe = Message::heartbeat();
                match self.transmit(&probe) {
                    Ok(()) => {
                        debug!("Heartbeat probe {} sent", probe.id());
                        if let Some(hb) = self.heartbeat.as_mut() {
                            hb.probe_sent(probe, now);
                        }
                    }
                    Err(e) => {
                        warn!("Failed to send heartbeat: {}", e);
                        self.drop_link();
                        self.schedule_reconnect(now, "heartbeat send failed");
                    }
                }
            }
            HeartbeatDue::Idle => {}
        }
    }

    /// Write a message to the open channel
    pub fn transmit(&mut self, message: &Message) -> Result<()> {
        if self.status != ConnectionStatus::Connected {
            return Err(RealtimeError::NotConnected);
        }
        let link = self.link.as_mut().ok_or(RealtimeError::NotConnected)?;
        let frame = self.config.codec.encode(message)?;
        link.handle.send(frame)?;
        self.metrics.increment_sent();
        Ok(())
    }

    fn open(&mut self, now: Instant) {
        self.transition(ConnectionStatus::Connecting);
        self.generation += 1;
        let sink = TransportEventSink::new(self.generation, self.event_tx.clone());

        info!("Connecting to {} (link {})", self.config.url, self.generation);
        match self
            .transport
            .open(&self.config.url, &self.config.protocols, sink)
        {
            Ok(handle) => {
                self.link = Some(Link {
                    generation: self.generation,
                    handle,
                });
            }
            Err(e) => {
                error!("Failed to start connection: {}", e);
                self.fail(e);
                self.schedule_reconnect(now, "connection could not be started");
            }
        }
    }

    fn on_open(&mut self, now: Instant) -> Reaction {
        if self.status != ConnectionStatus::Connecting {
            warn!("Open event while {}, ignoring", self.status);
            return Reaction::Nothing;
        }

        info!("Connected to {}", self.config.url);
        self.attempts = 0;
        self.transition(ConnectionStatus::Connected);
        if let Some(hb) = self.heartbeat.as_mut() {
            hb.start(now);
        }
        Reaction::Opened
    }

    fn on_frame(&mut self, frame: WsMessage, now: Instant) -> Reaction {
        self.metrics.increment_received();

        let message = match self.config.codec.decode(&frame) {
            Ok(message) => message,
            Err(e) => {
                warn!("Dropping malformed message: {}", e);
                return Reaction::Nothing;
            }
        };

        if message.is_heartbeat() {
            if let Some(hb) = self.heartbeat.as_mut() {
                hb.on_response(&message, now);
            }
            return Reaction::Nothing;
        }
        Reaction::Received(message)
    }

    /// Apply the reconnection policy after an unclean loss of the channel
    fn schedule_reconnect(&mut self, now: Instant, reason: &str) {
        match self.config.reconnect_strategy.next_delay(self.attempts) {
            Some(delay) => {
                self.attempts += 1;
                self.metrics.increment_reconnects();
                self.transition(ConnectionStatus::Reconnecting);
                self.reconnect_at = Some(now + delay);
                info!(
                    "Reconnecting in {:?} (attempt {}): {}",
                    delay, self.attempts, reason
                );
                self.observers.reconnecting(self.attempts, delay);
            }
            None => {
                warn!(
                    "Reconnection attempts exhausted after {}, giving up: {}",
                    self.attempts, reason
                );
                self.reconnect_at = None;
                self.fail(RealtimeError::ReconnectionFailed {
                    attempts: self.attempts,
                    reason: reason.to_string(),
                });
            }
        }
    }

    fn fail(&mut self, error: RealtimeError) {
        self.transition(ConnectionStatus::Error);
        self.observers.error(&error);
    }

    /// Close the current link without waiting for its close event
    fn drop_link(&mut self) {
        if let Some(mut link) = self.link.take() {
            link.handle.close();
        }
    }

    fn stop_heartbeat(&mut self) {
        if let Some(hb) = self.heartbeat.as_mut() {
            hb.stop();
        }
    }

    fn transition(&mut self, next: ConnectionStatus) -> bool {
        let prev = self.status;
        if prev == next {
            return false;
        }
        if !prev.can_transition_to(next) {
            warn!("Refusing illegal transition {} -> {}", prev, next);
            return false;
        }

        if prev == ConnectionStatus::Connected {
            self.stop_heartbeat();
        }
        self.status = next;
        self.shared_status.set(next);
        info!("Connection status: {} -> {}", prev, next);

        self.observers.status_changed(prev, next);
        match next {
            ConnectionStatus::Connected => self.observers.connected(),
            ConnectionStatus::Disconnected => self.observers.disconnected(),
            _ => {}
        }
        true
    }
}

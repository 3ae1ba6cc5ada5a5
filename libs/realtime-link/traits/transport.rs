//! Transport Primitive
//!
//! A duplex channel that can be opened, written to and closed, and that
//! reports what happens to it asynchronously. Only byte delivery is assumed;
//! liveness, ordering across reconnects and redelivery are the engine's job.
//!
//! ```text
//!  Engine ──open(url, protocols, sink)──> Transport ──> handle
//!  Engine ──handle.send(frame)──────────> wire
//!  Engine <──sink: Open | Message | Close{clean} | Error── wire
//! ```

use crate::traits::error::Result;
use crate::traits::parser::WsMessage;
use tokio::sync::mpsc::UnboundedSender;

/// What happened on a transport connection
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEventKind {
    /// Channel is open and writable
    Open,
    /// Frame received from the peer
    Message(WsMessage),
    /// Channel closed; `clean` when both ends agreed to terminate
    Close { clean: bool },
    /// Transport failure; a `Close { clean: false }` normally follows
    Error(String),
}

/// Event tagged with the connection generation that produced it
///
/// The engine ignores events whose generation is not the current one, so a
/// late close from a replaced connection never drives a transition.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportEvent {
    pub generation: u64,
    pub kind: TransportEventKind,
}

/// Callback surface handed to a transport on every `open`
#[derive(Debug, Clone)]
pub struct TransportEventSink {
    generation: u64,
    tx: UnboundedSender<TransportEvent>,
}

impl TransportEventSink {
    pub fn new(generation: u64, tx: UnboundedSender<TransportEvent>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn opened(&self) {
        self.emit(TransportEventKind::Open);
    }

    pub fn message(&self, frame: WsMessage) {
        self.emit(TransportEventKind::Message(frame));
    }

    pub fn closed(&self, clean: bool) {
        self.emit(TransportEventKind::Close { clean });
    }

    pub fn error(&self, reason: impl Into<String>) {
        self.emit(TransportEventKind::Error(reason.into()));
    }

    /// Check if the engine is still listening
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn emit(&self, kind: TransportEventKind) {
        // Engine gone means nobody cares about this connection anymore
        let _ = self.tx.send(TransportEvent {
            generation: self.generation,
            kind,
        });
    }
}

/// Factory for transport connections
pub trait Transport: Send + Sync {
    /// Start opening a connection
    ///
    /// Must not block: the outcome is reported later through `events`
    /// (`Open`, or `Error` followed by `Close { clean: false }`).
    ///
    /// # Returns
    /// * `Ok(handle)` - Connection attempt started
    /// * `Err(RealtimeError)` - Attempt could not even be started
    fn open(
        &self,
        url: &str,
        protocols: &[String],
        events: TransportEventSink,
    ) -> Result<Box<dyn TransportHandle>>;
}

/// Write side of one open connection
pub trait TransportHandle: Send {
    /// Queue a frame for transmission
    ///
    /// Returns an error if the connection can no longer accept frames.
    fn send(&mut self, frame: WsMessage) -> Result<()>;

    /// Close the connection cleanly
    ///
    /// Safe to call more than once.
    fn close(&mut self);
}

//! Common test utilities for realtime-link integration tests
//!
//! - `ScriptedTransport`: in-process transport whose events the test fires
//! - `MockWsServer`: real WebSocket server for end-to-end tests
//! - `wait_until`: poll a condition while the engine task runs

#![allow(dead_code)]

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use realtime_link::{
    JsonCodec, Message, MessageCodec, RealtimeError, Result, Transport, TransportEventSink,
    TransportHandle, WsMessage,
};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message as TungsteniteMessage;

/// Macro for verbose test output (controlled by TEST_VERBOSE env var)
#[macro_export]
macro_rules! verbose_println {
    ($($arg:tt)*) => {
        if std::env::var("TEST_VERBOSE").is_ok() {
            println!($($arg)*);
        }
    };
}

/// Poll `cond` every 5ms (virtual time under `start_paused`), up to 10s
pub async fn wait_until<F>(cond: F) -> bool
where
    F: Fn() -> bool,
{
    for _ in 0..2000 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cond()
}

#[derive(Default)]
struct Script {
    sinks: Mutex<Vec<TransportEventSink>>,
    open_times: Mutex<Vec<Instant>>,
    sent: Mutex<Vec<WsMessage>>,
    closes: AtomicUsize,
    auto_open: AtomicBool,
    refuse: AtomicBool,
    fail_sends: AtomicBool,
}

/// Transport driven by the test
///
/// Every `open` is recorded; the test then decides whether the connection
/// opens, drops, or delivers messages.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    script: Arc<Script>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `open` succeeds immediately
    pub fn auto_open() -> Self {
        let transport = Self::default();
        transport.script.auto_open.store(true, Ordering::SeqCst);
        transport
    }

    pub fn set_auto_open(&self, on: bool) {
        self.script.auto_open.store(on, Ordering::SeqCst);
    }

    /// Make `open` return an error
    pub fn set_refuse(&self, on: bool) {
        self.script.refuse.store(on, Ordering::SeqCst);
    }

    /// Make `send` on open handles fail
    pub fn set_fail_sends(&self, on: bool) {
        self.script.fail_sends.store(on, Ordering::SeqCst);
    }

    pub fn open_count(&self) -> usize {
        self.script.sinks.lock().len()
    }

    pub fn open_times(&self) -> Vec<Instant> {
        self.script.open_times.lock().clone()
    }

    pub fn close_count(&self) -> usize {
        self.script.closes.load(Ordering::SeqCst)
    }

    fn latest(&self) -> TransportEventSink {
        self.script
            .sinks
            .lock()
            .last()
            .cloned()
            .expect("no connection has been opened")
    }

    /// Fire `open` on the latest connection
    pub fn accept(&self) {
        self.latest().opened();
    }

    /// Fire `close` on the latest connection
    pub fn drop_connection(&self, clean: bool) {
        self.latest().closed(clean);
    }

    /// Fire `error` on the latest connection
    pub fn fail(&self, reason: &str) {
        self.latest().error(reason);
    }

    /// Deliver a message from the peer on the latest connection
    pub fn deliver(&self, message: &Message) {
        let frame = JsonCodec.encode(message).expect("encode");
        self.latest().message(frame);
    }

    /// Deliver a raw frame from the peer
    pub fn deliver_raw(&self, frame: WsMessage) {
        self.latest().message(frame);
    }

    /// Everything written to any connection, decoded
    pub fn sent(&self) -> Vec<Message> {
        self.script
            .sent
            .lock()
            .iter()
            .map(|frame| JsonCodec.decode(frame).expect("decode"))
            .collect()
    }

    /// Sent messages that are not heartbeats
    pub fn sent_payload_ids(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|m| !m.is_heartbeat())
            .map(|m| m.id().to_string())
            .collect()
    }
}

impl Transport for ScriptedTransport {
    fn open(
        &self,
        _url: &str,
        _protocols: &[String],
        events: TransportEventSink,
    ) -> Result<Box<dyn TransportHandle>> {
        if self.script.refuse.load(Ordering::SeqCst) {
            return Err(RealtimeError::Transport("connection refused".into()));
        }

        self.script.open_times.lock().push(Instant::now());
        self.script.sinks.lock().push(events.clone());
        if self.script.auto_open.load(Ordering::SeqCst) {
            events.opened();
        }

        Ok(Box::new(ScriptedHandle {
            script: Arc::clone(&self.script),
            closed: false,
        }))
    }
}

struct ScriptedHandle {
    script: Arc<Script>,
    closed: bool,
}

impl TransportHandle for ScriptedHandle {
    fn send(&mut self, frame: WsMessage) -> Result<()> {
        if self.closed || self.script.fail_sends.load(Ordering::SeqCst) {
            return Err(RealtimeError::ConnectionClosed("scripted send failure".into()));
        }
        self.script.sent.lock().push(frame);
        Ok(())
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.script.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// How the mock server treats incoming frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerMode {
    /// Echo every text/binary frame back
    Echo,
    /// Accept the connection, never answer
    Silent,
}

/// A simple mock WebSocket server for testing
pub struct MockWsServer {
    pub addr: SocketAddr,
    shutdown: Arc<Notify>,
    accepted: Arc<AtomicUsize>,
    received: Arc<Mutex<Vec<String>>>,
    protocols: Arc<Mutex<Vec<String>>>,
}

impl MockWsServer {
    /// Create and start a new echo server
    pub async fn start() -> Self {
        Self::start_with(ServerMode::Echo).await
    }

    pub async fn start_with(mode: ServerMode) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Arc::new(Notify::new());
        let accepted = Arc::new(AtomicUsize::new(0));
        let received = Arc::new(Mutex::new(Vec::new()));
        let protocols = Arc::new(Mutex::new(Vec::new()));

        let server = Self {
            addr,
            shutdown: Arc::clone(&shutdown),
            accepted: Arc::clone(&accepted),
            received: Arc::clone(&received),
            protocols: Arc::clone(&protocols),
        };

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, _)) => {
                                accepted.fetch_add(1, Ordering::SeqCst);
                                let shutdown = Arc::clone(&shutdown);
                                let received = Arc::clone(&received);
                                let protocols = Arc::clone(&protocols);
                                tokio::spawn(async move {
                                    Self::handle_connection(stream, mode, shutdown, received, protocols).await;
                                });
                            }
                            Err(e) => {
                                eprintln!("Accept error: {}", e);
                                break;
                            }
                        }
                    }
                    _ = shutdown.notified() => {
                        break;
                    }
                }
            }
        });

        server
    }

    async fn handle_connection(
        stream: tokio::net::TcpStream,
        mode: ServerMode,
        shutdown: Arc<Notify>,
        received: Arc<Mutex<Vec<String>>>,
        protocols: Arc<Mutex<Vec<String>>>,
    ) {
        use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

        let callback = |request: &Request, response: Response| {
            if let Some(value) = request.headers().get("Sec-WebSocket-Protocol") {
                if let Ok(value) = value.to_str() {
                    protocols.lock().push(value.to_string());
                }
            }
            let mut response = response;
            // Accept the first offered sub-protocol
            if let Some(value) = request.headers().get("Sec-WebSocket-Protocol") {
                if let Some(first) = value.to_str().ok().and_then(|v| v.split(',').next()) {
                    if let Ok(header) = first.trim().parse() {
                        response.headers_mut().insert("Sec-WebSocket-Protocol", header);
                    }
                }
            }
            Ok::<Response, ErrorResponse>(response)
        };

        let ws_stream = match tokio_tungstenite::accept_hdr_async(stream, callback).await {
            Ok(ws) => ws,
            Err(e) => {
                eprintln!("WebSocket handshake failed: {}", e);
                return;
            }
        };

        let (mut write, mut read) = ws_stream.split();

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(msg)) => {
                            if let TungsteniteMessage::Text(text) = &msg {
                                received.lock().push(text.clone());
                            }
                            if (msg.is_text() || msg.is_binary()) && mode == ServerMode::Echo {
                                if write.send(msg).await.is_err() {
                                    break;
                                }
                            } else if msg.is_close() {
                                break;
                            }
                        }
                        Some(Err(_)) | None => break,
                    }
                }
                _ = shutdown.notified() => {
                    break;
                }
            }
        }
    }

    /// Get the WebSocket URL for this server
    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Connections accepted so far
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Text frames received from clients
    pub fn received(&self) -> Vec<String> {
        self.received.lock().clone()
    }

    /// Sub-protocol headers offered by clients
    pub fn offered_protocols(&self) -> Vec<String> {
        self.protocols.lock().clone()
    }

    /// Shutdown the server
    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }
}

impl Drop for MockWsServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

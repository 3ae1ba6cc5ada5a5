//! WebSocket transport over tokio-tungstenite
//!
//! Each `open` spawns one task that owns the socket for the lifetime of that
//! connection. The returned handle only feeds an outgoing channel, so `send`
//! and `close` never block the engine.

use crate::traits::*;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message as TungsteniteMessage;
use tracing::{debug, error, info, warn};

const PROTOCOL_HEADER: &str = "Sec-WebSocket-Protocol";

enum Outgoing {
    Frame(WsMessage),
    Close,
}

/// Transport backed by real WebSocket connections
#[derive(Clone, Default)]
pub struct TungsteniteTransport {
    headers: Option<Arc<dyn HeaderProvider>>,
}

impl TungsteniteTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add handshake headers, re-evaluated on every connection attempt
    pub fn with_headers(mut self, provider: Arc<dyn HeaderProvider>) -> Self {
        self.headers = Some(provider);
        self
    }
}

impl Transport for TungsteniteTransport {
    fn open(
        &self,
        url: &str,
        protocols: &[String],
        events: TransportEventSink,
    ) -> Result<Box<dyn TransportHandle>> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            RealtimeError::Transport(format!("no async runtime to drive the socket: {}", e))
        })?;

        let (tx, rx) = unbounded_channel();
        runtime.spawn(run_connection(
            url.to_string(),
            protocols.to_vec(),
            self.headers.clone(),
            events,
            rx,
        ));

        Ok(Box::new(TungsteniteHandle { tx, closed: false }))
    }
}

struct TungsteniteHandle {
    tx: UnboundedSender<Outgoing>,
    closed: bool,
}

impl TransportHandle for TungsteniteHandle {
    fn send(&mut self, frame: WsMessage) -> Result<()> {
        if self.closed {
            return Err(RealtimeError::ConnectionClosed("handle already closed".into()));
        }
        self.tx
            .send(Outgoing::Frame(frame))
            .map_err(|_| RealtimeError::ConnectionClosed("socket task has exited".into()))
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            let _ = self.tx.send(Outgoing::Close);
        }
    }
}

async fn build_request(
    url: &str,
    protocols: &[String],
    headers: Option<&Arc<dyn HeaderProvider>>,
) -> Result<Request> {
    let mut request = url
        .into_client_request()
        .map_err(|e| RealtimeError::Configuration(format!("invalid url {}: {}", url, e)))?;

    if let Some(provider) = headers {
        for (key, value) in provider.get_headers().await {
            match (
                key.parse::<http::header::HeaderName>(),
                value.parse::<http::header::HeaderValue>(),
            ) {
                (Ok(name), Ok(value)) => {
                    request.headers_mut().insert(name, value);
                }
                _ => warn!("Skipping invalid header '{}'", key),
            }
        }
    }

    if !protocols.is_empty() {
        let value = protocols.join(", ");
        match value.parse::<http::header::HeaderValue>() {
            Ok(value) => {
                request.headers_mut().insert(PROTOCOL_HEADER, value);
            }
            Err(_) => warn!("Skipping invalid sub-protocol list '{}'", protocols.join(", ")),
        }
    }

    Ok(request)
}

async fn run_connection(
    url: String,
    protocols: Vec<String>,
    headers: Option<Arc<dyn HeaderProvider>>,
    events: TransportEventSink,
    mut outgoing: UnboundedReceiver<Outgoing>,
) {
    let request = match build_request(&url, &protocols, headers.as_ref()).await {
        Ok(request) => request,
        Err(e) => {
            events.error(e.to_string());
            events.closed(false);
            return;
        }
    };

    let connecting = connect_async(request);
    tokio::pin!(connecting);

    let ws_stream = loop {
        tokio::select! {
            result = &mut connecting => match result {
                Ok((stream, _response)) => break stream,
                Err(e) => {
                    error!("WebSocket handshake with {} failed: {}", url, e);
                    events.error(e.to_string());
                    events.closed(false);
                    return;
                }
            },
            cmd = outgoing.recv() => match cmd {
                Some(Outgoing::Frame(_)) => {
                    warn!("Dropping frame sent before the socket opened");
                }
                Some(Outgoing::Close) | None => {
                    debug!("Connection attempt {} abandoned", events.generation());
                    events.closed(true);
                    return;
                }
            },
        }
    };

    info!("WebSocket connected to {}", url);
    events.opened();
    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            msg = read.next() => match msg {
                Some(Ok(TungsteniteMessage::Close(frame))) => {
                    let clean = frame.as_ref().map_or(false, |f| f.code == CloseCode::Normal);
                    debug!("Peer closed connection: {:?}", frame);
                    events.closed(clean);
                    return;
                }
                Some(Ok(msg)) => {
                    if let Some(frame) = tungstenite_to_ws_message(msg) {
                        events.message(frame);
                    }
                }
                Some(Err(e)) => {
                    warn!("WebSocket error: {}", e);
                    events.error(e.to_string());
                    events.closed(false);
                    return;
                }
                None => {
                    warn!("WebSocket stream ended without a close frame");
                    events.closed(false);
                    return;
                }
            },
            cmd = outgoing.recv() => match cmd {
                Some(Outgoing::Frame(frame)) => {
                    if let Err(e) = write.send(ws_message_to_tungstenite(&frame)).await {
                        warn!("WebSocket write failed: {}", e);
                        events.error(e.to_string());
                        events.closed(false);
                        return;
                    }
                }
                Some(Outgoing::Close) | None => {
                    let close = TungsteniteMessage::Close(Some(CloseFrame {
                        code: CloseCode::Normal,
                        reason: "client disconnect".into(),
                    }));
                    let _ = write.send(close).await;
                    let _ = write.close().await;
                    debug!("WebSocket link {} closed by client", events.generation());
                    events.closed(true);
                    return;
                }
            },
        }
    }
}

fn ws_message_to_tungstenite(msg: &WsMessage) -> TungsteniteMessage {
    match msg {
        WsMessage::Text(text) => TungsteniteMessage::Text(text.clone()),
        WsMessage::Binary(data) => TungsteniteMessage::Binary(data.clone()),
    }
}

fn tungstenite_to_ws_message(msg: TungsteniteMessage) -> Option<WsMessage> {
    match msg {
        TungsteniteMessage::Text(text) => Some(WsMessage::Text(text)),
        TungsteniteMessage::Binary(data) => Some(WsMessage::Binary(data)),
        TungsteniteMessage::Ping(_)
        | TungsteniteMessage::Pong(_)
        | TungsteniteMessage::Close(_)
        | TungsteniteMessage::Frame(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[tokio::test]
    async fn test_request_carries_headers_and_protocols() {
        let mut headers = HashMap::new();
        headers.insert("X-Session".to_string(), "abc".to_string());
        let provider: Arc<dyn HeaderProvider> = Arc::new(StaticHeaders(headers));

        let request = build_request(
            "ws://localhost:9000/ws",
            &["realtime.v1".to_string(), "json".to_string()],
            Some(&provider),
        )
        .await
        .unwrap();

        assert_eq!(request.headers()["X-Session"], "abc");
        assert_eq!(request.headers()[PROTOCOL_HEADER], "realtime.v1, json");
    }

    #[tokio::test]
    async fn test_invalid_url_rejected() {
        let result = build_request("not a url", &[], None).await;
        assert!(matches!(result, Err(RealtimeError::Configuration(_))));
    }

    #[test]
    fn test_open_without_runtime_fails() {
        let (tx, _rx) = unbounded_channel();
        let result = TungsteniteTransport::new().open(
            "ws://localhost:1",
            &[],
            TransportEventSink::new(1, tx),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_control_frames_not_forwarded() {
        assert_eq!(tungstenite_to_ws_message(TungsteniteMessage::Ping(vec![1])), None);
        assert_eq!(
            tungstenite_to_ws_message(TungsteniteMessage::Text("hi".into())),
            Some(WsMessage::Text("hi".into()))
        );
    }
}

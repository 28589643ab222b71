//! The realtime WebSocket connection.
//!
//! A single writer task owns the socket. Everything sent to the service goes
//! through an mpsc channel feeding that task, so concurrent producers (the
//! event loop, the audio send worker, tool executions) never interleave
//! partial writes. Parsed server events come back over a second channel.

use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::base::{RealtimeError, RealtimeResult};
use super::messages::{ClientEvent, ConversationItem, ServerEvent, SessionConfig};
use crate::config::AssistantConfig;

/// Capacity of the outbound and inbound event channels.
pub const WS_CHANNEL_CAPACITY: usize = 256;

/// How long [`Connection::close`] waits for the socket task to finish.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Longest slice of an unparseable message included in logs.
const LOG_PREVIEW_CHARS: usize = 200;

/// Cloneable handle for sending client events.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::Sender<ClientEvent>,
    closed: CancellationToken,
}

impl EventSender {
    /// Wrap the outbound channel and the token that closes the connection.
    pub fn new(tx: mpsc::Sender<ClientEvent>, closed: CancellationToken) -> Self {
        Self { tx, closed }
    }

    /// Send an event to the service.
    pub async fn send(&self, event: ClientEvent) -> RealtimeResult<()> {
        if self.closed.is_cancelled() {
            return Err(RealtimeError::NotConnected);
        }
        self.tx
            .send(event)
            .await
            .map_err(|_| RealtimeError::NotConnected)
    }

    /// Send the session configuration.
    pub async fn update_session(&self, session: SessionConfig) -> RealtimeResult<()> {
        self.send(ClientEvent::SessionUpdate { session }).await
    }

    /// Append base64-encoded PCM to the input buffer.
    pub async fn append_audio(&self, audio: String) -> RealtimeResult<()> {
        self.send(ClientEvent::InputAudioBufferAppend { audio }).await
    }

    /// Ask the service to generate a response.
    pub async fn create_response(&self) -> RealtimeResult<()> {
        self.send(ClientEvent::ResponseCreate).await
    }

    /// Cancel the response in progress, if any.
    pub async fn cancel_response(&self) -> RealtimeResult<()> {
        self.send(ClientEvent::ResponseCancel).await
    }

    /// Submit a function result, inserted after `previous_item_id`.
    pub async fn submit_function_output(
        &self,
        call_id: &str,
        previous_item_id: Option<String>,
        output: String,
    ) -> RealtimeResult<()> {
        self.send(ClientEvent::ConversationItemCreate {
            item: ConversationItem::function_call_output(call_id, output),
            previous_item_id,
        })
        .await
    }

    /// Request the connection to close. Idempotent.
    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled() || self.tx.is_closed()
    }
}

/// An open realtime connection.
pub struct Connection {
    sender: EventSender,
    events: mpsc::Receiver<RealtimeResult<ServerEvent>>,
    task: Option<JoinHandle<()>>,
}

impl Connection {
    /// Assemble a connection from channels driven by something other than a socket.
    ///
    /// Whoever holds the other ends receives every [`ClientEvent`] and feeds
    /// [`ServerEvent`]s; dropping the event sender ends the stream.
    pub fn from_parts(
        sender: EventSender,
        events: mpsc::Receiver<RealtimeResult<ServerEvent>>,
    ) -> Self {
        Self {
            sender,
            events,
            task: None,
        }
    }

    /// Open the WebSocket described by `config`.
    pub async fn connect(config: &AssistantConfig) -> RealtimeResult<Self> {
        let url = config
            .websocket_url()
            .map_err(|e| RealtimeError::InvalidConfiguration(e.to_string()))?;
        let host = match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => {
                return Err(RealtimeError::InvalidConfiguration(
                    "endpoint has no host".to_string(),
                ));
            }
        };

        let request = http::Request::builder()
            .uri(url.as_str())
            .header("api-key", config.api_key.as_str())
            .header(
                "Sec-WebSocket-Key",
                tungstenite::handshake::client::generate_key(),
            )
            .header("Sec-WebSocket-Version", "13")
            .header("Connection", "Upgrade")
            .header("Upgrade", "websocket")
            .header("Host", host)
            .body(())
            .map_err(|e| RealtimeError::ConnectionFailed(e.to_string()))?;

        debug!("Connecting to {}", redact_query(&url));
        let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(classify_connect_error)?;

        info!("Connected to Voice Live realtime API with model {}", config.model);

        let (out_tx, out_rx) = mpsc::channel::<ClientEvent>(WS_CHANNEL_CAPACITY);
        let (in_tx, in_rx) = mpsc::channel(WS_CHANNEL_CAPACITY);
        let closed = CancellationToken::new();

        let task = tokio::spawn(run_socket(ws_stream, out_rx, in_tx, closed.clone()));

        Ok(Self {
            sender: EventSender::new(out_tx, closed),
            events: in_rx,
            task: Some(task),
        })
    }

    /// A handle for sending events on this connection.
    pub fn sender(&self) -> EventSender {
        self.sender.clone()
    }

    /// Next server event, or `None` once the connection has ended.
    pub async fn next_event(&mut self) -> Option<RealtimeResult<ServerEvent>> {
        self.events.recv().await
    }

    /// Close the connection and wait briefly for the socket task.
    pub async fn close(&mut self) {
        self.sender.close();
        let Some(task) = self.task.take() else {
            return;
        };

        let abort = task.abort_handle();
        match tokio::time::timeout(CLOSE_TIMEOUT, task).await {
            Ok(Ok(())) => debug!("WebSocket task finished"),
            Ok(Err(e)) => warn!("WebSocket task failed: {}", e),
            Err(_) => {
                warn!("WebSocket task did not finish within {:?}, aborting", CLOSE_TIMEOUT);
                abort.abort();
            }
        }
    }
}

fn classify_connect_error(err: tungstenite::Error) -> RealtimeError {
    match &err {
        tungstenite::Error::Http(response)
            if matches!(response.status().as_u16(), 401 | 403) =>
        {
            RealtimeError::AuthenticationFailed(format!("HTTP {}", response.status()))
        }
        _ => RealtimeError::ConnectionFailed(err.to_string()),
    }
}

fn redact_query(url: &url::Url) -> String {
    let mut shown = url.clone();
    shown.set_query(None);
    shown.to_string()
}

fn preview(text: &str) -> String {
    text.chars().take(LOG_PREVIEW_CHARS).collect()
}

async fn run_socket(
    ws_stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    mut outgoing: mpsc::Receiver<ClientEvent>,
    incoming: mpsc::Sender<RealtimeResult<ServerEvent>>,
    closed: CancellationToken,
) {
    let (mut ws_sink, mut ws_stream) = ws_stream.split();

    loop {
        tokio::select! {
            _ = closed.cancelled() => {
                if let Err(e) = ws_sink.send(Message::Close(None)).await {
                    debug!("Failed to send close frame: {}", e);
                }
                break;
            }

            // Handle outgoing messages
            Some(event) = outgoing.recv() => {
                let json = match serde_json::to_string(&event) {
                    Ok(j) => j,
                    Err(e) => {
                        error!("Failed to serialize {} event: {}", event.kind(), e);
                        continue;
                    }
                };

                if let Err(e) = ws_sink.send(Message::Text(json.into())).await {
                    error!("Failed to send WebSocket message: {}", e);
                    let _ = incoming
                        .send(Err(RealtimeError::WebSocketError(e.to_string())))
                        .await;
                    break;
                }
            }

            // Handle incoming messages
            msg = ws_stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ServerEvent>(&text) {
                            Ok(event) => {
                                if incoming.send(Ok(event)).await.is_err() {
                                    debug!("Event receiver dropped, closing socket");
                                    break;
                                }
                            }
                            Err(e) => {
                                warn!("Failed to parse server event: {} - {}", e, preview(&text));
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("WebSocket closed by server");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = ws_sink.send(Message::Pong(data)).await {
                            error!("Failed to send pong: {}", e);
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!("WebSocket error: {}", e);
                        let _ = incoming
                            .send(Err(RealtimeError::WebSocketError(e.to_string())))
                            .await;
                        break;
                    }
                    None => {
                        info!("WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    closed.cancel();
}

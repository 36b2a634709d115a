//! Message transport for realtime sessions.
//!
//! A [`Connector`] dials the service and yields a [`Connection`]: a cloneable
//! [`TransportSender`] for outbound frames and a receiver of inbound text
//! messages. The inbound channel ending means the connection is gone.
//!
//! [`WebSocketConnector`] is the production implementation on
//! tokio-tungstenite. Other connectors (in-process peers, proxies) plug in
//! through the same trait.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use http::HeaderMap;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{
    Message,
    client::IntoClientRequest,
    protocol::{CloseFrame, frame::coding::CloseCode},
};
use url::Url;

use super::base::{RealtimeError, RealtimeResult};

/// Channel capacity for WebSocket messages
const WS_CHANNEL_CAPACITY: usize = 256;

/// Outbound frame queued for the transport task.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportMessage {
    Text(String),
    Binary(Bytes),
    /// Close the connection with a normal closure
    Close,
}

/// Cloneable handle for sending on a connection.
#[derive(Debug, Clone)]
pub struct TransportSender {
    tx: mpsc::Sender<TransportMessage>,
}

impl TransportSender {
    pub fn new(tx: mpsc::Sender<TransportMessage>) -> Self {
        Self { tx }
    }

    pub async fn send_text(&self, text: String) -> RealtimeResult<()> {
        self.send(TransportMessage::Text(text)).await
    }

    pub async fn send_binary(&self, data: Bytes) -> RealtimeResult<()> {
        self.send(TransportMessage::Binary(data)).await
    }

    /// Request a normal closure. Closing an already closed connection is a no-op.
    pub async fn close(&self) -> RealtimeResult<()> {
        if self.tx.is_closed() {
            return Ok(());
        }
        // The transport task may exit between the check and the send
        let _ = self.tx.send(TransportMessage::Close).await;
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn send(&self, message: TransportMessage) -> RealtimeResult<()> {
        self.tx
            .send(message)
            .await
            .map_err(|_| RealtimeError::NotConnected)
    }
}

/// An established connection.
#[derive(Debug)]
pub struct Connection {
    pub sender: TransportSender,
    /// Inbound text messages in arrival order
    pub inbound: mpsc::Receiver<String>,
}

/// Establishes connections to the realtime service.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &Url, headers: &HeaderMap) -> RealtimeResult<Connection>;
}

// =============================================================================
// WebSocket
// =============================================================================

/// tokio-tungstenite connector.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    dial_timeout: Duration,
}

impl WebSocketConnector {
    pub fn new(dial_timeout: Duration) -> Self {
        Self { dial_timeout }
    }
}

impl Default for WebSocketConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, url: &Url, headers: &HeaderMap) -> RealtimeResult<Connection> {
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| RealtimeError::Transport(e.to_string()))?;
        for (name, value) in headers {
            request.headers_mut().insert(name.clone(), value.clone());
        }

        let (ws_stream, _response) =
            tokio::time::timeout(self.dial_timeout, tokio_tungstenite::connect_async(request))
                .await
                .map_err(|_| {
                    RealtimeError::Transport(format!(
                        "dial timed out after {:?}",
                        self.dial_timeout
                    ))
                })?
                .map_err(|e| RealtimeError::Transport(e.to_string()))?;

        tracing::info!(host = url.host_str().unwrap_or_default(), "Connected to realtime service");

        let (mut ws_sink, mut ws_stream) = ws_stream.split();

        ws_sink
            .send(Message::Ping(Bytes::new()))
            .await
            .map_err(|e| RealtimeError::Transport(format!("initial ping failed: {}", e)))?;

        let (out_tx, mut out_rx) = mpsc::channel::<TransportMessage>(WS_CHANNEL_CAPACITY);
        let (in_tx, in_rx) = mpsc::channel::<String>(WS_CHANNEL_CAPACITY);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    outbound = out_rx.recv() => {
                        let message = match outbound {
                            Some(TransportMessage::Text(text)) => Message::Text(text.into()),
                            Some(TransportMessage::Binary(data)) => Message::Binary(data),
                            Some(TransportMessage::Close) | None => {
                                let frame = CloseFrame {
                                    code: CloseCode::Normal,
                                    reason: "".into(),
                                };
                                if let Err(e) = ws_sink.send(Message::Close(Some(frame))).await {
                                    tracing::debug!("Failed to send close frame: {}", e);
                                }
                                break;
                            }
                        };

                        if let Err(e) = ws_sink.send(message).await {
                            tracing::error!("Failed to send WebSocket message: {}", e);
                            break;
                        }
                    }

                    inbound = ws_stream.next() => {
                        match inbound {
                            Some(Ok(Message::Text(text))) => {
                                if in_tx.send(text.as_str().to_owned()).await.is_err() {
                                    break;
                                }
                            }
                            Some(Ok(Message::Ping(data))) => {
                                if let Err(e) = ws_sink.send(Message::Pong(data)).await {
                                    tracing::error!("Failed to send pong: {}", e);
                                }
                            }
                            Some(Ok(Message::Close(frame))) => {
                                tracing::info!(?frame, "WebSocket closed by server");
                                break;
                            }
                            Some(Ok(Message::Binary(data))) => {
                                tracing::debug!(len = data.len(), "Ignoring binary message");
                            }
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                tracing::error!("WebSocket error: {}", e);
                                break;
                            }
                            None => break,
                        }
                    }
                }
            }
            tracing::debug!("WebSocket task finished");
        });

        Ok(Connection {
            sender: TransportSender::new(out_tx),
            inbound: in_rx,
        })
    }
}

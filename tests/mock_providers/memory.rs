//! In-memory realtime transport.
//!
//! [`MemoryConnector`] hands a session one prepared connection while the test
//! keeps the service end as a [`MemoryPeer`], scripting server events and
//! inspecting what the client sent.

use std::sync::Arc;

use async_trait::async_trait;
use http::HeaderMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use url::Url;
use waav_realtime::core::realtime::{
    Connection, Connector, RealtimeError, RealtimeResult, TransportMessage, TransportSender,
};

const CHANNEL_CAPACITY: usize = 256;

/// Connector handing a single prepared connection to the session while the
/// other end stays with a [`MemoryPeer`].
pub struct MemoryConnector {
    connection: Mutex<Option<Connection>>,
    request: Arc<Mutex<Option<(Url, HeaderMap)>>>,
}

/// Service side of a [`MemoryConnector`].
pub struct MemoryPeer {
    to_client: Option<mpsc::Sender<String>>,
    from_client: mpsc::Receiver<TransportMessage>,
    request: Arc<Mutex<Option<(Url, HeaderMap)>>>,
}

impl MemoryConnector {
    pub fn new() -> (Self, MemoryPeer) {
        let (out_tx, out_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (in_tx, in_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let request = Arc::new(Mutex::new(None));

        let connector = Self {
            connection: Mutex::new(Some(Connection {
                sender: TransportSender::new(out_tx),
                inbound: in_rx,
            })),
            request: request.clone(),
        };
        let peer = MemoryPeer {
            to_client: Some(in_tx),
            from_client: out_rx,
            request,
        };
        (connector, peer)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, url: &Url, headers: &HeaderMap) -> RealtimeResult<Connection> {
        let connection = self
            .connection
            .lock()
            .take()
            .ok_or_else(|| RealtimeError::Transport("memory connection already used".to_string()))?;
        *self.request.lock() = Some((url.clone(), headers.clone()));
        Ok(connection)
    }
}

impl MemoryPeer {
    /// Deliver a text message to the client.
    pub async fn send_text(&self, text: impl Into<String>) -> RealtimeResult<()> {
        match &self.to_client {
            Some(tx) => tx
                .send(text.into())
                .await
                .map_err(|_| RealtimeError::NotConnected),
            None => Err(RealtimeError::NotConnected),
        }
    }

    /// Deliver a JSON event to the client.
    pub async fn send_json(&self, value: serde_json::Value) -> RealtimeResult<()> {
        self.send_text(value.to_string()).await
    }

    /// Next frame sent by the client, `None` once the client side is gone.
    pub async fn recv(&mut self) -> Option<TransportMessage> {
        self.from_client.recv().await
    }

    /// Next text frame sent by the client, decoded as JSON. Non-text frames
    /// are skipped.
    pub async fn recv_json(&mut self) -> Option<serde_json::Value> {
        loop {
            match self.from_client.recv().await? {
                TransportMessage::Text(text) => return serde_json::from_str(&text).ok(),
                _ => continue,
            }
        }
    }

    /// Next client event whose `type` is not `input_audio_buffer.append`.
    pub async fn recv_control_event(&mut self) -> Option<serde_json::Value> {
        loop {
            let event = self.recv_json().await?;
            if event["type"] != "input_audio_buffer.append" {
                return Some(event);
            }
        }
    }

    /// Drop the inbound side, as if the service closed the connection.
    pub fn hang_up(&mut self) {
        self.to_client = None;
    }

    /// URL and headers the client connected with.
    pub fn request(&self) -> Option<(Url, HeaderMap)> {
        self.request.lock().clone()
    }
}

#[tokio::test]
async fn test_memory_connector_round_trip() {
    let (connector, mut peer) = MemoryConnector::new();
    let url = Url::parse("wss://example.com/v1/realtime?model=m").unwrap();
    let mut connection = connector.connect(&url, &HeaderMap::new()).await.unwrap();

    connection.sender.send_text("hello".to_string()).await.unwrap();
    assert_eq!(
        peer.recv().await,
        Some(TransportMessage::Text("hello".to_string()))
    );

    peer.send_text("world").await.unwrap();
    assert_eq!(connection.inbound.recv().await.as_deref(), Some("world"));

    peer.hang_up();
    assert!(connection.inbound.recv().await.is_none());

    let (seen_url, _) = peer.request().unwrap();
    assert_eq!(seen_url, url);
}

#[tokio::test]
async fn test_memory_connector_single_use() {
    let (connector, _peer) = MemoryConnector::new();
    let url = Url::parse("wss://example.com").unwrap();
    connector.connect(&url, &HeaderMap::new()).await.unwrap();
    match connector.connect(&url, &HeaderMap::new()).await {
        Err(RealtimeError::Transport(_)) => {}
        other => panic!("Expected Transport error, got {:?}", other.map(|_| ())),
    }
}

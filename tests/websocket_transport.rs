//! WebSocket transport tests against a local mock server
//!
//! The mock accepts a single connection with `tokio_tungstenite::accept_hdr_async`
//! and records the upgrade request so tests can check the URL and headers the
//! client dialed with.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use http::{HeaderMap, HeaderValue};
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_util::sync::CancellationToken;
use url::Url;

use waav_realtime::ClientConfig;
use waav_realtime::core::realtime::{
    Connector, RealtimeError, RealtimeSession, SessionState, WebSocketConnector,
};

const STEP: Duration = Duration::from_secs(5);

/// Upgrade request seen by the mock server.
#[derive(Debug)]
struct SeenRequest {
    uri: String,
    authorization: Option<String>,
    beta: Option<String>,
}

/// Bind a listener and accept one WebSocket client on it.
async fn mock_server() -> (
    Url,
    tokio::task::JoinHandle<(WebSocketStream<TcpStream>, SeenRequest)>,
) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let url = Url::parse(&format!("ws://{}/v1/realtime", addr)).unwrap();

    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (seen_tx, seen_rx) = oneshot::channel();
        let callback = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            let header = |name: &str| {
                req.headers()
                    .get(name)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string)
            };
            let _ = seen_tx.send(SeenRequest {
                uri: req.uri().to_string(),
                authorization: header("authorization"),
                beta: header("openai-beta"),
            });
            Ok(resp)
        };
        let ws = tokio_tungstenite::accept_hdr_async(stream, callback)
            .await
            .unwrap();
        (ws, seen_rx.await.unwrap())
    });

    (url, handle)
}

fn auth_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("authorization", HeaderValue::from_static("Bearer sk-test"));
    headers.insert("openai-beta", HeaderValue::from_static("realtime=v1"));
    headers
}

/// Next non-control frame from the client.
async fn next_data(ws: &mut WebSocketStream<TcpStream>) -> Message {
    loop {
        let message = tokio::time::timeout(STEP, ws.next())
            .await
            .expect("timed out waiting for the client")
            .expect("client went away")
            .unwrap();
        match message {
            Message::Ping(_) | Message::Pong(_) => continue,
            other => return other,
        }
    }
}

#[tokio::test]
async fn test_connect_sends_headers_and_initial_ping() {
    let (url, server) = mock_server().await;

    let connection = WebSocketConnector::default()
        .connect(&url, &auth_headers())
        .await
        .unwrap();
    let (mut ws, seen) = server.await.unwrap();

    assert_eq!(seen.uri, "/v1/realtime");
    assert_eq!(seen.authorization.as_deref(), Some("Bearer sk-test"));
    assert_eq!(seen.beta.as_deref(), Some("realtime=v1"));

    let first = tokio::time::timeout(STEP, ws.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(matches!(first, Message::Ping(_)));
    assert!(!connection.sender.is_closed());
}

#[tokio::test]
async fn test_text_round_trip_and_normal_close() {
    let (url, server) = mock_server().await;

    let mut connection = WebSocketConnector::default()
        .connect(&url, &auth_headers())
        .await
        .unwrap();
    let (mut ws, _) = server.await.unwrap();

    // Server -> client
    let created = json!({"type": "session.created", "session": {"id": "sess_ws"}}).to_string();
    ws.send(Message::Text(created.clone().into())).await.unwrap();
    let received = tokio::time::timeout(STEP, connection.inbound.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received, created);

    // Client -> server
    connection
        .sender
        .send_text(r#"{"type":"response.create"}"#.to_string())
        .await
        .unwrap();
    match next_data(&mut ws).await {
        Message::Text(text) => assert_eq!(text.as_str(), r#"{"type":"response.create"}"#),
        other => panic!("Expected text frame, got {:?}", other),
    }

    // Normal closure
    connection.sender.close().await.unwrap();
    match next_data(&mut ws).await {
        Message::Close(Some(frame)) => assert_eq!(frame.code, CloseCode::Normal),
        other => panic!("Expected close frame, got {:?}", other),
    }
}

#[tokio::test]
async fn test_server_ping_answered() {
    let (url, server) = mock_server().await;

    let _connection = WebSocketConnector::default()
        .connect(&url, &auth_headers())
        .await
        .unwrap();
    let (mut ws, _) = server.await.unwrap();

    ws.send(Message::Ping(b"keepalive".to_vec().into()))
        .await
        .unwrap();

    let pong = tokio::time::timeout(STEP, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Pong(data))) => return data,
                Some(Ok(_)) => continue,
                other => panic!("Unexpected frame: {:?}", other),
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(&pong[..], b"keepalive");
}

#[tokio::test]
async fn test_server_close_ends_inbound() {
    let (url, server) = mock_server().await;

    let mut connection = WebSocketConnector::default()
        .connect(&url, &auth_headers())
        .await
        .unwrap();
    let (mut ws, _) = server.await.unwrap();

    ws.close(None).await.unwrap();

    let next = tokio::time::timeout(STEP, connection.inbound.recv())
        .await
        .unwrap();
    assert!(next.is_none());
}

#[tokio::test]
async fn test_dial_timeout() {
    // Accepts TCP but never answers the upgrade
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let _hold = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        drop(stream);
    });

    let url = Url::parse(&format!("ws://{}/v1/realtime", addr)).unwrap();
    let result = WebSocketConnector::new(Duration::from_millis(100))
        .connect(&url, &HeaderMap::new())
        .await;

    match result {
        Err(RealtimeError::Transport(message)) => {
            assert!(message.contains("dial timed out"), "{}", message)
        }
        other => panic!("Expected Transport error, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn test_connection_refused() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let url = Url::parse(&format!("ws://{}/v1/realtime", addr)).unwrap();
    let result = WebSocketConnector::default()
        .connect(&url, &HeaderMap::new())
        .await;
    assert!(matches!(result, Err(RealtimeError::Transport(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_session_over_websocket() {
    let (url, server) = mock_server().await;
    let config = ClientConfig {
        api_key: "sk-test".to_string(),
        url: url.to_string(),
        model: "gpt-4o-mini-realtime-preview".to_string(),
        ..Default::default()
    };
    let session = RealtimeSession::new(config).unwrap();

    let service = async {
        let (mut ws, seen) = server.await.unwrap();
        ws.send(Message::Text(
            json!({"type": "session.created", "session": {"id": "sess_ws"}})
                .to_string()
                .into(),
        ))
        .await
        .unwrap();

        let update = match next_data(&mut ws).await {
            Message::Text(text) => serde_json::from_str::<serde_json::Value>(text.as_str()).unwrap(),
            other => panic!("Expected session.update, got {:?}", other),
        };
        ws.send(Message::Text(
            json!({"type": "session.updated", "session": {"id": "sess_ws"}})
                .to_string()
                .into(),
        ))
        .await
        .unwrap();
        (ws, seen, update)
    };

    let (result, (mut ws, seen, update)) =
        tokio::join!(session.open(CancellationToken::new()), service);
    result.unwrap();

    assert_eq!(session.state(), SessionState::Active);
    assert_eq!(session.session_id().as_deref(), Some("sess_ws"));
    assert_eq!(seen.uri, "/v1/realtime?model=gpt-4o-mini-realtime-preview");
    assert_eq!(update["type"], "session.update");

    session.close().await.unwrap();
    let closed = tokio::time::timeout(STEP, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Close(frame))) => return frame,
                Some(Ok(_)) => continue,
                other => panic!("Unexpected frame: {:?}", other),
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(closed.map(|f| f.code), Some(CloseCode::Normal));
}

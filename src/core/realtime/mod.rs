//! Realtime voice session module.
//!
//! Bidirectional voice conversation with the OpenAI Realtime API over a
//! WebSocket: session negotiation, agent audio playback with barge-in, user
//! audio capture and function calling.
//!
//! # Architecture
//!
//! - [`RealtimeSession`] drives the session state machine and owns the audio
//!   buffers
//! - [`Connector`] abstracts the message transport
//! - [`Dispatcher`] runs application handlers off the receive loop
//! - [`ClientEvent`] / [`ServerEvent`] are the wire events
//!
//! # Audio Format
//!
//! The service speaks PCM 16-bit signed little-endian mono at 24kHz. The
//! session converts to and from the configured device rate.
//!
//! # Example
//!
//! ```rust,ignore
//! use waav_realtime::config::ClientConfig;
//! use waav_realtime::core::realtime::RealtimeSession;
//! use futures_util::FutureExt;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let session = RealtimeSession::new(ClientConfig::from_env().unwrap()).unwrap();
//!
//!     session.on_event(Arc::new(|event| async move {
//!         println!("{}", event.kind());
//!     }.boxed()));
//!
//!     session.open(CancellationToken::new()).await.unwrap();
//!     session.send_user_text("Hi there", true).await.unwrap();
//! }
//! ```

mod base;
pub mod dispatch;
pub mod messages;
mod session;
pub mod transport;

pub use base::{
    ErrorCallback, EventCallback, RealtimeError, RealtimeResult, SessionState, Tool, ToolCall,
    ToolCallCallback, ToolChoice, ToolError, ToolParameters, ToolProperty, ToolResult,
    tool_output,
};
pub use dispatch::{Dispatcher, Handlers};
pub use messages::{
    ApiError, ClientEvent, ConversationItem, OutboundEvent, ResponseConfig, ServerEvent,
    SessionUpdate, TurnDetection,
};
pub use session::{RealtimeSession, SERVICE_SAMPLE_RATE};
pub use transport::{
    Connection, Connector, TransportMessage, TransportSender, WebSocketConnector,
};

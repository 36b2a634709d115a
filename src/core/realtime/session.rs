//! Realtime session controller.
//!
//! [`RealtimeSession`] owns the connection to the service and the two audio
//! buffers of [`AudioIo`]. Once [`open`](RealtimeSession::open) returns, the
//! session runs these tasks:
//!
//! - receive loop: decodes inbound messages, drives the state machine, writes
//!   agent audio into the playback buffer and queues events for the dispatcher
//! - dispatcher worker: runs the application's event and error handlers
//! - tool worker: invokes the tool handler and sends results back
//! - audio send loop (blocking thread): reads fixed frames from the capture
//!   buffer and sends them as `input_audio_buffer.append`
//!
//! ```text
//! Uninitialized ─connect─► AwaitingCreation ─session.created─► Negotiating
//!                                                                   │
//!                         Closed ◄─close/error─ Active ◄─session.updated
//! ```

use std::sync::Arc;

use http::{HeaderMap, HeaderValue};
use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span};
use url::Url;

use super::base::{
    ErrorCallback, EventCallback, RealtimeError, RealtimeResult, SessionState, ToolCall,
    ToolCallCallback, ToolChoice, ToolError, ToolResult, tool_output,
};
use super::dispatch::{Dispatcher, Handlers, decode};
use super::messages::{
    AUDIO_FORMAT_PCM16, ClientEvent, ConversationItem, OutboundEvent, Response, ResponseConfig,
    ServerEvent, Session, SessionUpdate, TurnDetection,
};
use super::transport::{Connection, Connector, TransportSender, WebSocketConnector};
use crate::config::ClientConfig;
use crate::core::audio::{
    AudioIo, AudioRead, BlockingBuffer, CaptureWriter, FixedFrameReader, PlaybackReader,
};

/// Fixed sample rate of the service's audio, in Hz.
pub const SERVICE_SAMPLE_RATE: u32 = 24000;

/// Function calls waiting for the tool handler.
const TOOL_QUEUE_CAPACITY: usize = 64;

/// Work item for the tool worker.
enum ToolJob {
    Invoke(ToolCall),
    /// Arguments could not be decoded; report the error back to the agent
    Reject { call_id: String, error: ToolError },
}

/// Live voice session with the realtime service.
///
/// # Example
/// ```rust,no_run
/// use waav_realtime::config::ClientConfig;
/// use waav_realtime::core::realtime::RealtimeSession;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let session = RealtimeSession::new(ClientConfig::from_env()?)?;
/// session.open(CancellationToken::new()).await?;
///
/// let (playback, capture) = session.audio_endpoints()?;
/// // hand `playback` to the speaker thread and `capture` to the microphone thread
/// session.send_user_text("Hello!", true).await?;
/// # Ok(())
/// # }
/// ```
pub struct RealtimeSession {
    connector: Arc<dyn Connector>,
    inner: Arc<SessionInner>,
    span: Span,
}

struct SessionInner {
    config: ClientConfig,
    audio: AudioIo,
    state: watch::Sender<SessionState>,
    session_id: RwLock<Option<String>>,
    sender: RwLock<Option<TransportSender>>,
    handlers: Arc<Handlers>,
    /// Single-slot `session.updated` signal
    ack_tx: mpsc::Sender<()>,
    /// Locked for the whole of a negotiation
    ack_rx: tokio::sync::Mutex<mpsc::Receiver<()>>,
    cancel: RwLock<CancellationToken>,
    ready: Mutex<Option<oneshot::Sender<RealtimeResult<()>>>>,
}

impl RealtimeSession {
    /// Create a session that connects over WebSocket.
    pub fn new(config: ClientConfig) -> RealtimeResult<Self> {
        let connector = Arc::new(WebSocketConnector::new(config.dial_timeout));
        Self::with_connector(config, connector)
    }

    /// Create a session on a custom transport.
    pub fn with_connector(
        config: ClientConfig,
        connector: Arc<dyn Connector>,
    ) -> RealtimeResult<Self> {
        config
            .validate()
            .map_err(|e| RealtimeError::InvalidConfiguration(e.to_string()))?;

        let audio = AudioIo::new(SERVICE_SAMPLE_RATE, config.sample_rate, config.latency)?;
        let (state, _) = watch::channel(SessionState::Uninitialized);
        let (ack_tx, ack_rx) = mpsc::channel(1);

        Ok(Self {
            connector,
            inner: Arc::new(SessionInner {
                config,
                audio,
                state,
                session_id: RwLock::new(None),
                sender: RwLock::new(None),
                handlers: Arc::new(Handlers::default()),
                ack_tx,
                ack_rx: tokio::sync::Mutex::new(ack_rx),
                cancel: RwLock::new(CancellationToken::new()),
                ready: Mutex::new(None),
            }),
            span: tracing::info_span!("realtime_session", session_id = tracing::field::Empty),
        })
    }

    /// Attach all session logging to `span` instead of the default one.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Connect, wait for the service to create the session and negotiate the
    /// configuration.
    ///
    /// Returns once the session is [`SessionState::Active`]. Cancelling
    /// `cancel` at any point tears the session down.
    pub async fn open(&self, cancel: CancellationToken) -> RealtimeResult<()> {
        let state = self.state();
        if state != SessionState::Uninitialized {
            return Err(RealtimeError::InvalidConfiguration(format!(
                "session cannot be opened in state {}",
                state
            )));
        }

        let url = connect_url(&self.inner.config)?;
        let headers = connect_headers(&self.inner.config)?;

        let connection = tokio::select! {
            _ = cancel.cancelled() => return Err(RealtimeError::Cancelled),
            connection = self.connector.connect(&url, &headers).instrument(self.span.clone()) => {
                connection?
            }
        };

        let ready = self
            .inner
            .start(connection, cancel.child_token(), self.span.clone())?;

        let result = tokio::select! {
            _ = cancel.cancelled() => Err(RealtimeError::Cancelled),
            result = self.inner.wait_until_active(ready) => result,
        };

        if let Err(e) = &result {
            self.span.in_scope(|| tracing::error!("Failed to open session: {}", e));
            self.inner.close_transport().await;
            self.inner.shutdown();
        }
        result
    }

    /// Application audio endpoints: agent audio to play and a writer for
    /// captured microphone audio, both at the configured device rate.
    pub fn audio_endpoints(&self) -> RealtimeResult<(PlaybackReader, CaptureWriter)> {
        Ok(self.inner.audio.endpoints()?)
    }

    pub fn audio(&self) -> &AudioIo {
        &self.inner.audio
    }

    /// Drop agent audio that has not been played yet.
    pub fn clear_output_buffer(&self) {
        self.inner.audio.clear_output_buffer();
    }

    /// Add a user text message to the conversation, optionally asking for a
    /// response right away.
    pub async fn send_user_text(&self, text: &str, respond: bool) -> RealtimeResult<()> {
        let id = uuid::Uuid::new_v4().simple().to_string();
        self.inner
            .send(ClientEvent::ConversationItemCreate {
                item: ConversationItem::user_text(id, text),
                previous_item_id: None,
            })
            .await?;

        if respond {
            self.create_response().await?;
        }
        Ok(())
    }

    /// Ask the agent to respond with the session defaults.
    pub async fn create_response(&self) -> RealtimeResult<()> {
        self.create_response_with(ResponseConfig::default()).await
    }

    /// Ask the agent to respond with per-response overrides.
    pub async fn create_response_with(&self, response: ResponseConfig) -> RealtimeResult<()> {
        self.inner.send(ClientEvent::ResponseCreate { response }).await
    }

    /// Send an arbitrary client event.
    pub async fn send(&self, event: ClientEvent) -> RealtimeResult<()> {
        self.inner.send(event).await
    }

    /// Send a `session.update` and wait for the service to acknowledge it.
    pub async fn update_session(&self, update: SessionUpdate) -> RealtimeResult<()> {
        self.inner.update_session(update).await
    }

    /// Register the handler for server events. Audio deltas and errors are
    /// not passed to it.
    pub fn on_event(&self, callback: EventCallback) {
        self.inner.handlers.set_event(callback);
    }

    /// Register the handler for errors reported by the service.
    pub fn on_error(&self, callback: ErrorCallback) {
        self.inner.handlers.set_error(callback);
    }

    /// Register the handler for completed function calls. Without one, calls
    /// requested by the agent are skipped.
    pub fn on_tool_call(&self, callback: ToolCallCallback) {
        self.inner.handlers.set_tool(callback);
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.borrow()
    }

    /// Watch state transitions, e.g. to wait for the session to close.
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    /// Identifier assigned by the service in `session.created`.
    pub fn session_id(&self) -> Option<String> {
        self.inner.session_id.read().clone()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Close the connection with a normal closure and stop all session tasks.
    /// Blocked audio readers drain what is buffered and then see end-of-stream.
    pub async fn close(&self) -> RealtimeResult<()> {
        self.inner.close_transport().await;
        self.inner.shutdown();
        Ok(())
    }
}

impl Drop for RealtimeSession {
    fn drop(&mut self) {
        self.inner.shutdown();
    }
}

// =============================================================================
// Session internals
// =============================================================================

impl SessionInner {
    fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    fn cancel_token(&self) -> CancellationToken {
        self.cancel.read().clone()
    }

    /// Install the connection and spawn the session tasks.
    fn start(
        self: &Arc<Self>,
        connection: Connection,
        cancel: CancellationToken,
        span: Span,
    ) -> RealtimeResult<oneshot::Receiver<RealtimeResult<()>>> {
        let frames = self.audio.capture_frames()?;

        let (ready_tx, ready_rx) = oneshot::channel();
        *self.ready.lock() = Some(ready_tx);
        *self.cancel.write() = cancel.clone();
        *self.sender.write() = Some(connection.sender);
        self.state.send_replace(SessionState::AwaitingCreation);

        let (dispatcher, _) = Dispatcher::spawn(self.handlers.clone(), cancel.clone(), span.clone());
        let (tool_tx, tool_rx) = mpsc::channel(TOOL_QUEUE_CAPACITY);

        tokio::spawn(
            self.clone()
                .tool_loop(tool_rx, cancel.clone())
                .instrument(span.clone()),
        );
        tokio::spawn(
            self.clone()
                .receive_loop(connection.inbound, dispatcher, tool_tx, cancel)
                .instrument(span.clone()),
        );

        let inner = self.clone();
        let runtime = Handle::current();
        tokio::task::spawn_blocking(move || {
            let _entered = span.enter();
            inner.audio_send_loop(frames, runtime);
        });

        Ok(ready_rx)
    }

    async fn wait_until_active(
        &self,
        ready: oneshot::Receiver<RealtimeResult<()>>,
    ) -> RealtimeResult<()> {
        let timeout = self.config.negotiation_timeout;
        let mut state = self.state.subscribe();

        let created = tokio::time::timeout(
            timeout,
            state.wait_for(|s| *s != SessionState::AwaitingCreation),
        )
        .await
        .map(|changed| changed.map(|s| *s));

        match created {
            Err(_) => return Err(RealtimeError::NegotiationTimeout(timeout)),
            Ok(Err(_)) => return Err(RealtimeError::NotConnected),
            Ok(Ok(SessionState::Closed)) => {
                return Err(RealtimeError::Transport(
                    "connection closed before the session was created".to_string(),
                ));
            }
            Ok(Ok(_)) => {}
        }

        tokio::select! {
            result = ready => result.unwrap_or(Err(RealtimeError::NotConnected)),
            _ = state.wait_for(|s| *s == SessionState::Closed) => Err(RealtimeError::Transport(
                "connection closed during negotiation".to_string(),
            )),
        }
    }

    async fn receive_loop(
        self: Arc<Self>,
        mut inbound: mpsc::Receiver<String>,
        dispatcher: Dispatcher,
        tools: mpsc::Sender<ToolJob>,
        cancel: CancellationToken,
    ) {
        loop {
            let raw = tokio::select! {
                _ = cancel.cancelled() => break,
                raw = inbound.recv() => raw,
            };
            match raw {
                Some(raw) => self.handle_message(&raw, &dispatcher, &tools),
                None => {
                    tracing::info!("Transport closed");
                    break;
                }
            }
        }
        self.shutdown();
    }

    fn handle_message(
        self: &Arc<Self>,
        raw: &str,
        dispatcher: &Dispatcher,
        tools: &mpsc::Sender<ToolJob>,
    ) {
        let event = match decode(raw) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!("Failed to parse server event: {} - {}", e, raw);
                return;
            }
        };

        let state = self.state();
        match &event {
            ServerEvent::SessionCreated { session } => self.on_session_created(session, state),
            ServerEvent::SessionUpdated { .. } => {
                // Active before the next message is handled
                self.activate();
                // Already signalled if the slot is full
                let _ = self.ack_tx.try_send(());
            }
            ServerEvent::Error { error } => {
                dispatcher.dispatch_error(error.clone());
                return;
            }
            ServerEvent::SpeechStarted { .. } => {
                if state == SessionState::Active {
                    self.audio.clear_output_buffer();
                    tracing::debug!("User started speaking, playback cleared");
                }
            }
            ServerEvent::AudioDelta { delta, .. } => {
                self.write_audio_delta(delta, state);
                return;
            }
            ServerEvent::ResponseDone { response } => self.collect_tool_calls(response, tools),
            ServerEvent::Unknown => return,
            _ => {}
        }

        dispatcher.dispatch_event(event);
    }

    fn on_session_created(self: &Arc<Self>, session: &Session, state: SessionState) {
        if state != SessionState::AwaitingCreation {
            tracing::debug!(%state, "Ignoring session.created");
            return;
        }

        *self.session_id.write() = Some(session.id.clone());
        Span::current().record("session_id", session.id.as_str());
        tracing::info!(session_id = %session.id, "Session created");
        self.state.send_replace(SessionState::Negotiating);

        let inner = self.clone();
        let update = build_session_update(&self.config);
        tokio::spawn(
            async move {
                let result = inner.update_session(update).await;
                if let Some(ready) = inner.ready.lock().take() {
                    let _ = ready.send(result);
                }
            }
            .in_current_span(),
        );
    }

    /// `Negotiating` → `Active`. Any other state is left alone.
    fn activate(&self) {
        let activated = self.state.send_if_modified(|state| {
            if *state == SessionState::Negotiating {
                *state = SessionState::Active;
                true
            } else {
                false
            }
        });
        if activated {
            tracing::info!("Session active");
        }
    }

    fn write_audio_delta(&self, delta: &str, state: SessionState) {
        if state != SessionState::Active {
            tracing::debug!(%state, "Dropping audio delta before session is active");
            return;
        }
        match ServerEvent::decode_audio_delta(delta) {
            Ok(audio) => {
                if let Err(e) = self.audio.write_playback(&audio) {
                    tracing::debug!("Dropping audio delta: {}", e);
                }
            }
            Err(e) => tracing::warn!("Failed to decode audio delta: {}", e),
        }
    }

    fn collect_tool_calls(&self, response: &Response, tools: &mpsc::Sender<ToolJob>) {
        for item in response
            .output
            .iter()
            .filter(|item| item.is_completed_function_call())
        {
            let Some(call_id) = item.call_id.clone() else {
                tracing::warn!("Function call without call_id, skipping");
                continue;
            };
            let name = item.name.clone().unwrap_or_default();

            let job = match parse_arguments(item.arguments.as_deref()) {
                Ok(arguments) => ToolJob::Invoke(ToolCall {
                    call_id,
                    name,
                    arguments,
                }),
                Err(error) => ToolJob::Reject { call_id, error },
            };
            match tools.try_send(job) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!("Tool queue full, dropping function call");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    tracing::debug!("Tool worker stopped, dropping call");
                }
            }
        }
    }

    async fn tool_loop(
        self: Arc<Self>,
        mut jobs: mpsc::Receiver<ToolJob>,
        cancel: CancellationToken,
    ) {
        loop {
            let job = tokio::select! {
                _ = cancel.cancelled() => break,
                job = jobs.recv() => match job {
                    Some(job) => job,
                    None => break,
                },
            };

            let (call_id, result) = match job {
                ToolJob::Invoke(call) => {
                    let Some(handler) = self.handlers.tool() else {
                        tracing::debug!(tool = %call.name, "No tool handler registered, skipping call");
                        continue;
                    };
                    tracing::info!(tool = %call.name, call_id = %call.call_id, "Invoking tool");
                    let call_id = call.call_id.clone();
                    (call_id, handler(call).await)
                }
                ToolJob::Reject { call_id, error } => {
                    tracing::warn!(%call_id, "Rejecting function call: {}", error);
                    (call_id, Err(error))
                }
            };

            if let Err(e) = self.respond_to_tool(call_id, &result).await {
                tracing::warn!("Failed to send tool result: {}", e);
            }
        }
    }

    async fn respond_to_tool(&self, call_id: String, result: &ToolResult) -> RealtimeResult<()> {
        self.send(ClientEvent::ConversationItemCreate {
            item: ConversationItem::function_call_output(call_id, tool_output(result)),
            previous_item_id: None,
        })
        .await?;
        self.send(ClientEvent::ResponseCreate {
            response: ResponseConfig::default(),
        })
        .await
    }

    /// Runs on a blocking thread: capture buffer reads park the thread.
    fn audio_send_loop(&self, mut frames: FixedFrameReader<Arc<BlockingBuffer>>, runtime: Handle) {
        let cancel = self.cancel_token();
        let mut frame = vec![0u8; frames.frame_size()];

        loop {
            let n = match frames.read(&mut frame) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    tracing::warn!("Capture read failed: {}", e);
                    break;
                }
            };
            if cancel.is_cancelled() {
                break;
            }
            if self.state() != SessionState::Active {
                tracing::trace!(bytes = n, "Dropping captured audio before session is active");
                continue;
            }
            if let Err(e) = runtime.block_on(self.send(ClientEvent::audio_append(&frame[..n]))) {
                tracing::debug!("Audio send loop stopping: {}", e);
                break;
            }
        }
        tracing::debug!("Audio send loop finished");
    }

    async fn update_session(&self, update: SessionUpdate) -> RealtimeResult<()> {
        let timeout = self.config.negotiation_timeout;
        let mut ack = self.ack_rx.lock().await;
        // Discard an acknowledgment left over from an earlier update
        while ack.try_recv().is_ok() {}

        self.send(ClientEvent::SessionUpdate { session: update })
            .await?;

        let cancel = self.cancel_token();
        tokio::select! {
            _ = cancel.cancelled() => Err(RealtimeError::Cancelled),
            acked = tokio::time::timeout(timeout, ack.recv()) => match acked {
                Ok(Some(())) => {
                    tracing::debug!("Session update acknowledged");
                    Ok(())
                }
                Ok(None) => Err(RealtimeError::NotConnected),
                Err(_) => {
                    tracing::warn!("No session.updated within {:?}", timeout);
                    Err(RealtimeError::NegotiationTimeout(timeout))
                }
            },
        }
    }

    async fn send(&self, event: ClientEvent) -> RealtimeResult<()> {
        let sender = self
            .sender
            .read()
            .clone()
            .ok_or(RealtimeError::NotConnected)?;

        let event_type = event.event_type();
        let json = serde_json::to_string(&OutboundEvent::new(event))?;
        sender.send_text(json).await?;
        tracing::trace!(event_type, "Sent client event");
        Ok(())
    }

    async fn close_transport(&self) {
        let sender = self.sender.read().clone();
        if let Some(sender) = sender {
            let _ = sender.close().await;
        }
    }

    /// Enter `Closed`: stop every task and close both buffers. Idempotent.
    ///
    /// `Closed` is published last, so anyone woken by it finds the buffers
    /// closed and the sender gone.
    fn shutdown(&self) {
        self.audio.close();
        self.cancel_token().cancel();
        self.sender.write().take();
        let previous = self.state.send_replace(SessionState::Closed);
        if previous != SessionState::Closed {
            tracing::info!(%previous, "Session closed");
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// `{url}?model={model}`
fn connect_url(config: &ClientConfig) -> RealtimeResult<Url> {
    let mut url = Url::parse(&config.url)
        .map_err(|e| RealtimeError::InvalidConfiguration(format!("invalid url: {}", e)))?;
    url.query_pairs_mut().append_pair("model", &config.model);
    Ok(url)
}

fn connect_headers(config: &ClientConfig) -> RealtimeResult<HeaderMap> {
    let mut headers = HeaderMap::new();
    let auth = HeaderValue::from_str(&format!("Bearer {}", config.api_key))
        .map_err(|e| RealtimeError::InvalidConfiguration(format!("invalid api key: {}", e)))?;
    headers.insert(http::header::AUTHORIZATION, auth);
    headers.insert("OpenAI-Beta", HeaderValue::from_static("realtime=v1"));
    Ok(headers)
}

/// Configuration sent in the handshake's `session.update`.
fn build_session_update(config: &ClientConfig) -> SessionUpdate {
    let tool_choice = if config.tools.is_empty() {
        ToolChoice::None
    } else {
        ToolChoice::Auto
    };

    SessionUpdate {
        modalities: Some(vec!["text".to_string(), "audio".to_string()]),
        instructions: Some(config.instructions.clone()),
        voice: Some(config.voice.clone()),
        input_audio_format: Some(AUDIO_FORMAT_PCM16.to_string()),
        output_audio_format: Some(AUDIO_FORMAT_PCM16.to_string()),
        turn_detection: Some(TurnDetection::default()),
        tools: Some(config.tools.clone()),
        tool_choice: Some(tool_choice),
        temperature: Some(config.temperature),
        speed: Some(config.speed),
        max_response_output_tokens: None,
    }
}

/// Decode function call arguments into a JSON object. Absent or blank
/// arguments mean no arguments.
fn parse_arguments(
    raw: Option<&str>,
) -> Result<serde_json::Map<String, serde_json::Value>, ToolError> {
    let raw = raw.map(str::trim).unwrap_or_default();
    if raw.is_empty() {
        return Ok(serde_json::Map::new());
    }
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        Ok(other) => Err(ToolError::InvalidArguments(format!(
            "expected a JSON object, got {}",
            other
        ))),
        Err(e) => Err(ToolError::InvalidArguments(e.to_string())),
    }
}

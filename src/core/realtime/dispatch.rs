//! Event dispatch to application handlers.
//!
//! The receive loop decodes each inbound message once and hands the typed
//! event to a [`Dispatcher`]. Handlers run on the dispatcher's worker task, in
//! arrival order, so slow handler code never stalls the receive loop.
//!
//! The queue is bounded. When handlers fall that far behind, new items are
//! dropped with a warning instead of growing the queue.

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::base::{ErrorCallback, EventCallback, RealtimeError, RealtimeResult, ToolCallCallback};
use super::messages::{ApiError, ServerEvent};

/// Events and errors waiting for their handler.
pub const DISPATCH_CHANNEL_CAPACITY: usize = 256;

/// Decode a raw inbound payload.
pub fn decode(raw: &str) -> RealtimeResult<ServerEvent> {
    ServerEvent::parse(raw).map_err(|e| RealtimeError::ProtocolDecode(e.to_string()))
}

/// Handlers registered by the application.
#[derive(Default)]
pub struct Handlers {
    event: RwLock<Option<EventCallback>>,
    error: RwLock<Option<ErrorCallback>>,
    tool: RwLock<Option<ToolCallCallback>>,
}

impl Handlers {
    pub fn set_event(&self, callback: EventCallback) {
        *self.event.write() = Some(callback);
    }

    pub fn set_error(&self, callback: ErrorCallback) {
        *self.error.write() = Some(callback);
    }

    pub fn set_tool(&self, callback: ToolCallCallback) {
        *self.tool.write() = Some(callback);
    }

    pub fn event(&self) -> Option<EventCallback> {
        self.event.read().clone()
    }

    pub fn error(&self) -> Option<ErrorCallback> {
        self.error.read().clone()
    }

    pub fn tool(&self) -> Option<ToolCallCallback> {
        self.tool.read().clone()
    }
}

enum Dispatch {
    Event(ServerEvent),
    Error(ApiError),
}

/// Queue feeding the handler worker.
#[derive(Clone)]
pub struct Dispatcher {
    tx: mpsc::Sender<Dispatch>,
}

impl Dispatcher {
    /// Start the worker. It runs until `cancel` fires or every dispatcher
    /// clone is dropped.
    pub fn spawn(
        handlers: std::sync::Arc<Handlers>,
        cancel: CancellationToken,
        span: tracing::Span,
    ) -> (Self, JoinHandle<()>) {
        Self::with_capacity(handlers, cancel, span, DISPATCH_CHANNEL_CAPACITY)
    }

    /// [`spawn`](Self::spawn) with a custom queue length.
    pub fn with_capacity(
        handlers: std::sync::Arc<Handlers>,
        cancel: CancellationToken,
        span: tracing::Span,
        capacity: usize,
    ) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<Dispatch>(capacity);

        let worker = async move {
            loop {
                let next = tokio::select! {
                    _ = cancel.cancelled() => break,
                    next = rx.recv() => next,
                };
                match next {
                    Some(Dispatch::Event(event)) => {
                        if let Some(callback) = handlers.event() {
                            callback(event).await;
                        }
                    }
                    Some(Dispatch::Error(error)) => match handlers.error() {
                        Some(callback) => callback(error).await,
                        None => tracing::warn!(
                            code = error.code.as_deref().unwrap_or_default(),
                            "Realtime API error: {}",
                            error.message
                        ),
                    },
                    None => break,
                }
            }
            tracing::debug!("Dispatcher stopped");
        };

        (Self { tx }, tokio::spawn(worker.instrument(span)))
    }

    /// Queue an event for the event handler. Never blocks.
    pub fn dispatch_event(&self, event: ServerEvent) {
        self.enqueue(Dispatch::Event(event));
    }

    /// Queue a service error for the error handler. Never blocks.
    pub fn dispatch_error(&self, error: ApiError) {
        self.enqueue(Dispatch::Error(error));
    }

    fn enqueue(&self, item: Dispatch) {
        match self.tx.try_send(item) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(Dispatch::Event(event))) => {
                tracing::warn!(event_type = event.kind(), "Handler queue full, dropping event");
            }
            Err(mpsc::error::TrySendError::Full(Dispatch::Error(error))) => {
                tracing::warn!(
                    code = error.code.as_deref().unwrap_or_default(),
                    "Handler queue full, dropping error: {}",
                    error.message
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!("Dispatcher closed, dropping item");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::FutureExt;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_decode() {
        assert!(matches!(
            decode(r#"{"type":"input_audio_buffer.speech_stopped"}"#),
            Ok(ServerEvent::SpeechStopped { .. })
        ));
        assert!(matches!(decode("{"), Err(RealtimeError::ProtocolDecode(_))));
    }

    #[tokio::test]
    async fn test_handlers_run_in_order() {
        let handlers = Arc::new(Handlers::default());
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel::<String>();

        let events_tx = seen_tx.clone();
        handlers.set_event(Arc::new(move |event: ServerEvent| {
            let tx = events_tx.clone();
            async move {
                // A slow handler still sees events in order
                tokio::time::sleep(Duration::from_millis(5)).await;
                let _ = tx.send(event.kind().to_string());
            }
            .boxed()
        }));
        handlers.set_error(Arc::new(move |error: ApiError| {
            let tx = seen_tx.clone();
            async move {
                let _ = tx.send(format!("error:{}", error.message));
            }
            .boxed()
        }));

        let cancel = CancellationToken::new();
        let (dispatcher, worker) =
            Dispatcher::spawn(handlers, cancel.clone(), tracing::Span::none());

        dispatcher.dispatch_event(decode(r#"{"type":"input_audio_buffer.speech_started"}"#).unwrap());
        dispatcher.dispatch_error(ApiError {
            error_type: "server_error".to_string(),
            code: None,
            message: "boom".to_string(),
            param: None,
            event_id: None,
        });
        dispatcher.dispatch_event(decode(r#"{"type":"input_audio_buffer.speech_stopped"}"#).unwrap());

        assert_eq!(
            seen_rx.recv().await.unwrap(),
            "input_audio_buffer.speech_started"
        );
        assert_eq!(seen_rx.recv().await.unwrap(), "error:boom");
        assert_eq!(
            seen_rx.recv().await.unwrap(),
            "input_audio_buffer.speech_stopped"
        );

        cancel.cancel();
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn test_stalled_handler_drops_overflow() {
        let handlers = Arc::new(Handlers::default());
        let gate = Arc::new(tokio::sync::Semaphore::new(0));
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel::<String>();

        let handler_gate = gate.clone();
        handlers.set_event(Arc::new(move |event: ServerEvent| {
            let gate = handler_gate.clone();
            let tx = seen_tx.clone();
            async move {
                let _permit = gate.acquire().await;
                let _ = tx.send(event.kind().to_string());
            }
            .boxed()
        }));

        let cancel = CancellationToken::new();
        let (dispatcher, worker) =
            Dispatcher::with_capacity(handlers, cancel.clone(), tracing::Span::none(), 2);

        // First event is taken by the stalled handler, two fill the queue
        dispatcher.dispatch_event(decode(r#"{"type":"input_audio_buffer.speech_started"}"#).unwrap());
        tokio::time::sleep(Duration::from_millis(20)).await;
        for _ in 0..2 {
            dispatcher.dispatch_event(decode(r#"{"type":"input_audio_buffer.committed","item_id":"item_1"}"#).unwrap());
        }
        // Returns immediately even though nothing is draining the queue
        tokio::time::timeout(Duration::from_millis(100), async {
            for _ in 0..10 {
                dispatcher.dispatch_event(decode(r#"{"type":"input_audio_buffer.speech_stopped"}"#).unwrap());
            }
        })
        .await
        .unwrap();

        gate.add_permits(16);
        assert_eq!(
            seen_rx.recv().await.unwrap(),
            "input_audio_buffer.speech_started"
        );
        for _ in 0..2 {
            assert_eq!(
                seen_rx.recv().await.unwrap(),
                "input_audio_buffer.committed"
            );
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(seen_rx.try_recv().is_err());

        cancel.cancel();
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn test_worker_stops_when_dispatchers_dropped() {
        let (dispatcher, worker) = Dispatcher::spawn(
            Arc::new(Handlers::default()),
            CancellationToken::new(),
            tracing::Span::none(),
        );
        // No handlers registered: events are dropped quietly
        dispatcher.dispatch_event(ServerEvent::Unknown);
        drop(dispatcher);
        tokio::time::timeout(Duration::from_secs(1), worker)
            .await
            .unwrap()
            .unwrap();
    }
}

//! Cancellable, backpressured streaming of dispatch output.
//!
//! A stream is a bounded single-producer, single-consumer channel. The
//! receiver yields `Start` first, then chunks, then exactly one terminal
//! event. Cancellation is cooperative: it ends the stream for the consumer
//! without aborting the in-flight call.

use futures::stream::{self, Stream};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::errors::StreamError;
use crate::domain::models::{DispatchRequest, DispatchResult, StreamChunk, StreamEvent};
use crate::services::dispatcher::TransportDispatcher;

struct Shared {
    stream_id: String,
    terminated: AtomicBool,
    cancel_tx: watch::Sender<bool>,
}

impl Shared {
    /// Claim the single terminal slot.
    fn terminate(&self) -> bool {
        self.terminated
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn cancel(&self) -> bool {
        if self.terminate() {
            self.cancel_tx.send_replace(true);
            debug!(stream_id = %self.stream_id, "Stream cancelled");
            true
        } else {
            false
        }
    }
}

/// Resolves once the stream is cancelled; never resolves otherwise.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|cancelled| *cancelled).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Producer side of a stream.
pub struct StreamSession {
    tx: mpsc::Sender<StreamEvent>,
    cancel_rx: watch::Receiver<bool>,
    shared: Arc<Shared>,
}

impl StreamSession {
    /// Session identifier.
    pub fn stream_id(&self) -> &str {
        &self.shared.stream_id
    }

    /// Whether a terminal event was emitted or the stream was cancelled.
    pub fn is_closed(&self) -> bool {
        self.shared.terminated.load(Ordering::Acquire)
    }

    /// Queue a chunk, waiting while the consumer is behind.
    pub async fn publish_chunk(&self, chunk: StreamChunk) -> Result<(), StreamError> {
        if self.is_closed() {
            return Err(StreamError::Closed);
        }
        let mut cancel_rx = self.cancel_rx.clone();
        tokio::select! {
            biased;
            () = cancelled(&mut cancel_rx) => Err(StreamError::Closed),
            sent = self.tx.send(StreamEvent::Chunk(chunk)) => sent.map_err(|_| StreamError::ConsumerGone),
        }
    }

    /// Finish the stream with the aggregate result.
    pub async fn complete(&self, result: Option<DispatchResult>) -> Result<(), StreamError> {
        self.finish(StreamEvent::Complete {
            result: result.map(Box::new),
            cancelled: false,
        })
        .await
    }

    /// Finish the stream with an error.
    pub async fn error(&self, message: impl Into<String>) -> Result<(), StreamError> {
        self.finish(StreamEvent::Error {
            message: message.into(),
        })
        .await
    }

    async fn finish(&self, event: StreamEvent) -> Result<(), StreamError> {
        if !self.shared.terminate() {
            return Err(StreamError::Closed);
        }
        self.tx
            .send(event)
            .await
            .map_err(|_| StreamError::ConsumerGone)
    }

    /// Idempotent. Returns true when this call ended the stream.
    pub fn cancel(&self) -> bool {
        self.shared.cancel()
    }
}

/// Consumer side of a stream. Consumed once.
pub struct StreamReceiver {
    rx: mpsc::Receiver<StreamEvent>,
    cancel_rx: watch::Receiver<bool>,
    shared: Arc<Shared>,
    started: bool,
    finished: bool,
}

impl StreamReceiver {
    /// Session identifier.
    pub fn stream_id(&self) -> &str {
        &self.shared.stream_id
    }

    /// Idempotent. Returns true when this call ended the stream.
    pub fn cancel(&self) -> bool {
        self.shared.cancel()
    }

    /// Next event, `None` once the terminal event has been returned.
    pub async fn next(&mut self) -> Option<StreamEvent> {
        if self.finished {
            return None;
        }
        if !self.started {
            self.started = true;
            return Some(StreamEvent::Start {
                stream_id: self.shared.stream_id.clone(),
            });
        }

        let event = tokio::select! {
            biased;
            () = cancelled(&mut self.cancel_rx) => Some(StreamEvent::Complete {
                result: None,
                cancelled: true,
            }),
            event = self.rx.recv() => event,
        };

        match event {
            Some(event) => {
                if event.is_terminal() {
                    self.finished = true;
                }
                Some(event)
            }
            None => {
                self.finished = true;
                if self.shared.terminate() {
                    warn!(stream_id = %self.shared.stream_id, "Stream producer dropped without finishing");
                    Some(StreamEvent::Error {
                        message: "stream ended without completion".to_string(),
                    })
                } else {
                    None
                }
            }
        }
    }

    /// Drain every remaining event.
    pub async fn collect(mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.next().await {
            events.push(event);
        }
        events
    }

    /// Adapt into a `futures` stream.
    pub fn into_stream(self) -> impl Stream<Item = StreamEvent> {
        stream::unfold(self, |mut receiver| async move {
            receiver.next().await.map(|event| (event, receiver))
        })
    }
}

/// Opens stream sessions and feeds them from the dispatcher.
pub struct StreamPublisher {
    dispatcher: Arc<TransportDispatcher>,
    capacity: usize,
}

impl StreamPublisher {
    /// Publisher whose sessions buffer `capacity` events.
    pub fn new(dispatcher: Arc<TransportDispatcher>, capacity: usize) -> Self {
        Self {
            dispatcher,
            capacity: capacity.max(1),
        }
    }

    /// Open a stream. A random id is assigned when none is given.
    pub fn start(&self, stream_id: Option<String>) -> (StreamSession, StreamReceiver) {
        open_stream(stream_id, self.capacity)
    }

    /// Run the request in the background and stream its output.
    pub fn stream(&self, request: DispatchRequest) -> StreamReceiver {
        let (session, receiver) = self.start(None);
        let dispatcher = self.dispatcher.clone();
        let capacity = self.capacity;
        tokio::spawn(async move {
            feed_session(dispatcher, request, session, capacity).await;
        });
        receiver
    }
}

/// Connected producer and consumer over a channel of `capacity` events.
pub fn open_stream(stream_id: Option<String>, capacity: usize) -> (StreamSession, StreamReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let shared = Arc::new(Shared {
        stream_id: stream_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
        terminated: AtomicBool::new(false),
        cancel_tx,
    });

    let session = StreamSession {
        tx,
        cancel_rx: cancel_rx.clone(),
        shared: shared.clone(),
    };
    let receiver = StreamReceiver {
        rx,
        cancel_rx,
        shared,
        started: false,
        finished: false,
    };
    (session, receiver)
}

async fn feed_session(
    dispatcher: Arc<TransportDispatcher>,
    request: DispatchRequest,
    session: StreamSession,
    capacity: usize,
) {
    let stream_id = session.stream_id().to_string();
    let outcome = if request.transport_kind().streams_natively() {
        let (partial_tx, mut partial_rx) = mpsc::channel::<String>(capacity);
        let dispatch = dispatcher.dispatch_streaming(request, partial_tx);
        let forward = async {
            while let Some(piece) = partial_rx.recv().await {
                if session.publish_chunk(StreamChunk::partial(piece)).await.is_err() {
                    break;
                }
            }
            // The generation keeps running after a cancel; discard what it sends.
            while partial_rx.recv().await.is_some() {}
        };
        let (outcome, ()) = tokio::join!(dispatch, forward);
        outcome
    } else {
        dispatcher.dispatch(request).await
    };

    let finished = match outcome {
        Ok(result) if result.is_success() => {
            let chunk = StreamChunk::final_chunk(result.content.clone()).with_metadata(json!({
                "provider": result.provider,
                "model": result.model,
            }));
            match session.publish_chunk(chunk).await {
                Ok(()) => session.complete(Some(result)).await,
                Err(e) => Err(e),
            }
        }
        Ok(result) => {
            let message = result
                .error_message
                .unwrap_or_else(|| "dispatch failed".to_string());
            session.error(message).await
        }
        Err(e) => session.error(e.to_string()).await,
    };

    if let Err(e) = finished {
        debug!(stream_id = %stream_id, error = %e, "Stream ended before completion");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::ChunkKind;

    #[tokio::test]
    async fn test_event_order() {
        let (session, receiver) = open_stream(Some("s-1".into()), 8);
        session.publish_chunk(StreamChunk::partial("a")).await.unwrap();
        session.publish_chunk(StreamChunk::final_chunk("a")).await.unwrap();
        session.complete(None).await.unwrap();

        let names: Vec<_> = receiver.collect().await.iter().map(StreamEvent::name).collect();
        assert_eq!(names, vec!["start", "chunk", "chunk", "complete"]);
    }

    #[tokio::test]
    async fn test_publish_after_terminal_is_closed() {
        let (session, _receiver) = open_stream(None, 8);
        session.error("boom").await.unwrap();

        assert_eq!(session.publish_chunk(StreamChunk::partial("x")).await, Err(StreamError::Closed));
        assert_eq!(session.complete(None).await, Err(StreamError::Closed));
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent_and_terminal() {
        let (session, mut receiver) = open_stream(None, 8);
        session.publish_chunk(StreamChunk::partial("queued")).await.unwrap();

        assert!(receiver.cancel());
        assert!(!session.cancel());
        assert!(!receiver.cancel());

        assert!(matches!(receiver.next().await, Some(StreamEvent::Start { .. })));
        assert_eq!(
            receiver.next().await,
            Some(StreamEvent::Complete { result: None, cancelled: true })
        );
        assert_eq!(receiver.next().await, None);
        assert_eq!(session.publish_chunk(StreamChunk::partial("late")).await, Err(StreamError::Closed));
    }

    #[tokio::test]
    async fn test_cancel_unblocks_full_queue() {
        let (session, receiver) = open_stream(None, 1);
        session.publish_chunk(StreamChunk::partial("1")).await.unwrap();

        let producer = tokio::spawn(async move {
            session.publish_chunk(StreamChunk::partial("2")).await
        });
        tokio::task::yield_now().await;
        receiver.cancel();

        assert_eq!(producer.await.unwrap(), Err(StreamError::Closed));
    }

    #[test]
    fn test_publish_waits_while_queue_is_full() {
        use tokio_test::{assert_pending, assert_ready, assert_ready_eq, task};

        let (session, mut receiver) = open_stream(None, 1);
        assert_ready_eq!(
            task::spawn(session.publish_chunk(StreamChunk::partial("1"))).poll(),
            Ok(())
        );
        let mut second = task::spawn(session.publish_chunk(StreamChunk::partial("2")));
        assert_pending!(second.poll());

        let start = assert_ready!(task::spawn(receiver.next()).poll());
        assert!(matches!(start, Some(StreamEvent::Start { .. })));
        let first = assert_ready!(task::spawn(receiver.next()).poll());
        assert_eq!(first, Some(StreamEvent::Chunk(StreamChunk::partial("1"))));

        assert!(second.is_woken());
        assert_ready_eq!(second.poll(), Ok(()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_mid_generation_records_success() {
        use crate::adapters::generation::MockGenerator;
        use crate::adapters::http::ReqwestHttpClient;
        use crate::domain::models::{AgentDefinition, AgentRecord, DispatcherConfig};
        use crate::services::metrics::MetricsRecorder;
        use crate::services::redaction::RedactionPipeline;
        use std::time::Duration;

        let metrics = Arc::new(MetricsRecorder::new(8));
        let dispatcher = Arc::new(TransportDispatcher::new(
            Arc::new(ReqwestHttpClient::new().unwrap()),
            Arc::new(MockGenerator::new().with_chunks(vec!["a", "b", "c", "d", "e", "f"])),
            RedactionPipeline::builtin_only(),
            metrics.clone(),
            DispatcherConfig::default(),
        ));
        let agent = Arc::new(AgentDefinition::try_from(&AgentRecord::new("writer", "context")).unwrap());

        let mut receiver = StreamPublisher::new(dispatcher, 1).stream(DispatchRequest::new(agent, "hi"));
        assert!(matches!(receiver.next().await, Some(StreamEvent::Start { .. })));
        assert!(receiver.cancel());
        assert_eq!(
            receiver.next().await,
            Some(StreamEvent::Complete { result: None, cancelled: true })
        );

        tokio::time::sleep(Duration::from_secs(1)).await;
        let snapshots = metrics.snapshots().await;
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].count, 1);
        assert_eq!(snapshots[0].successes, 1);
    }

    #[tokio::test]
    async fn test_consumer_gone() {
        let (session, receiver) = open_stream(None, 4);
        drop(receiver);
        assert_eq!(
            session.publish_chunk(StreamChunk::partial("x")).await,
            Err(StreamError::ConsumerGone)
        );
    }

    #[tokio::test]
    async fn test_dropped_producer_yields_single_error() {
        let (session, receiver) = open_stream(None, 4);
        session.publish_chunk(StreamChunk::progress("working")).await.unwrap();
        drop(session);

        let events = receiver.collect().await;
        assert_eq!(events.len(), 3);
        assert!(matches!(&events[1], StreamEvent::Chunk(c) if c.kind == ChunkKind::Progress));
        assert!(matches!(&events[2], StreamEvent::Error { .. }));
    }
}

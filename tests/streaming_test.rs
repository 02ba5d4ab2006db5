//! Streaming invocations: event order, terminal events and cancellation.

mod common;

use common::{api_agent, Harness};
use serde_json::json;
use std::sync::Arc;

use agentry::adapters::generation::MockGenerator;
use agentry::adapters::http::ReqwestHttpClient;
use agentry::domain::models::{AgentRecord, ChunkKind, StreamChunk, StreamEvent};
use agentry::domain::StreamError;
use agentry::services::{open_stream, Invocation};

fn names(events: &[StreamEvent]) -> Vec<&'static str> {
    events.iter().map(StreamEvent::name).collect()
}

#[tokio::test]
async fn test_llm_stream_yields_partials_then_final() {
    let harness = Harness::new().await;
    harness
        .active(AgentRecord::new("helper", "context").with_organization("acme"))
        .await;
    let runtime = harness.runtime(
        Arc::new(ReqwestHttpClient::new().unwrap()),
        Arc::new(MockGenerator::new().with_chunks(vec!["Hel", "lo"])),
    );

    let receiver = runtime
        .invoke_streaming(Invocation::new("helper", "greet me").with_organization("acme"))
        .await
        .unwrap();
    let events = receiver.collect().await;

    assert_eq!(names(&events), vec!["start", "chunk", "chunk", "chunk", "complete"]);
    let kinds: Vec<ChunkKind> = events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::Chunk(c) => Some(c.kind),
            _ => None,
        })
        .collect();
    assert_eq!(kinds, vec![ChunkKind::Partial, ChunkKind::Partial, ChunkKind::Final]);

    match events.last().unwrap() {
        StreamEvent::Complete { result, cancelled } => {
            assert!(!cancelled);
            assert_eq!(result.as_ref().unwrap().content, "Hello");
        }
        other => panic!("unexpected terminal event {other:?}"),
    }
}

#[tokio::test]
async fn test_api_stream_has_single_final_chunk() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/run")
        .with_status(200)
        .with_body(r#"{"answer": "42"}"#)
        .create_async()
        .await;

    let harness = Harness::new().await;
    harness
        .active(api_agent(
            "oracle",
            "acme",
            json!({
                "url": format!("{}/run", server.url()),
                "responseTransform": {"field": "answer"}
            }),
        ))
        .await;

    let events = harness
        .http_runtime()
        .invoke_streaming(Invocation::new("oracle", "meaning?").with_organization("acme"))
        .await
        .unwrap()
        .collect()
        .await;

    mock.assert_async().await;
    assert_eq!(names(&events), vec!["start", "chunk", "complete"]);
    match &events[1] {
        StreamEvent::Chunk(chunk) => {
            assert_eq!(chunk.kind, ChunkKind::Final);
            assert_eq!(chunk.content, "42");
            assert_eq!(chunk.metadata.as_ref().unwrap()["provider"], "api");
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn test_failed_dispatch_ends_with_single_error() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/run")
        .with_status(400)
        .with_body("bad request")
        .create_async()
        .await;

    let harness = Harness::new().await;
    harness
        .active(api_agent(
            "oracle",
            "acme",
            json!({"url": format!("{}/run", server.url())}),
        ))
        .await;

    let events = harness
        .http_runtime()
        .invoke_streaming(Invocation::new("oracle", "meaning?").with_organization("acme"))
        .await
        .unwrap()
        .collect()
        .await;

    assert_eq!(names(&events), vec!["start", "error"]);
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
}

#[tokio::test]
async fn test_unknown_agent_fails_before_streaming() {
    let harness = Harness::new().await;
    let err = harness
        .http_runtime()
        .invoke_streaming(Invocation::new("ghost", "hello"))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, agentry::DomainError::AgentNotFound(_)));
}

#[tokio::test]
async fn test_consumer_cancel_stops_producer() {
    let (session, mut receiver) = open_stream(Some("s-cancel".into()), 1);

    let producer = tokio::spawn(async move {
        let mut sent = 0;
        loop {
            match session.publish_chunk(StreamChunk::partial("tick")).await {
                Ok(()) => sent += 1,
                Err(e) => return (sent, e),
            }
        }
    });

    assert_eq!(
        receiver.next().await,
        Some(StreamEvent::Start {
            stream_id: "s-cancel".into()
        })
    );
    assert!(matches!(receiver.next().await, Some(StreamEvent::Chunk(_))));
    assert!(receiver.cancel());

    let (sent, err) = producer.await.unwrap();
    assert!(sent >= 1);
    assert_eq!(err, StreamError::Closed);

    assert_eq!(
        receiver.next().await,
        Some(StreamEvent::Complete {
            result: None,
            cancelled: true
        })
    );
    assert_eq!(receiver.next().await, None);
}

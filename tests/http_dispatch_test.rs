//! End-to-end dispatch through the reqwest adapter against a mock server.

mod common;

use common::{api_agent, external_agent, Harness};
use mockito::Matcher;
use serde_json::json;

use agentry::domain::models::{DispatchStatus, RedactionRule, TaskMode, TransportKind};
use agentry::services::Invocation;

#[tokio::test]
async fn test_api_retries_server_errors_then_succeeds() {
    let mut server = mockito::Server::new_async().await;
    let failing = server
        .mock("POST", "/run")
        .with_status(503)
        .with_body("busy")
        .expect(2)
        .create_async()
        .await;
    let ok = server
        .mock("POST", "/run")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"result": {"answer": "sunny"}}"#)
        .expect(1)
        .create_async()
        .await;

    let harness = Harness::new().await;
    harness
        .active(api_agent(
            "weather",
            "acme",
            json!({
                "url": format!("{}/run", server.url()),
                "responseTransform": {"field": "answer"}
            }),
        ))
        .await;
    let runtime = harness.http_runtime();

    let result = runtime
        .invoke(Invocation::new("weather", "forecast?").with_organization("acme"))
        .await
        .unwrap();

    failing.assert_async().await;
    ok.assert_async().await;
    assert_eq!(result.status, DispatchStatus::Completed);
    assert_eq!(result.content, "sunny");
    assert_eq!(result.status_code, Some(200));
    assert_eq!(result.provider, "api");
    assert_eq!(result.model, "weather");

    let snapshot = runtime
        .dispatcher()
        .metrics()
        .snapshot(TransportKind::Api, "weather")
        .await
        .unwrap();
    assert_eq!(snapshot.count, 1);
    assert_eq!(snapshot.successes, 1);
    assert_eq!(snapshot.last_status_code, Some(200));
}

#[tokio::test]
async fn test_api_exhausted_retries_become_error_result() {
    let mut server = mockito::Server::new_async().await;
    let failing = server
        .mock("POST", "/run")
        .with_status(503)
        .with_body("upstream overloaded; retry with Bearer tok.en-123")
        .expect(3)
        .create_async()
        .await;

    let harness = Harness::new().await;
    harness
        .active(api_agent(
            "weather",
            "acme",
            json!({"url": format!("{}/run", server.url())}),
        ))
        .await;
    let runtime = harness.http_runtime();

    let result = runtime
        .invoke(Invocation::new("weather", "forecast?").with_organization("acme"))
        .await
        .unwrap();

    failing.assert_async().await;
    assert_eq!(result.status, DispatchStatus::Error);
    assert_eq!(result.status_code, Some(503));
    let message = result.error_message.unwrap();
    assert!(message.chars().count() <= 160);
    assert!(!message.contains("tok.en-123"));

    let snapshot = runtime
        .dispatcher()
        .metrics()
        .snapshot(TransportKind::Api, "weather")
        .await
        .unwrap();
    assert_eq!(snapshot.failures, 1);
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let mut server = mockito::Server::new_async().await;
    let not_found = server
        .mock("POST", "/run")
        .with_status(404)
        .expect(1)
        .create_async()
        .await;

    let harness = Harness::new().await;
    harness
        .active(api_agent(
            "weather",
            "acme",
            json!({"url": format!("{}/run", server.url())}),
        ))
        .await;

    let result = harness
        .http_runtime()
        .invoke(Invocation::new("weather", "forecast?").with_organization("acme"))
        .await
        .unwrap();

    not_found.assert_async().await;
    assert_eq!(result.status, DispatchStatus::Error);
    assert_eq!(result.status_code, Some(404));
}

#[tokio::test]
async fn test_headers_are_filtered_and_message_redacted() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/run")
        .match_header("x-api-key", "agent-key")
        .match_header("x-trace-id", "trace-1")
        .match_header("x-internal", Matcher::Missing)
        .match_header("content-type", "application/json")
        .match_body(Matcher::PartialJson(json!({"prompt": "find the [BIRD] nest"})))
        .with_status(200)
        .with_body("plain text answer")
        .create_async()
        .await;

    let harness = Harness::new().await;
    harness
        .rules
        .add(&RedactionRule::new("acme", "falcon").with_replacement("[BIRD]"))
        .await
        .unwrap();
    harness
        .active(api_agent(
            "weather",
            "acme",
            json!({
                "url": format!("{}/run", server.url()),
                "headers": {"X-Api-Key": "agent-key", "x-internal": "secret"}
            }),
        ))
        .await;

    let mut invocation =
        Invocation::new("weather", "find the falcon nest").with_organization("acme");
    invocation
        .headers
        .insert("x-trace-id".to_string(), "trace-1".to_string());

    let result = harness.http_runtime().invoke(invocation).await.unwrap();

    mock.assert_async().await;
    assert_eq!(result.content, "plain text answer");
}

#[tokio::test]
async fn test_external_agent_json_rpc_round_trip() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/rpc")
        .match_body(Matcher::PartialJson(json!({
            "jsonrpc": "2.0",
            "method": "plan",
            "params": {"agentSlug": "planner", "userMessage": "draft a plan"}
        })))
        .with_status(200)
        .with_body(r#"{"jsonrpc": "2.0", "id": "1", "result": {"content": "step one"}}"#)
        .create_async()
        .await;

    let harness = Harness::new().await;
    harness
        .active(external_agent(
            "planner",
            "acme",
            &format!("{}/rpc", server.url()),
        ))
        .await;

    let result = harness
        .http_runtime()
        .invoke(
            Invocation::new("planner", "draft a plan")
                .with_organization("acme")
                .with_mode(TaskMode::Plan),
        )
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(result.status, DispatchStatus::Completed);
    assert_eq!(result.content, "step one");
    assert_eq!(result.provider, "external");
}

#[tokio::test]
async fn test_json_rpc_error_envelope_is_not_retried() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/rpc")
        .with_status(200)
        .with_body(r#"{"jsonrpc": "2.0", "id": "1", "error": {"code": -32601, "message": "no such mode"}}"#)
        .expect(1)
        .create_async()
        .await;

    let harness = Harness::new().await;
    harness
        .active(external_agent(
            "planner",
            "acme",
            &format!("{}/rpc", server.url()),
        ))
        .await;

    let result = harness
        .http_runtime()
        .invoke(Invocation::new("planner", "go").with_organization("acme"))
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(result.status, DispatchStatus::Error);
    assert!(result.error_message.unwrap().contains("no such mode"));
}

#[tokio::test]
async fn test_connection_failure_is_an_error_after_retries() {
    let harness = Harness::new().await;
    harness
        .active(api_agent(
            "weather",
            "acme",
            json!({"url": "http://127.0.0.1:1/run"}),
        ))
        .await;
    let runtime = harness.http_runtime();

    let err = runtime
        .invoke(Invocation::new("weather", "forecast?").with_organization("acme"))
        .await
        .unwrap_err();
    assert!(matches!(err, agentry::DomainError::Transport(_)));

    let snapshot = runtime
        .dispatcher()
        .metrics()
        .snapshot(TransportKind::Api, "weather")
        .await
        .unwrap();
    assert_eq!(snapshot.failures, 1);
    assert_eq!(snapshot.last_status_code, None);
}

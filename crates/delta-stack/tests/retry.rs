//! Retry orchestration through the public API, driven by the mock transport.

use http::StatusCode;
use serde_json::json;

use delta_stack::mock::{MockCredentials, MockTransport};
use delta_stack::test_helpers::{collect_stream, content_body, sse_body};
use delta_stack::{
    ApiErrorKind, ChatRequest, DEFAULT_FALLBACK_MODEL, PipelineConfig, RetryOrchestrator, RetryPolicy,
    StreamEvent,
};

fn request() -> ChatRequest {
    ChatRequest::new("acme/retired-model", json!({"messages": [{"role": "user", "content": "hi"}]}))
}

#[tokio::test]
async fn fallback_and_refresh_take_at_most_three_attempts() {
    let transport = MockTransport::new();
    transport
        .queue_failure(StatusCode::BAD_REQUEST, "acme/retired-model is not a valid model")
        .queue_failure(StatusCode::UNAUTHORIZED, "token expired")
        .queue_failure(StatusCode::BAD_REQUEST, "invalid model")
        .queue_success(content_body(&["never sent"]));
    let credentials = MockCredentials::new("old").with_refreshed("new");
    let orchestrator = RetryOrchestrator::new(transport, credentials);

    let err = orchestrator.execute(&request()).await.unwrap_err();
    assert_eq!(err.as_api().map(|f| f.kind), Some(ApiErrorKind::InvalidModel));

    let calls = orchestrator.transport().recorded_calls();
    assert_eq!(calls.len(), 3);
    assert_eq!(orchestrator.transport().remaining(), 1);
    assert_eq!(calls[1].request.model, DEFAULT_FALLBACK_MODEL);
    assert_eq!(calls[2].credential, "new");
}

#[tokio::test]
async fn custom_fallback_model_is_used() {
    let transport = MockTransport::new();
    transport
        .queue_failure(StatusCode::NOT_FOUND, r#"{"error":{"code":"model_not_found"}}"#)
        .queue_success(content_body(&["fine"]));
    let policy = RetryPolicy {
        fallback_model: "acme/small".into(),
        ..RetryPolicy::default()
    };
    let orchestrator = RetryOrchestrator::new(transport, "key".to_string()).with_policy(policy);

    let attempted = orchestrator
        .generate(&request(), PipelineConfig::default())
        .await
        .unwrap();
    assert_eq!(attempted.model, "acme/small");
    assert!(attempted.fallback_used);
    assert_eq!(attempted.value.text, "fine");
}

#[tokio::test]
async fn streamed_body_split_mid_code_point() {
    let body = sse_body(&[
        r#"{"id":"r1","choices":[{"delta":{"content":"Grüße "}}]}"#,
        r#"{"choices":[{"delta":{"content":"🌍"},"finish_reason":"stop"}]}"#,
    ]);
    let bytes = body.into_bytes();
    let chunks: Vec<Vec<u8>> = bytes.chunks(3).map(<[u8]>::to_vec).collect();

    let transport = MockTransport::new();
    transport.queue_success_chunks(chunks);
    let orchestrator = RetryOrchestrator::new(transport, "key".to_string());

    let attempted = orchestrator
        .stream(&request(), PipelineConfig::default())
        .await
        .unwrap();
    let events = collect_stream(attempted.value).await;

    assert!(matches!(&events[0], StreamEvent::Meta(meta) if meta.id == "r1"));
    let text: String = events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::Text(t) => Some(t.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(text, "Grüße 🌍");
    assert!(matches!(events.last(), Some(StreamEvent::Done { finish_reason }) if finish_reason == "stop"));
}

#[tokio::test]
async fn non_streaming_document() {
    let transport = MockTransport::new();
    transport.queue_success(
        json!({
            "id": "doc-1",
            "choices": [{
                "message": {"content": "Total: 4", "tool_calls": [
                    {"index": 0, "id": "c1", "function": {"name": "add", "arguments": "{\"a\":2,\"b\":2}"}}
                ]},
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 3, "completion_tokens": 2, "total_tokens": 5}
        })
        .to_string(),
    );
    let orchestrator = RetryOrchestrator::new(transport, "key".to_string());
    let request = ChatRequest {
        stream: false,
        ..request()
    };

    let outcome = orchestrator
        .generate(&request, PipelineConfig::default())
        .await
        .unwrap()
        .value;
    assert_eq!(outcome.text, "Total: 4");
    assert_eq!(outcome.tool_calls.len(), 1);
    assert_eq!(outcome.tool_calls[0].parse_arguments().unwrap(), json!({"a": 2, "b": 2}));
    assert_eq!(outcome.finish_reason.as_deref(), Some("tool_calls"));
    assert_eq!(outcome.usage.map(|u| u.total_tokens), Some(5));
    assert_eq!(orchestrator.transport().recorded_calls()[0].request.to_body()["stream"], false);
}

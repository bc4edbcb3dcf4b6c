//! HTTP transport tests against a local `wiremock` server.

use delta_stack::mock::MockCredentials;
use delta_stack::test_helpers::{collect_stream, content_body, sse_body};
use delta_stack::{
    ApiErrorKind, ChatRequest, DEFAULT_FALLBACK_MODEL, Reply, RequestError, StreamEvent, Transport,
};
use delta_stack_http::{ChatClient, HttpConfig, HttpError, HttpTransport};
use futures::StreamExt;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(server: &MockServer) -> HttpConfig {
    HttpConfig {
        api_key: "sk-test".into(),
        base_url: format!("{}/v1", server.uri()),
        ..Default::default()
    }
}

fn sse(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/event-stream")
        .set_body_string(body)
}

fn request(model: &str) -> ChatRequest {
    ChatRequest::new(model, json!({"messages": [{"role": "user", "content": "hi"}]}))
}

#[tokio::test]
async fn test_stream_text_and_code() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(header("accept", "text/event-stream"))
        .and(body_partial_json(json!({"model": "acme/coder", "stream": true})))
        .respond_with(sse(content_body(&["Here:\n", "```rust\n", "fn main() {}", "\n```\n"])))
        .expect(1)
        .mount(&server)
        .await;

    let client = ChatClient::new(config(&server)).unwrap();
    let attempted = client.stream(&request("acme/coder")).await.unwrap();
    assert_eq!(attempted.attempts, 1);

    let events = collect_stream(attempted.value).await;
    assert_eq!(events[0], StreamEvent::Text("Here:\n".into()));
    assert!(events.iter().any(|e| matches!(
        e,
        StreamEvent::BlockOpen { language, .. } if language == "rust"
    )));
    assert!(matches!(events.last(), Some(StreamEvent::BlockClose { .. })));
}

#[tokio::test]
async fn test_generate_collects_tool_call() {
    let server = MockServer::start().await;
    let first = json!({"id": "gen-1", "model": "acme/agent", "choices": [{"delta": {"tool_calls": [
        {"index": 0, "id": "call_a", "function": {"name": "weather", "arguments": "{\"city\""}}
    ]}}]})
    .to_string();
    let second = json!({"choices": [{"delta": {"tool_calls": [
        {"index": 0, "function": {"arguments": ":\"Oslo\"}"}}
    ]}, "finish_reason": "tool_calls"}]})
    .to_string();
    let body = sse_body(&[first.as_str(), second.as_str()]);
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(sse(body))
        .mount(&server)
        .await;

    let client = ChatClient::new(config(&server)).unwrap();
    let outcome = client.generate(&request("acme/agent")).await.unwrap().value;

    assert_eq!(outcome.meta.map(|m| m.id), Some("gen-1".to_string()));
    assert_eq!(outcome.finish_reason.as_deref(), Some("tool_calls"));
    assert_eq!(outcome.tool_calls.len(), 1);
    assert_eq!(outcome.tool_calls[0].parse_arguments().unwrap(), json!({"city": "Oslo"}));
}

#[tokio::test]
async fn test_invalid_model_falls_back() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"model": "acme/gone"})))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(json!({"error": {"message": "acme/gone is not a valid model ID"}})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"model": DEFAULT_FALLBACK_MODEL})))
        .respond_with(sse(content_body(&["fallback answer"])))
        .expect(1)
        .mount(&server)
        .await;

    let client = ChatClient::new(config(&server)).unwrap();
    let attempted = client.generate(&request("acme/gone")).await.unwrap();

    assert!(attempted.fallback_used);
    assert_eq!(attempted.model, DEFAULT_FALLBACK_MODEL);
    assert_eq!(attempted.value.text, "fallback answer");
}

#[tokio::test]
async fn test_auth_refresh_retries_with_new_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("authorization", "Bearer expired"))
        .respond_with(ResponseTemplate::new(401).set_body_string("token expired"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(header("authorization", "Bearer fresh"))
        .respond_with(sse(content_body(&["ok"])))
        .expect(1)
        .mount(&server)
        .await;

    let credentials = MockCredentials::new("expired").with_refreshed("fresh");
    let client = ChatClient::with_credentials(config(&server), credentials).unwrap();
    let attempted = client.generate(&request("acme/any")).await.unwrap();

    assert_eq!(attempted.attempts, 2);
    assert_eq!(attempted.value.text, "ok");
    assert_eq!(client.orchestrator().transport().config().base_url, format!("{}/v1", server.uri()));
}

#[tokio::test]
async fn test_server_error_is_terminal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .expect(1)
        .mount(&server)
        .await;

    let client = ChatClient::new(config(&server)).unwrap();
    let err = client.generate(&request("acme/any")).await.unwrap_err();
    let failure = err.as_api().unwrap();
    assert_eq!(failure.kind, ApiErrorKind::Status);
    assert_eq!(failure.status.as_u16(), 503);
    assert_eq!(failure.body, "overloaded");
}

#[tokio::test]
async fn test_non_streaming_document() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("accept", "application/json"))
        .and(body_partial_json(json!({"stream": false})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "doc-1",
            "choices": [{"message": {"content": "Four."}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 4, "completion_tokens": 2}
        })))
        .mount(&server)
        .await;

    let client = ChatClient::new(config(&server)).unwrap();
    let request = ChatRequest {
        stream: false,
        ..request("acme/any")
    };
    let outcome = client.generate(&request).await.unwrap().value;
    assert_eq!(outcome.text, "Four.");
    assert_eq!(outcome.usage.map(|u| u.total_tokens), Some(6));
}

#[tokio::test]
async fn test_transport_returns_failure_reply() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
        .mount(&server)
        .await;

    let transport = HttpTransport::new(config(&server)).unwrap();
    let reply = transport.send(&request("m"), "k").await.unwrap();
    assert!(matches!(
        reply,
        Reply::Failure { status, ref body } if status.as_u16() == 403 && body == "forbidden"
    ));
}

#[tokio::test]
async fn test_transport_streams_body_bytes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(sse("data: {}\n\n".into()))
        .mount(&server)
        .await;

    let transport = HttpTransport::new(config(&server)).unwrap();
    let Reply::Success(mut body) = transport.send(&request("m"), "k").await.unwrap() else {
        panic!("expected a success reply");
    };
    let mut bytes = Vec::new();
    while let Some(chunk) = body.next().await {
        bytes.extend_from_slice(&chunk.unwrap());
    }
    assert_eq!(bytes, b"data: {}\n\n");
}

#[tokio::test]
async fn test_connection_refused_is_transport_error() {
    let client = ChatClient::new(HttpConfig {
        base_url: "http://127.0.0.1:1/v1".into(),
        ..Default::default()
    })
    .unwrap();

    let err = client.generate(&request("acme/any")).await.unwrap_err();
    assert!(err.is_transport());
    assert!(matches!(err, RequestError::Transport(HttpError::Request(_) | HttpError::Timeout(_))));
}

#[tokio::test]
async fn test_truncated_error_body_is_reported_empty() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 4096];
        while !request.ends_with(b"}") {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
        }
        // Promise more bytes than are sent, then hang up.
        socket
            .write_all(b"HTTP/1.1 500 Internal Server Error\r\ncontent-length: 100\r\n\r\npartial")
            .await
            .unwrap();
    });

    let transport = HttpTransport::new(HttpConfig {
        base_url: format!("http://{addr}/v1"),
        ..Default::default()
    })
    .unwrap();
    let reply = transport.send(&request("m"), "k").await.unwrap();
    assert!(matches!(
        reply,
        Reply::Failure { status, ref body } if status.as_u16() == 500 && body.is_empty()
    ));
}

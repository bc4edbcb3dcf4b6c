//! Model-fallback and credential-refresh retries.
//!
//! [`RetryOrchestrator`] sends one logical request through a
//! [`Transport`] and classifies the reply:
//!
//! ```text
//! Sending ──► Succeeded
//!    │
//!    ├──► InvalidModel ──(once, if allowed)──► Sending with the fallback model
//!    ├──► AuthExpired ──(once, if refreshed)──► Sending with the new credential
//!    └──► Failed
//! ```
//!
//! Each retry dimension fires at most once per request, so the worst case
//! is three attempts. Transport errors are returned as they are, without
//! a retry.

use std::future::Future;

use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::collect::ChatOutcome;
use crate::config::{PipelineConfig, RetryPolicy};
use crate::error::{ApiErrorKind, ApiFailure, RequestError, StreamError};
use crate::pipeline::ChatPipeline;
use crate::stream::{ByteStream, ChatStream};

/// One logical chat request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Model id to request.
    pub model: String,
    /// The rest of the request body (`messages`, `tools`, ...).
    pub payload: Value,
    /// Request a streamed (SSE) response.
    pub stream: bool,
    /// Allow the invalid-model fallback retry for this request.
    pub allow_fallback: bool,
}

impl ChatRequest {
    /// A streaming request with fallback allowed.
    pub fn new(model: impl Into<String>, payload: Value) -> Self {
        Self {
            model: model.into(),
            payload,
            stream: true,
            allow_fallback: true,
        }
    }

    /// The JSON body to send: `payload` with `model` and `stream` set.
    ///
    /// A non-object payload is sent as `{"messages": payload}`.
    pub fn to_body(&self) -> Value {
        let mut body = match &self.payload {
            Value::Object(map) => map.clone(),
            Value::Null => serde_json::Map::new(),
            other => {
                let mut map = serde_json::Map::new();
                map.insert("messages".into(), other.clone());
                map
            }
        };
        body.insert("model".into(), Value::String(self.model.clone()));
        body.insert("stream".into(), Value::Bool(self.stream));
        Value::Object(body)
    }
}

/// What one transport call produced.
pub enum Reply<B> {
    /// A success status; `B` is the body.
    Success(B),
    /// An error status with its full body.
    Failure {
        /// The HTTP status.
        status: StatusCode,
        /// The raw error body.
        body: String,
    },
}

impl<B> std::fmt::Debug for Reply<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success(_) => f.write_str("Success(..)"),
            Self::Failure { status, body } => f
                .debug_struct("Failure")
                .field("status", status)
                .field("body", body)
                .finish(),
        }
    }
}

/// Sends one request attempt. Implementations do no retrying of their own.
///
/// Uses native async-fn-in-traits; implement it with a plain `async fn`.
pub trait Transport: Send + Sync {
    /// The transport's network-level error.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Sends `request` authenticated with `credential`.
    fn send(
        &self,
        request: &ChatRequest,
        credential: &str,
    ) -> impl Future<Output = Result<Reply<ByteStream>, Self::Error>> + Send;
}

/// Supplies the credential and, after an auth failure, a refreshed one.
pub trait CredentialSource: Send + Sync {
    /// The credential to use for a first attempt.
    fn current(&self) -> impl Future<Output = String> + Send;

    /// A credential to replace `used`. Returning `used` unchanged means no
    /// refresh is available.
    fn refresh(&self, used: &str) -> impl Future<Output = String> + Send;
}

/// A fixed credential that never refreshes.
impl CredentialSource for String {
    async fn current(&self) -> String {
        self.clone()
    }

    async fn refresh(&self, used: &str) -> String {
        used.to_string()
    }
}

/// A successful request, with how it got there.
pub struct Attempted<T> {
    /// The response body, stream or collected outcome.
    pub value: T,
    /// The model that produced it.
    pub model: String,
    /// Whether the fallback model was used.
    pub fallback_used: bool,
    /// Number of transport calls made, including the successful one.
    pub attempts: u32,
}

impl<T> std::fmt::Debug for Attempted<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attempted")
            .field("model", &self.model)
            .field("fallback_used", &self.fallback_used)
            .field("attempts", &self.attempts)
            .finish_non_exhaustive()
    }
}

impl<T> Attempted<T> {
    /// Maps the value, keeping the attempt record.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Attempted<U> {
        Attempted {
            value: f(self.value),
            model: self.model,
            fallback_used: self.fallback_used,
            attempts: self.attempts,
        }
    }
}

/// Runs requests through a transport with bounded retries.
pub struct RetryOrchestrator<T, C> {
    transport: T,
    credentials: C,
    policy: RetryPolicy,
}

impl<T: std::fmt::Debug, C> std::fmt::Debug for RetryOrchestrator<T, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryOrchestrator")
            .field("transport", &self.transport)
            .field("credentials", &"[REDACTED]")
            .field("policy", &self.policy)
            .finish()
    }
}

impl<T, C> RetryOrchestrator<T, C>
where
    T: Transport,
    C: CredentialSource,
{
    /// Creates an orchestrator with the default [`RetryPolicy`].
    pub fn new(transport: T, credentials: C) -> Self {
        Self {
            transport,
            credentials,
            policy: RetryPolicy::default(),
        }
    }

    /// Replaces the retry policy.
    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Returns the retry policy.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Returns the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Classifies an error reply.
    pub fn classify(&self, status: StatusCode, body: &str) -> ApiErrorKind {
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            ApiErrorKind::Auth
        } else if status.is_client_error() && self.policy.is_invalid_model(body) {
            ApiErrorKind::InvalidModel
        } else {
            ApiErrorKind::Status
        }
    }

    /// Sends `request`, retrying as the policy allows, and returns the
    /// successful body.
    #[tracing::instrument(skip_all, fields(model = %request.model))]
    pub async fn execute(
        &self,
        request: &ChatRequest,
    ) -> Result<Attempted<ByteStream>, RequestError<T::Error>> {
        let mut request = request.clone();
        let mut credential = self.credentials.current().await;
        let mut fallback_used = false;
        let mut refreshed = false;
        let mut attempts = 0;

        loop {
            attempts += 1;
            let reply = self
                .transport
                .send(&request, &credential)
                .await
                .map_err(RequestError::Transport)?;

            let (status, body) = match reply {
                Reply::Success(value) => {
                    return Ok(Attempted {
                        value,
                        model: request.model,
                        fallback_used,
                        attempts,
                    });
                }
                Reply::Failure { status, body } => (status, body),
            };

            match self.classify(status, &body) {
                ApiErrorKind::InvalidModel
                    if request.allow_fallback && self.policy.retry_invalid_model && !fallback_used =>
                {
                    tracing::warn!(
                        %status,
                        rejected = %request.model,
                        fallback = %self.policy.fallback_model,
                        "model rejected, retrying with fallback model"
                    );
                    fallback_used = true;
                    request.model.clone_from(&self.policy.fallback_model);
                }
                ApiErrorKind::Auth if self.policy.refresh_credentials && !refreshed => {
                    let fresh = self.credentials.refresh(&credential).await;
                    if fresh == credential {
                        return Err(failure(status, body, ApiErrorKind::Auth));
                    }
                    tracing::warn!(%status, "credential rejected, retrying with refreshed credential");
                    refreshed = true;
                    credential = fresh;
                }
                kind => return Err(failure(status, body, kind)),
            }
        }
    }

    /// Sends `request` and parses the streamed body as it arrives.
    pub async fn stream(
        &self,
        request: &ChatRequest,
        config: PipelineConfig,
    ) -> Result<Attempted<ChatStream>, RequestError<T::Error>> {
        let attempted = self.execute(request).await?;
        Ok(attempted.map(|body| ChatPipeline::new(config).into_stream(body)))
    }

    /// Sends `request` and collects the whole response.
    ///
    /// Streaming requests are parsed as SSE (or `config.framing`);
    /// non-streaming ones as a single JSON document.
    pub async fn generate(
        &self,
        request: &ChatRequest,
        config: PipelineConfig,
    ) -> Result<Attempted<ChatOutcome>, RequestError<T::Error>> {
        let attempted = self.execute(request).await?;
        let Attempted {
            value: body,
            model,
            fallback_used,
            attempts,
        } = attempted;

        let outcome = if request.stream {
            ChatOutcome::collect(ChatPipeline::new(config).into_stream(body)).await?
        } else {
            let text = read_to_string(body).await?;
            let events = ChatPipeline::new(config).process_document(&text)?;
            ChatOutcome::from_events(&events)
        };

        Ok(Attempted {
            value: outcome,
            model,
            fallback_used,
            attempts,
        })
    }
}

fn failure<E>(status: StatusCode, body: String, kind: ApiErrorKind) -> RequestError<E>
where
    E: std::error::Error + 'static,
{
    RequestError::Api(ApiFailure { status, body, kind })
}

/// Reads a whole body as UTF-8, replacing invalid sequences.
pub async fn read_to_string(mut body: ByteStream) -> Result<String, StreamError> {
    use futures::StreamExt;

    let mut buf = Vec::new();
    while let Some(chunk) = body.next().await {
        buf.extend_from_slice(&chunk?);
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

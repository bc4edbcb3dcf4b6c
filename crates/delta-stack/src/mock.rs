//! Mock transport and credentials for testing.
//!
//! [`MockTransport`] is a queue-based fake that lets tests control
//! exactly what each attempt returns (a success body, an error status,
//! a body that breaks mid-stream, or a network error) without touching
//! the network. It implements [`Transport`], so it works anywhere a real
//! transport does.
//!
//! ```rust,no_run
//! use delta_stack::mock::{MockCredentials, MockTransport};
//! use delta_stack::{ChatRequest, RetryOrchestrator};
//! use http::StatusCode;
//!
//! # async fn example() {
//! let transport = MockTransport::new();
//! transport
//!     .queue_failure(StatusCode::BAD_REQUEST, "invalid model")
//!     .queue_success("data: {\"choices\":[{\"delta\":{\"content\":\"hi\"}}]}\n\n");
//!
//! let orchestrator = RetryOrchestrator::new(transport, MockCredentials::new("key"));
//! let request = ChatRequest::new("bad/model", serde_json::json!({"messages": []}));
//! let attempted = orchestrator.execute(&request).await.unwrap();
//! assert!(attempted.fallback_used);
//! assert_eq!(orchestrator.transport().call_count(), 2);
//! # }
//! ```
//!
//! # Why `MockTransportError`?
//!
//! [`Transport::Error`] must be a real error type, and queued errors
//! must be `Clone`. [`MockTransportError`] is a small cloneable stand-in
//! for network failures.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;

use bytes::Bytes;
use http::StatusCode;

use crate::error::StreamError;
use crate::retry::{ChatRequest, CredentialSource, Reply, Transport};
use crate::stream::ByteStream;

/// A network-level failure produced by [`MockTransport`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MockTransportError {
    /// The request timed out.
    #[error("request timed out")]
    Timeout,
    /// The connection could not be established.
    #[error("connection failed: {0}")]
    Connect(String),
}

/// One queued reply.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// A success status with the body split into these chunks.
    Success(Vec<Bytes>),
    /// A success status whose body yields these chunks, then a read error.
    BrokenBody(Vec<Bytes>),
    /// An error status.
    Failure {
        /// The status.
        status: StatusCode,
        /// The error body.
        body: String,
    },
    /// A network error before any response.
    Error(MockTransportError),
}

/// A request as the mock received it.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    /// The request.
    pub request: ChatRequest,
    /// The credential it was sent with.
    pub credential: String,
}

/// A queue-based mock transport.
///
/// # Panics
///
/// [`send`](Transport::send) panics if the reply queue is empty.
#[derive(Default)]
pub struct MockTransport {
    replies: Mutex<VecDeque<MockReply>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let queued = self.replies.lock().unwrap().len();
        let calls = self.calls.lock().unwrap().len();
        f.debug_struct("MockTransport")
            .field("queued_replies", &queued)
            .field("recorded_calls", &calls)
            .finish()
    }
}

impl MockTransport {
    /// Creates a mock with an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues a reply.
    pub fn queue(&self, reply: MockReply) -> &Self {
        self.replies.lock().unwrap().push_back(reply);
        self
    }

    /// Enqueues a success whose body arrives in one chunk.
    pub fn queue_success(&self, body: impl Into<String>) -> &Self {
        self.queue(MockReply::Success(vec![Bytes::from(body.into())]))
    }

    /// Enqueues a success whose body arrives in the given chunks.
    pub fn queue_success_chunks<I, B>(&self, chunks: I) -> &Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        self.queue(MockReply::Success(chunks.into_iter().map(Into::into).collect()))
    }

    /// Enqueues a success whose body yields `prefix` and then fails.
    pub fn queue_broken_body(&self, prefix: impl Into<String>) -> &Self {
        self.queue(MockReply::BrokenBody(vec![Bytes::from(prefix.into())]))
    }

    /// Enqueues an error status.
    pub fn queue_failure(&self, status: StatusCode, body: impl Into<String>) -> &Self {
        self.queue(MockReply::Failure {
            status,
            body: body.into(),
        })
    }

    /// Enqueues a network error.
    pub fn queue_error(&self, error: MockTransportError) -> &Self {
        self.queue(MockReply::Error(error))
    }

    /// Returns every call made so far, in order.
    pub fn recorded_calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Number of replies still queued.
    pub fn remaining(&self) -> usize {
        self.replies.lock().unwrap().len()
    }
}

impl Transport for MockTransport {
    type Error = MockTransportError;

    async fn send(&self, request: &ChatRequest, credential: &str) -> Result<Reply<ByteStream>, Self::Error> {
        self.calls.lock().unwrap().push(RecordedCall {
            request: request.clone(),
            credential: credential.to_string(),
        });
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .expect("MockTransport: no queued replies remaining");

        match reply {
            MockReply::Success(chunks) => {
                let body: ByteStream = Box::pin(futures::stream::iter(chunks.into_iter().map(Ok::<_, StreamError>)));
                Ok(Reply::Success(body))
            }
            MockReply::BrokenBody(chunks) => {
                let items = chunks.into_iter().map(Ok).chain(std::iter::once(Err(StreamError::transport(
                    MockTransportError::Connect("connection reset mid-body".into()),
                ))));
                let body: ByteStream = Box::pin(futures::stream::iter(items));
                Ok(Reply::Success(body))
            }
            MockReply::Failure { status, body } => Ok(Reply::Failure { status, body }),
            MockReply::Error(error) => Err(error),
        }
    }
}

/// Credentials with a queue of refreshed values.
///
/// Each [`refresh`](CredentialSource::refresh) pops the next queued
/// value; with the queue empty it returns the credential it was given,
/// meaning no refresh is available.
#[derive(Debug)]
pub struct MockCredentials {
    current: String,
    refreshed: Mutex<VecDeque<String>>,
    refresh_calls: Mutex<Vec<String>>,
}

impl MockCredentials {
    /// Creates credentials that start at `current` and never refresh.
    pub fn new(current: impl Into<String>) -> Self {
        Self {
            current: current.into(),
            refreshed: Mutex::new(VecDeque::new()),
            refresh_calls: Mutex::new(Vec::new()),
        }
    }

    /// Queues a value for the next refresh.
    #[must_use]
    pub fn with_refreshed(self, next: impl Into<String>) -> Self {
        self.refreshed.lock().unwrap().push_back(next.into());
        self
    }

    /// The `used` arguments of every refresh call, in order.
    pub fn refresh_calls(&self) -> Vec<String> {
        self.refresh_calls.lock().unwrap().clone()
    }
}

impl CredentialSource for MockCredentials {
    async fn current(&self) -> String {
        self.current.clone()
    }

    async fn refresh(&self, used: &str) -> String {
        self.refresh_calls.lock().unwrap().push(used.to_string());
        self.refreshed
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| used.to_string())
    }
}

//! Error types for the parsing pipeline and the retry orchestrator.
//!
//! The pipeline itself is deliberately forgiving: malformed SSE lines,
//! unparseable payloads and orphan tool-call fragments are dropped where
//! they occur and never surface here. What remains are the failures a
//! caller has to act on:
//!
//! - [`StreamError`]: something went wrong while consuming a response
//!   body. A buffer cap was hit, a non-streaming document was not JSON,
//!   or the transport failed mid-body.
//! - [`ApiFailure`]: the remote API answered with an error status and
//!   the retry policy had nothing left to try.
//! - [`RequestError`]: what the orchestrator returns. Either an
//!   [`ApiFailure`], the transport's own error untouched, or a
//!   [`StreamError`] hit while collecting the body.
//!
//! ```rust
//! use delta_stack::error::{ApiErrorKind, ApiFailure, RequestError};
//!
//! fn describe(err: &RequestError<std::io::Error>) -> &'static str {
//!     match err {
//!         RequestError::Api(ApiFailure { kind: ApiErrorKind::InvalidModel, .. }) => "bad model",
//!         RequestError::Api(_) => "api error",
//!         RequestError::Transport(_) => "network",
//!         RequestError::Stream(_) => "body",
//!     }
//! }
//! ```

use http::StatusCode;

/// Errors raised while turning a response body into events.
///
/// Variants are `#[non_exhaustive]`; always include a wildcard arm.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StreamError {
    /// A stage buffered more undelimited input than its configured cap.
    ///
    /// The offending buffer is cleared before this is returned, so the
    /// stream may keep being fed if the caller chooses to continue.
    #[error("stream buffer exceeded {limit} bytes without a delimiter")]
    BufferOverflow {
        /// The configured cap, in bytes.
        limit: usize,
    },

    /// A whole (non-streaming) response body could not be parsed.
    #[error("Response format error: {message}")]
    ResponseFormat {
        /// What went wrong during parsing.
        message: String,
        /// The raw body, for diagnostics.
        raw: String,
    },

    /// The body stream failed after the response had started.
    #[error("Transport error while reading body: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StreamError {
    /// Wraps any transport error that interrupted a body mid-stream.
    pub fn transport(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Transport(Box::new(err))
    }
}

impl From<serde_json::Error> for StreamError {
    fn from(err: serde_json::Error) -> Self {
        Self::ResponseFormat {
            message: err.to_string(),
            raw: String::new(),
        }
    }
}

/// Why the remote API rejected a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// The body carried an invalid-model signature.
    InvalidModel,
    /// 401 or 403: the credential was rejected.
    Auth,
    /// Any other non-success status.
    Status,
}

/// A terminal HTTP-level failure, carrying the status and the raw body.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("API error ({kind:?}, status={status}): {body}")]
pub struct ApiFailure {
    /// The HTTP status of the final attempt.
    pub status: StatusCode,
    /// The raw error body of the final attempt.
    pub body: String,
    /// How the orchestrator classified the failure.
    pub kind: ApiErrorKind,
}

/// The error type returned by the retry orchestrator.
///
/// `E` is the transport's own error type. Network-level failures are
/// never inspected or rewrapped; they come back as
/// [`Transport`](Self::Transport) exactly as the transport produced them.
#[derive(Debug, thiserror::Error)]
pub enum RequestError<E>
where
    E: std::error::Error + 'static,
{
    /// The API answered with an error and no retry applied.
    #[error(transparent)]
    Api(#[from] ApiFailure),
    /// The transport failed before an HTTP response was received.
    #[error(transparent)]
    Transport(E),
    /// The response body could not be consumed.
    #[error(transparent)]
    Stream(#[from] StreamError),
}

impl<E> RequestError<E>
where
    E: std::error::Error + 'static,
{
    /// Returns the API failure, if this is one.
    pub fn as_api(&self) -> Option<&ApiFailure> {
        match self {
            Self::Api(failure) => Some(failure),
            Self::Transport(_) | Self::Stream(_) => None,
        }
    }

    /// Returns `true` if the transport failed rather than the API.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_buffer_overflow() {
        let err = StreamError::BufferOverflow { limit: 1024 };
        assert!(format!("{err}").contains("1024"));
    }

    #[test]
    fn test_error_display_response_format() {
        let err = StreamError::ResponseFormat {
            message: "not json".into(),
            raw: "hello".into(),
        };
        assert!(format!("{err}").contains("not json"));
    }

    #[test]
    fn test_error_transport_source_chain() {
        use std::error::Error;
        let err = StreamError::transport(std::io::Error::other("reset by peer"));
        let source = err.source().expect("Transport should have a source");
        assert!(format!("{source}").contains("reset by peer"));
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("not valid json").unwrap_err();
        let err: StreamError = json_err.into();
        assert!(matches!(err, StreamError::ResponseFormat { .. }));
    }

    #[test]
    fn test_api_failure_display() {
        let failure = ApiFailure {
            status: StatusCode::BAD_REQUEST,
            body: "gpt-9 is not a valid model ID".into(),
            kind: ApiErrorKind::InvalidModel,
        };
        let display = format!("{failure}");
        assert!(display.contains("400"));
        assert!(display.contains("InvalidModel"));
        assert!(display.contains("gpt-9"));
    }

    #[test]
    fn test_request_error_transport_is_verbatim() {
        let err: RequestError<std::io::Error> =
            RequestError::Transport(std::io::Error::new(std::io::ErrorKind::TimedOut, "slow"));
        assert!(err.is_transport());
        assert!(err.as_api().is_none());
        assert_eq!(format!("{err}"), "slow");
        match err {
            RequestError::Transport(io) => assert_eq!(io.kind(), std::io::ErrorKind::TimedOut),
            _ => panic!("expected transport"),
        }
    }

    #[test]
    fn test_request_error_from_api_failure() {
        let err: RequestError<std::io::Error> = ApiFailure {
            status: StatusCode::UNAUTHORIZED,
            body: "expired".into(),
            kind: ApiErrorKind::Auth,
        }
        .into();
        assert_eq!(err.as_api().map(|f| f.kind), Some(ApiErrorKind::Auth));
    }

    #[test]
    fn test_request_error_from_stream_error() {
        let err: RequestError<std::io::Error> = StreamError::BufferOverflow { limit: 4 }.into();
        assert!(!err.is_transport());
        assert!(matches!(err, RequestError::Stream(StreamError::BufferOverflow { limit: 4 })));
    }

    #[test]
    fn test_errors_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<StreamError>();
        assert_send_sync::<ApiFailure>();
        assert_send_sync::<RequestError<std::io::Error>>();
    }
}

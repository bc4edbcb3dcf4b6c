//! Network-level errors of the HTTP transport.

/// Errors raised before a response status is known.
///
/// Error statuses are not errors here: they come back as
/// [`Reply::Failure`](delta_stack::Reply::Failure) so the orchestrator can
/// classify them.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum HttpError {
    /// A header value (usually the credential) is not valid in HTTP.
    #[error("invalid header value for {name}")]
    InvalidHeader {
        /// The header name.
        name: &'static str,
    },

    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// The request timed out.
    #[error("request timed out")]
    Timeout(#[source] reqwest::Error),

    /// Connecting or sending failed.
    #[error("request failed: {0}")]
    Request(#[source] reqwest::Error),
}

impl From<reqwest::Error> for HttpError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout(e)
        } else {
            Self::Request(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_header_display() {
        let err = HttpError::InvalidHeader { name: "authorization" };
        assert_eq!(err.to_string(), "invalid header value for authorization");
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync + 'static>() {}
        assert_send_sync::<HttpError>();
    }
}

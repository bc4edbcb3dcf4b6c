//! HTTP transport configuration.

use std::time::Duration;

use http::HeaderMap;

/// Default base URL: an OpenAI-compatible aggregator.
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Configuration for [`HttpTransport`](crate::HttpTransport) and
/// [`ChatClient`](crate::ChatClient).
///
/// Use struct update syntax with [`Default`]:
///
/// ```rust
/// use delta_stack_http::HttpConfig;
///
/// let config = HttpConfig {
///     api_key: "sk-or-...".into(),
///     base_url: "http://localhost:8080/v1".into(),
///     ..Default::default()
/// };
/// ```
#[derive(Clone)]
pub struct HttpConfig {
    /// API key. [`ChatClient::new`](crate::ChatClient::new) uses it as a
    /// fixed credential; the transport itself sends whatever credential
    /// the orchestrator hands it.
    pub api_key: String,
    /// Base URL; `/chat/completions` is appended.
    pub base_url: String,
    /// Request timeout. `None` uses reqwest's default.
    pub timeout: Option<Duration>,
    /// Headers added to every request (e.g. `HTTP-Referer`, `X-Title`).
    pub extra_headers: HeaderMap,
    /// Pre-configured HTTP client for connection pooling.
    /// When `None`, a new client is created.
    pub client: Option<reqwest::Client>,
}

impl std::fmt::Debug for HttpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpConfig")
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("extra_headers", &self.extra_headers.keys().collect::<Vec<_>>())
            .field("client", &self.client.as_ref().map(|_| "..."))
            .finish()
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.into(),
            timeout: None,
            extra_headers: HeaderMap::new(),
            client: None,
        }
    }
}

impl HttpConfig {
    /// The chat completions endpoint.
    pub fn completions_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        format!("{base}/chat/completions")
    }
}

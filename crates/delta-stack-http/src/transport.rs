//! reqwest implementation of [`Transport`].

use delta_stack::error::StreamError;
use delta_stack::retry::{ChatRequest, Reply, Transport};
use delta_stack::stream::ByteStream;
use futures::StreamExt;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use tracing::instrument;

use crate::config::HttpConfig;
use crate::error::HttpError;

/// Sends chat-completion requests to an OpenAI-compatible endpoint.
///
/// One call, one attempt. Error statuses come back as
/// [`Reply::Failure`] with the full body, a success as the raw body
/// stream, so retries and parsing stay with the caller.
///
/// ```rust,no_run
/// use delta_stack::{ChatRequest, Reply, Transport};
/// use delta_stack_http::{HttpConfig, HttpTransport};
///
/// # async fn example() -> Result<(), delta_stack_http::HttpError> {
/// let transport = HttpTransport::new(HttpConfig::default())?;
/// let request = ChatRequest::new("openai/gpt-4o-mini", serde_json::json!({"messages": []}));
/// match transport.send(&request, "sk-or-...").await? {
///     Reply::Success(_body) => {}
///     Reply::Failure { status, body } => eprintln!("{status}: {body}"),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct HttpTransport {
    config: HttpConfig,
    client: reqwest::Client,
}

impl HttpTransport {
    /// Creates a transport from configuration.
    ///
    /// If `config.client` is `Some`, that client is reused for connection
    /// pooling. Otherwise a new client is built with the configured timeout.
    pub fn new(config: HttpConfig) -> Result<Self, HttpError> {
        let client = match config.client.clone() {
            Some(client) => client,
            None => {
                let mut builder = reqwest::Client::builder();
                if let Some(timeout) = config.timeout {
                    builder = builder.timeout(timeout);
                }
                builder.build().map_err(HttpError::Client)?
            }
        };
        Ok(Self { config, client })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &HttpConfig {
        &self.config
    }

    fn headers(&self, request: &ChatRequest, credential: &str) -> Result<HeaderMap, HttpError> {
        let mut headers = self.config.extra_headers.clone();
        if !credential.is_empty() {
            let auth = HeaderValue::from_str(&format!("Bearer {credential}"))
                .map_err(|_| HttpError::InvalidHeader { name: "authorization" })?;
            headers.insert(AUTHORIZATION, auth);
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let accept = if request.stream {
            "text/event-stream"
        } else {
            "application/json"
        };
        headers.insert(ACCEPT, HeaderValue::from_static(accept));
        Ok(headers)
    }
}

impl Transport for HttpTransport {
    type Error = HttpError;

    #[instrument(skip_all, fields(model = %request.model, stream = request.stream))]
    async fn send(&self, request: &ChatRequest, credential: &str) -> Result<Reply<ByteStream>, HttpError> {
        let response = self
            .client
            .post(self.config.completions_url())
            .headers(self.headers(request, credential)?)
            .json(&request.to_body())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = match response.text().await {
                Ok(body) => body,
                Err(e) => {
                    tracing::debug!(%status, error = %e, "failed to read error body");
                    String::new()
                }
            };
            tracing::debug!(%status, bytes = body.len(), "error status from chat completions");
            return Ok(Reply::Failure { status, body });
        }

        let body: ByteStream = Box::pin(response.bytes_stream().map(|chunk| chunk.map_err(StreamError::transport)));
        Ok(Reply::Success(body))
    }
}

//! The two access modes over HTTP: iterate the events, or await the
//! whole result.

use delta_stack::{
    Attempted, ChatOutcome, ChatRequest, ChatStream, CredentialSource, PipelineConfig, RequestError,
    RetryOrchestrator, RetryPolicy,
};

use crate::config::HttpConfig;
use crate::error::HttpError;
use crate::transport::HttpTransport;

/// A chat-completions client: [`HttpTransport`] behind a
/// [`RetryOrchestrator`], with a [`PipelineConfig`] for every response.
///
/// # Example
///
/// ```rust,no_run
/// use delta_stack::{ChatRequest, StreamEvent};
/// use delta_stack_http::{ChatClient, HttpConfig};
/// use futures::StreamExt;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = ChatClient::new(HttpConfig {
///     api_key: std::env::var("OPENROUTER_API_KEY")?,
///     ..Default::default()
/// })?;
///
/// let request = ChatRequest::new(
///     "anthropic/claude-3.5-haiku",
///     serde_json::json!({"messages": [{"role": "user", "content": "Hello!"}]}),
/// );
/// let mut stream = client.stream(&request).await?.value;
/// while let Some(event) = stream.next().await {
///     if let StreamEvent::Text(text) = event? {
///         print!("{text}");
///     }
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ChatClient<C = String> {
    orchestrator: RetryOrchestrator<HttpTransport, C>,
    pipeline: PipelineConfig,
}

impl ChatClient<String> {
    /// Creates a client that authenticates with `config.api_key` and
    /// never refreshes it.
    pub fn new(config: HttpConfig) -> Result<Self, HttpError> {
        let credential = config.api_key.clone();
        Self::with_credentials(config, credential)
    }
}

impl<C: CredentialSource> ChatClient<C> {
    /// Creates a client that takes credentials from `credentials`.
    pub fn with_credentials(config: HttpConfig, credentials: C) -> Result<Self, HttpError> {
        let transport = HttpTransport::new(config)?;
        Ok(Self {
            orchestrator: RetryOrchestrator::new(transport, credentials),
            pipeline: PipelineConfig::default(),
        })
    }

    /// Replaces the retry policy.
    #[must_use]
    pub fn with_policy(self, policy: RetryPolicy) -> Self {
        Self {
            orchestrator: self.orchestrator.with_policy(policy),
            pipeline: self.pipeline,
        }
    }

    /// Replaces the pipeline configuration.
    #[must_use]
    pub fn with_pipeline(mut self, pipeline: PipelineConfig) -> Self {
        self.pipeline = pipeline;
        self
    }

    /// Returns the orchestrator.
    pub fn orchestrator(&self) -> &RetryOrchestrator<HttpTransport, C> {
        &self.orchestrator
    }

    /// Sends `request` and returns its events as they are parsed.
    pub async fn stream(&self, request: &ChatRequest) -> Result<Attempted<ChatStream>, RequestError<HttpError>> {
        self.orchestrator.stream(request, self.pipeline.clone()).await
    }

    /// Sends `request` and waits for the whole response.
    pub async fn generate(&self, request: &ChatRequest) -> Result<Attempted<ChatOutcome>, RequestError<HttpError>> {
        self.orchestrator.generate(request, self.pipeline.clone()).await
    }
}

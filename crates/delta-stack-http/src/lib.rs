//! reqwest transport for `delta-stack`.
//!
//! [`HttpTransport`] implements [`Transport`](delta_stack::Transport) for
//! any OpenAI-compatible `/chat/completions` endpoint. [`ChatClient`] puts
//! it behind a [`RetryOrchestrator`](delta_stack::RetryOrchestrator) and
//! offers both access modes: `stream` for events as they are parsed,
//! `generate` for the collected result.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use delta_stack::ChatRequest;
//! use delta_stack_http::{ChatClient, HttpConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = ChatClient::new(HttpConfig {
//!     api_key: std::env::var("OPENROUTER_API_KEY")?,
//!     ..Default::default()
//! })?;
//!
//! let request = ChatRequest::new(
//!     "openai/gpt-4o",
//!     serde_json::json!({"messages": [{"role": "user", "content": "Hello!"}]}),
//! );
//! let outcome = client.generate(&request).await?.value;
//! println!("{}", outcome.content);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod client;
mod config;
mod error;
mod transport;

pub use client::ChatClient;
pub use config::{DEFAULT_BASE_URL, HttpConfig};
pub use error::HttpError;
pub use transport::HttpTransport;

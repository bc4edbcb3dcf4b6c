//! Pipeline and retry configuration.
//!
//! Both structs are plain data with a [`Default`]; override only what
//! you need with struct update syntax:
//!
//! ```rust
//! use delta_stack::{Framing, PipelineConfig, RetryPolicy};
//!
//! let pipeline = PipelineConfig {
//!     framing: Framing::JsonObjects,
//!     ..Default::default()
//! };
//! let retry = RetryPolicy {
//!     fallback_model: "openai/gpt-4o".into(),
//!     ..Default::default()
//! };
//! # let _ = (pipeline, retry);
//! ```

/// Model used for the single retry after an invalid-model response.
pub const DEFAULT_FALLBACK_MODEL: &str = "openai/gpt-4o-mini";

/// Body fragments that identify an invalid-model response. Matched
/// case-insensitively.
pub const INVALID_MODEL_SIGNATURES: &[&str] = &["invalid model", "is not a valid model", "model_not_found"];

/// Default cap on undelimited buffered input.
pub const DEFAULT_MAX_BUFFER_BYTES: usize = 16 * 1024 * 1024; // 16 MiB

/// How a response body is split into payloads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Framing {
    /// Server-Sent Events: `data: <json>` lines.
    #[default]
    Sse,
    /// Concatenated or array-wrapped JSON objects, split on balanced braces.
    JsonObjects,
}

/// Configuration for one [`ChatPipeline`](crate::ChatPipeline).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Body framing.
    pub framing: Framing,
    /// Cap on the residual buffer. `None` disables the cap.
    pub max_buffer_bytes: Option<usize>,
    /// Split content into prose and fenced code. When `false`, all
    /// content is emitted as `Text`.
    pub detect_code_fences: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            framing: Framing::Sse,
            max_buffer_bytes: Some(DEFAULT_MAX_BUFFER_BYTES),
            detect_code_fences: true,
        }
    }
}

/// Retry policy for the [`RetryOrchestrator`](crate::RetryOrchestrator).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Model to retry with after an invalid-model response.
    pub fallback_model: String,
    /// Retry once with `fallback_model` on an invalid-model response.
    pub retry_invalid_model: bool,
    /// Ask the credential source for a new credential on 401/403.
    pub refresh_credentials: bool,
    /// Lowercase body fragments that identify an invalid model.
    pub invalid_model_signatures: Vec<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            fallback_model: DEFAULT_FALLBACK_MODEL.into(),
            retry_invalid_model: true,
            refresh_credentials: true,
            invalid_model_signatures: INVALID_MODEL_SIGNATURES.iter().map(|s| (*s).to_string()).collect(),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            retry_invalid_model: false,
            refresh_credentials: false,
            ..Self::default()
        }
    }

    /// Returns `true` if `body` carries one of the invalid-model signatures.
    pub fn is_invalid_model(&self, body: &str) -> bool {
        let body = body.to_lowercase();
        self.invalid_model_signatures
            .iter()
            .any(|sig| body.contains(&sig.to_lowercase()))
    }
}

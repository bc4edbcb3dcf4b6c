//! Token usage reported by the API.
//!
//! Providers send usage once, usually in the last chunk before
//! `[DONE]`. Aggregators such as OpenRouter add a `cost` in USD; plain
//! OpenAI-compatible servers do not, so it stays optional.

use serde::{Deserialize, Serialize};

use crate::wire::WireUsage;

/// Token counts for one response.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens consumed by the prompt.
    pub prompt_tokens: u64,
    /// Tokens produced by the model.
    pub completion_tokens: u64,
    /// As reported, or `prompt + completion` when the API omits it.
    pub total_tokens: u64,
    /// Cost in USD, when the API reports one.
    pub cost: Option<f64>,
}

impl From<&WireUsage> for Usage {
    fn from(wire: &WireUsage) -> Self {
        let prompt_tokens = wire.prompt_tokens.unwrap_or(0);
        let completion_tokens = wire.completion_tokens.unwrap_or(0);
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: wire
                .total_tokens
                .unwrap_or_else(|| prompt_tokens.saturating_add(completion_tokens)),
            cost: wire.cost,
        }
    }
}

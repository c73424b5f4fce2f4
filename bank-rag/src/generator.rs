//! Text generation backends.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::document::QaPair;
use crate::error::Result;
use crate::prompt::{NO_CONTEXT_MARKER, context_section};

/// One generation call: the assembled prompt plus sampling parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// The fully assembled prompt.
    pub prompt: String,
    /// Hard cap on generated tokens.
    pub max_new_tokens: usize,
    /// Sampling temperature; ignored when `sampling_enabled` is false.
    pub temperature: f32,
    /// Sample from the distribution instead of decoding greedily.
    pub sampling_enabled: bool,
    /// Allow the backend to reuse key/value cache state from earlier calls.
    ///
    /// Consecutive questions are unrelated conversations, so the pipeline
    /// always sends `false`.
    pub reuse_kv_cache: bool,
}

impl GenerationRequest {
    /// A request with caching disabled.
    pub fn new(prompt: impl Into<String>, max_new_tokens: usize, temperature: f32, sampling_enabled: bool) -> Self {
        Self { prompt: prompt.into(), max_new_tokens, temperature, sampling_enabled, reuse_kv_cache: false }
    }

    /// The temperature actually sent to the model.
    pub fn effective_temperature(&self) -> f32 {
        if self.sampling_enabled { self.temperature } else { 0.0 }
    }
}

/// A language model that turns a prompt into text.
///
/// Each call is independent: implementations must not carry state from one
/// request into the next unless the request explicitly allows cache reuse.
/// Concurrency limits are enforced by the caller.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Produce raw model output for `request`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::GenerationFailed`](crate::RagError) when the
    /// underlying model invocation fails.
    async fn generate(&self, request: &GenerationRequest) -> Result<String>;

    /// Identifier of the underlying model.
    fn model_id(&self) -> &str;
}

/// Reply used by [`ExtractiveGenerator`] when the context has no answer.
pub const NO_ANSWER_DISCLAIMER: &str =
    "I'm sorry, I don't have enough information to answer that question.";

/// A model-free generator that answers with the best reference answer.
///
/// It reads the `CONTEXT:` section of a prompt built by
/// [`prompt::assemble`](crate::prompt::assemble), returns the answer of the
/// first structured Q&A pair, and truncates it to `max_new_tokens`
/// whitespace-separated words. Without usable context it returns
/// [`NO_ANSWER_DISCLAIMER`]. It never fails.
#[derive(Debug, Clone)]
pub struct ExtractiveGenerator {
    model_id: String,
}

impl ExtractiveGenerator {
    pub fn new() -> Self {
        Self { model_id: "extractive".to_string() }
    }
}

impl Default for ExtractiveGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Generator for ExtractiveGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let answer = context_section(&request.prompt)
            .filter(|context| *context != NO_CONTEXT_MARKER)
            .and_then(|context| context.split("\n\n").find_map(QaPair::parse))
            .map(|pair| pair.answer.split_whitespace().take(request.max_new_tokens).collect::<Vec<_>>().join(" "))
            .filter(|answer| !answer.is_empty());

        Ok(answer.unwrap_or_else(|| NO_ANSWER_DISCLAIMER.to_string()))
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

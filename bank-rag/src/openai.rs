//! Generator backed by an OpenAI-compatible completions endpoint.
//!
//! This module is only available when the `openai` feature is enabled.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::{RagError, Result};
use crate::generator::{GenerationRequest, Generator};

const PROVIDER: &str = "openai-compatible";

/// A [`Generator`] calling `POST {base_url}/v1/completions`.
///
/// The assembled prompt already carries the chat template, so the raw
/// completions endpoint is used rather than chat completions. Any server
/// speaking that API can host the model (vLLM, llama.cpp, TGI, ...).
///
/// # Configuration
///
/// - `base_url` – server root, e.g. `http://127.0.0.1:8080`.
/// - `model` – model name sent with each request.
/// - `api_key` – optional bearer token.
/// - `timeout` – per-request transport timeout.
///
/// # Example
///
/// ```rust,ignore
/// use bank_rag::openai::OpenAiCompatGenerator;
///
/// let generator = OpenAiCompatGenerator::new("http://127.0.0.1:8080", "microsoft/phi-3-mini-4k-instruct")?;
/// let text = generator.generate(&request).await?;
/// ```
pub struct OpenAiCompatGenerator {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiCompatGenerator {
    /// Create a generator with a 60 second request timeout.
    pub fn new(base_url: impl AsRef<str>, model: impl Into<String>) -> Result<Self> {
        Self::with_timeout(base_url, model, Duration::from_secs(60))
    }

    /// Create a generator with an explicit request timeout.
    pub fn with_timeout(
        base_url: impl AsRef<str>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build().map_err(|e| {
            RagError::InvalidConfiguration(format!("failed to build HTTP client: {e}"))
        })?;
        let endpoint = format!("{}/v1/completions", base_url.as_ref().trim_end_matches('/'));
        Ok(Self { client, endpoint, model: model.into(), api_key: None })
    }

    /// Send `api_key` as a bearer token.
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|k| !k.is_empty());
        self
    }

    fn failed(message: impl Into<String>) -> RagError {
        RagError::GenerationFailed { generator: PROVIDER.to_string(), message: message.into() }
    }
}

// ── Completions API request/response types ─────────────────────────

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    max_tokens: usize,
    temperature: f32,
    /// Honored by llama.cpp-style servers; others ignore unknown fields.
    cache_prompt: bool,
    stream: bool,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    text: String,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

// ── Generator implementation ───────────────────────────────────────

#[async_trait]
impl Generator for OpenAiCompatGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        debug!(
            provider = PROVIDER,
            model = %self.model,
            prompt_len = request.prompt.len(),
            max_tokens = request.max_new_tokens,
            "requesting completion"
        );

        let body = CompletionRequest {
            model: &self.model,
            prompt: &request.prompt,
            max_tokens: request.max_new_tokens,
            temperature: request.effective_temperature(),
            cache_prompt: request.reuse_kv_cache,
            stream: false,
        };

        let mut call = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            call = call.bearer_auth(key);
        }

        let response = call.send().await.map_err(|e| {
            error!(provider = PROVIDER, error = %e, "request failed");
            Self::failed(format!("request failed: {e}"))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);

            error!(provider = PROVIDER, %status, "API error");
            return Err(Self::failed(format!("API returned {status}: {detail}")));
        }

        let completion: CompletionResponse = response.json().await.map_err(|e| {
            error!(provider = PROVIDER, error = %e, "failed to parse response");
            Self::failed(format!("failed to parse response: {e}"))
        })?;

        completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.text)
            .ok_or_else(|| Self::failed("API returned no choices"))
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_is_joined_without_double_slash() {
        let generator = OpenAiCompatGenerator::new("http://127.0.0.1:8080/", "phi-3").unwrap();
        assert_eq!(generator.endpoint, "http://127.0.0.1:8080/v1/completions");
        assert_eq!(generator.model_id(), "phi-3");
    }

    #[test]
    fn empty_api_key_is_ignored() {
        let generator =
            OpenAiCompatGenerator::new("http://localhost", "phi-3").unwrap().with_api_key(Some(String::new()));
        assert!(generator.api_key.is_none());
    }

    #[test]
    fn greedy_request_body_disables_sampling_and_cache() {
        let request = GenerationRequest::new("<|user|>\nhi\n<|end|>\n<|assistant|>\n", 300, 0.7, false);
        let body = CompletionRequest {
            model: "phi-3",
            prompt: &request.prompt,
            max_tokens: request.max_new_tokens,
            temperature: request.effective_temperature(),
            cache_prompt: request.reuse_kv_cache,
            stream: false,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["temperature"], 0.0);
        assert_eq!(json["cache_prompt"], false);
        assert_eq!(json["max_tokens"], 300);
    }

    #[tokio::test]
    async fn unreachable_server_is_a_generation_failure() {
        let generator =
            OpenAiCompatGenerator::with_timeout("http://127.0.0.1:9", "phi-3", Duration::from_millis(500)).unwrap();
        let request = GenerationRequest::new("prompt", 10, 0.7, true);
        let err = generator.generate(&request).await.unwrap_err();
        assert!(matches!(err, RagError::GenerationFailed { .. }));
    }
}

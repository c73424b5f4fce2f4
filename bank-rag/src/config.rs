//! Configuration for the RAG pipeline.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Default generation model identifier.
pub const DEFAULT_MODEL_ID: &str = "microsoft/phi-3-mini-4k-instruct";

/// Default embedding model identifier.
pub const DEFAULT_EMBEDDING_MODEL_ID: &str = "all-MiniLM-L6-v2";

/// Configuration parameters for the RAG pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RagConfig {
    /// Identifier of the generation model, reported by
    /// [`RagPipeline::status`](crate::RagPipeline::status).
    pub model_id: String,
    /// Identifier of the embedding model, reported by
    /// [`RagPipeline::status`](crate::RagPipeline::status).
    pub embedding_model_id: String,
    /// Path of the CSV knowledge base.
    pub data_path: PathBuf,
    /// Where the built index is persisted. `None` disables persistence.
    pub index_path: Option<PathBuf>,
    /// Reuse a persisted index at startup when it matches the embedder.
    pub reuse_index: bool,
    /// Upper bound on generated tokens per answer.
    pub max_new_tokens: usize,
    /// Sampling temperature.
    pub temperature: f32,
    /// Whether to sample at all. When false the generator decodes greedily.
    pub sampling_enabled: bool,
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Number of overlapping characters between consecutive chunks.
    pub chunk_overlap: usize,
    /// Number of chunks retrieved per question.
    pub top_k: usize,
    /// Drop retrieved chunks scoring below this value.
    pub min_score: Option<f32>,
    /// Number of chunk texts embedded per call during index build.
    pub embed_batch_size: usize,
    /// Maximum number of generator invocations in flight.
    pub generation_concurrency: usize,
    /// Deadline covering retrieval and generation of one query.
    pub query_timeout: Duration,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            model_id: DEFAULT_MODEL_ID.to_string(),
            embedding_model_id: DEFAULT_EMBEDDING_MODEL_ID.to_string(),
            data_path: PathBuf::from("data").join("bank_customer_service_faq.csv"),
            index_path: Some(PathBuf::from("chroma_db").join("index.json")),
            reuse_index: false,
            max_new_tokens: 300,
            temperature: 0.7,
            sampling_enabled: true,
            chunk_size: 1000,
            chunk_overlap: 0,
            top_k: 4,
            min_score: None,
            embed_batch_size: 64,
            generation_concurrency: 1,
            query_timeout: Duration::from_secs(120),
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Check that the parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfiguration`] describing the first
    /// offending field.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(invalid("chunk_size must be greater than zero"));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::InvalidConfiguration(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.top_k == 0 {
            return Err(invalid("top_k must be greater than zero"));
        }
        if self.max_new_tokens == 0 {
            return Err(invalid("max_new_tokens must be greater than zero"));
        }
        if self.temperature.is_nan() || self.temperature < 0.0 {
            return Err(invalid("temperature must be a non-negative number"));
        }
        if self.embed_batch_size == 0 {
            return Err(invalid("embed_batch_size must be greater than zero"));
        }
        if self.generation_concurrency == 0 {
            return Err(invalid("generation_concurrency must be greater than zero"));
        }
        if self.query_timeout.is_zero() {
            return Err(invalid("query_timeout must be non-zero"));
        }
        Ok(())
    }
}

fn invalid(message: &str) -> RagError {
    RagError::InvalidConfiguration(message.to_string())
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the generation model identifier.
    pub fn model_id(mut self, id: impl Into<String>) -> Self {
        self.config.model_id = id.into();
        self
    }

    /// Set the embedding model identifier.
    pub fn embedding_model_id(mut self, id: impl Into<String>) -> Self {
        self.config.embedding_model_id = id.into();
        self
    }

    /// Set the CSV knowledge base path.
    pub fn data_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_path = path.into();
        self
    }

    /// Set or clear the persisted index path.
    pub fn index_path(mut self, path: Option<PathBuf>) -> Self {
        self.config.index_path = path;
        self
    }

    /// Reuse a matching persisted index instead of rebuilding.
    pub fn reuse_index(mut self, reuse: bool) -> Self {
        self.config.reuse_index = reuse;
        self
    }

    /// Set the maximum number of generated tokens.
    pub fn max_new_tokens(mut self, tokens: usize) -> Self {
        self.config.max_new_tokens = tokens;
        self
    }

    /// Set the sampling temperature.
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.config.temperature = temperature;
        self
    }

    /// Enable or disable sampling.
    pub fn sampling_enabled(mut self, enabled: bool) -> Self {
        self.config.sampling_enabled = enabled;
        self
    }

    /// Set the maximum chunk size in characters.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks in characters.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Set the number of chunks retrieved per question.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the minimum similarity a retrieved chunk must reach.
    pub fn min_score(mut self, score: Option<f32>) -> Self {
        self.config.min_score = score;
        self
    }

    /// Set the number of texts embedded per batch during index build.
    pub fn embed_batch_size(mut self, size: usize) -> Self {
        self.config.embed_batch_size = size;
        self
    }

    /// Set how many generator invocations may run at once.
    pub fn generation_concurrency(mut self, permits: usize) -> Self {
        self.config.generation_concurrency = permits;
        self
    }

    /// Set the per-query deadline.
    pub fn query_timeout(mut self, timeout: Duration) -> Self {
        self.config.query_timeout = timeout;
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfiguration`] if:
    /// - `chunk_size == 0` or `chunk_overlap >= chunk_size`
    /// - `top_k`, `max_new_tokens`, `embed_batch_size` or
    ///   `generation_concurrency` is zero
    /// - `temperature` is negative or NaN
    /// - `query_timeout` is zero
    pub fn build(self) -> Result<RagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

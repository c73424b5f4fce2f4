//! Flat process configuration, read from flags or `BANK_RAG_*` variables.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use bank_rag::{
    DEFAULT_EMBEDDING_MODEL_ID, DEFAULT_MODEL_ID, Embedder, ExtractiveGenerator, Generator,
    HashingEmbedder, RagConfig,
};
use clap::{Parser, ValueEnum};

/// Which embedding backend to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EmbedderKind {
    /// Local ONNX sentence-transformer via fastembed.
    Fastembed,
    /// Feature hashing, no model download.
    Hashing,
}

/// Which generation backend to call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GeneratorKind {
    /// An OpenAI-compatible completions server.
    Openai,
    /// Answer with the best matching reference answer.
    Extractive,
}

/// Banking FAQ question-answering service.
#[derive(Debug, Clone, Parser)]
#[command(name = "bank-rag-server", version, about)]
pub struct Settings {
    /// Address to bind.
    #[arg(long, env = "BANK_RAG_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, env = "BANK_RAG_PORT", default_value_t = 5000)]
    pub port: u16,

    /// Verbose logging.
    #[arg(long, env = "BANK_RAG_DEBUG")]
    pub debug: bool,

    /// Generation model name, sent to the generator and reported by /api/system_info.
    #[arg(long, env = "BANK_RAG_MODEL_ID", default_value = DEFAULT_MODEL_ID)]
    pub model_id: String,

    /// Embedding model name.
    #[arg(long, env = "BANK_RAG_EMBEDDING_MODEL_ID", default_value = DEFAULT_EMBEDDING_MODEL_ID)]
    pub embedding_model_id: String,

    /// CSV knowledge base with `question` and `answer` columns.
    #[arg(long, env = "BANK_RAG_DATA_PATH", default_value = "data/bank_customer_service_faq.csv")]
    pub data_path: PathBuf,

    /// Where the built index is persisted.
    #[arg(long, env = "BANK_RAG_INDEX_PATH", default_value = "chroma_db/index.json")]
    pub index_path: PathBuf,

    /// Do not persist the built index.
    #[arg(long, env = "BANK_RAG_NO_PERSIST", conflicts_with = "reuse_index")]
    pub no_persist: bool,

    /// Serve a persisted index instead of rebuilding when it matches the embedder.
    #[arg(long, env = "BANK_RAG_REUSE_INDEX")]
    pub reuse_index: bool,

    #[arg(long, env = "BANK_RAG_MAX_NEW_TOKENS", default_value_t = 300)]
    pub max_new_tokens: usize,

    #[arg(long, env = "BANK_RAG_TEMPERATURE", default_value_t = 0.7)]
    pub temperature: f32,

    /// Decode greedily.
    #[arg(long, env = "BANK_RAG_NO_SAMPLING")]
    pub no_sampling: bool,

    /// Chunk size in characters.
    #[arg(long, env = "BANK_RAG_CHUNK_SIZE", default_value_t = 1000)]
    pub chunk_size: usize,

    /// Overlap between consecutive chunks in characters.
    #[arg(long, env = "BANK_RAG_CHUNK_OVERLAP", default_value_t = 0)]
    pub chunk_overlap: usize,

    /// Chunks retrieved per question.
    #[arg(long, env = "BANK_RAG_TOP_K", default_value_t = 4)]
    pub top_k: usize,

    /// Drop retrieved chunks scoring below this similarity.
    #[arg(long, env = "BANK_RAG_MIN_SCORE")]
    pub min_score: Option<f32>,

    #[arg(long, env = "BANK_RAG_EMBED_BATCH_SIZE", default_value_t = 64)]
    pub embed_batch_size: usize,

    /// Generator calls allowed in flight at once.
    #[arg(long, env = "BANK_RAG_GENERATION_CONCURRENCY", default_value_t = 1)]
    pub generation_concurrency: usize,

    /// Deadline for one query, retrieval and generation included.
    #[arg(long, env = "BANK_RAG_QUERY_TIMEOUT_SECS", default_value_t = 120)]
    pub query_timeout_secs: u64,

    #[arg(long, value_enum, env = "BANK_RAG_EMBEDDER", default_value_t = EmbedderKind::Fastembed)]
    pub embedder: EmbedderKind,

    #[arg(long, value_enum, env = "BANK_RAG_GENERATOR", default_value_t = GeneratorKind::Openai)]
    pub generator: GeneratorKind,

    /// Root URL of the OpenAI-compatible server.
    #[arg(long, env = "BANK_RAG_GENERATOR_URL", default_value = "http://127.0.0.1:8080")]
    pub generator_url: String,

    #[arg(long, env = "BANK_RAG_GENERATOR_API_KEY", hide_env_values = true)]
    pub generator_api_key: Option<String>,

    /// Transport timeout for one generator request.
    #[arg(long, env = "BANK_RAG_GENERATION_TIMEOUT_SECS", default_value_t = 60)]
    pub generation_timeout_secs: u64,
}

impl Settings {
    /// The validated core configuration.
    pub fn rag_config(&self) -> anyhow::Result<RagConfig> {
        RagConfig::builder()
            .model_id(&self.model_id)
            .embedding_model_id(&self.embedding_model_id)
            .data_path(&self.data_path)
            .index_path((!self.no_persist).then(|| self.index_path.clone()))
            .reuse_index(self.reuse_index)
            .max_new_tokens(self.max_new_tokens)
            .temperature(self.temperature)
            .sampling_enabled(!self.no_sampling)
            .chunk_size(self.chunk_size)
            .chunk_overlap(self.chunk_overlap)
            .top_k(self.top_k)
            .min_score(self.min_score)
            .embed_batch_size(self.embed_batch_size)
            .generation_concurrency(self.generation_concurrency)
            .query_timeout(Duration::from_secs(self.query_timeout_secs))
            .build()
            .context("invalid pipeline settings")
    }

    /// Load the selected embedding backend for `config`.
    pub fn embedder(&self, config: &RagConfig) -> anyhow::Result<Arc<dyn Embedder>> {
        match self.embedder {
            EmbedderKind::Fastembed => {
                let embedder = bank_rag::onnx::FastEmbedder::new(&config.embedding_model_id)
                    .with_context(|| format!("failed to load embedding model {}", config.embedding_model_id))?;
                Ok(Arc::new(embedder))
            }
            EmbedderKind::Hashing => Ok(Arc::new(HashingEmbedder::default())),
        }
    }

    /// Connect the selected generation backend for `config`.
    pub fn generator(&self, config: &RagConfig) -> anyhow::Result<Arc<dyn Generator>> {
        match self.generator {
            GeneratorKind::Openai => {
                let generator = bank_rag::openai::OpenAiCompatGenerator::with_timeout(
                    &self.generator_url,
                    config.model_id.clone(),
                    Duration::from_secs(self.generation_timeout_secs),
                )?
                .with_api_key(self.generator_api_key.clone());
                Ok(Arc::new(generator))
            }
            GeneratorKind::Extractive => Ok(Arc::new(ExtractiveGenerator::new())),
        }
    }

    /// `RUST_LOG`-style filter used when the variable is unset.
    pub fn default_log_filter(&self) -> &'static str {
        if self.debug { "debug" } else { "info" }
    }
}

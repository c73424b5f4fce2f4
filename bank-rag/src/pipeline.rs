//! RAG pipeline orchestrator.
//!
//! The [`RagPipeline`] owns the two flows of the system:
//!
//! - **Index Build** (load → chunk → embed → index), run once by
//!   [`initialize`](RagPipeline::initialize) and again on demand by
//!   [`rebuild`](RagPipeline::rebuild);
//! - **Query** (embed → retrieve → assemble → generate), run per question
//!   by [`query`](RagPipeline::query) against the frozen index.
//!
//! Lifecycle is explicit: `Uninitialized → Indexing → Ready`, or
//! `Indexing → Failed`. `Failed` is terminal; a half-built index is never
//! served.
//!
//! # Example
//!
//! ```rust,ignore
//! use bank_rag::{CsvLoader, ExtractiveGenerator, HashingEmbedder, RagConfig, RagPipeline};
//!
//! let pipeline = RagPipeline::builder()
//!     .config(RagConfig::default())
//!     .loader(Arc::new(CsvLoader::new("data/faq.csv")))
//!     .embedder(Arc::new(HashingEmbedder::default()))
//!     .generator(Arc::new(ExtractiveGenerator::new()))
//!     .build()?;
//!
//! pipeline.initialize().await?;
//! let response = pipeline.query("What is the minimum balance?").await?;
//! ```

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Semaphore};
use tracing::{Instrument, error, info, info_span, instrument, warn};

use crate::chunking::{Chunker, FixedSizeChunker};
use crate::config::RagConfig;
use crate::document::Chunk;
use crate::embedding::Embedder;
use crate::error::{RagError, Result};
use crate::generator::{GenerationRequest, Generator};
use crate::index::{VectorIndex, VectorIndexEntry};
use crate::loader::DocumentLoader;
use crate::prompt;
use crate::retriever::Retriever;

/// Lifecycle state of a [`RagPipeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Uninitialized,
    Indexing,
    Ready,
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Indexing => "indexing",
            Self::Ready => "ready",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// The result of answering one question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RagResponse {
    /// The model output with surrounding whitespace removed.
    pub answer: String,
    /// The chunks the answer was conditioned on, in rank order.
    pub retrieved_chunks: Vec<Chunk>,
    /// The unmodified model output.
    pub raw_model_output: String,
}

/// Read-only system information.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SystemStatus {
    pub model_identifier: String,
    pub embedding_model_identifier: String,
    pub ready: bool,
    pub state: PipelineState,
}

struct Lifecycle {
    state: PipelineState,
    retriever: Option<Retriever>,
}

/// The RAG pipeline orchestrator.
///
/// Queries share nothing mutable: each one clones the current
/// [`Retriever`] (an `Arc` to the frozen index) and runs independently.
/// Generator calls are bounded by a semaphore sized from
/// [`RagConfig::generation_concurrency`]. Construct one via
/// [`RagPipeline::builder()`].
pub struct RagPipeline {
    config: RagConfig,
    loader: Arc<dyn DocumentLoader>,
    chunker: Arc<dyn Chunker>,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    generation_permits: Semaphore,
    lifecycle: RwLock<Lifecycle>,
    build_lock: Mutex<()>,
}

impl RagPipeline {
    /// Create a new [`RagPipelineBuilder`].
    pub fn builder() -> RagPipelineBuilder {
        RagPipelineBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// The current lifecycle state.
    pub fn state(&self) -> PipelineState {
        self.lifecycle.read().unwrap_or_else(PoisonError::into_inner).state
    }

    /// Configured model identifiers and readiness. No side effects.
    pub fn status(&self) -> SystemStatus {
        let state = self.state();
        SystemStatus {
            model_identifier: self.config.model_id.clone(),
            embedding_model_identifier: self.config.embedding_model_id.clone(),
            ready: state == PipelineState::Ready,
            state,
        }
    }

    /// Run Index Build and move to `Ready`.
    ///
    /// Only valid from `Uninitialized`. If any stage fails the pipeline
    /// moves to `Failed` and stays there.
    ///
    /// # Errors
    ///
    /// Returns the build error (`DataLoadError`, `EmbeddingUnavailable`,
    /// `DimensionMismatch`), or `InvalidInput` when called in another state.
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> Result<()> {
        let _build = self.build_lock.lock().await;
        {
            let mut lifecycle = self.lifecycle.write().unwrap_or_else(PoisonError::into_inner);
            if lifecycle.state != PipelineState::Uninitialized {
                return Err(RagError::InvalidInput(format!(
                    "initialize called in state {}",
                    lifecycle.state
                )));
            }
            lifecycle.state = PipelineState::Indexing;
        }

        let outcome = self.build_index(self.config.reuse_index).await;
        self.finish_build(outcome)
    }

    /// Build a fresh index and swap it in.
    ///
    /// The previous index keeps serving queries while the new one is built.
    /// A failed rebuild moves the pipeline to `Failed`.
    ///
    /// # Errors
    ///
    /// Returns the build error, or [`RagError::NotReady`] unless the
    /// pipeline is `Ready`.
    #[instrument(skip(self))]
    pub async fn rebuild(&self) -> Result<()> {
        let _build = self.build_lock.lock().await;
        let state = self.state();
        if state != PipelineState::Ready {
            return Err(RagError::NotReady { state: state.to_string() });
        }

        let outcome = self.build_index(false).await;
        self.finish_build(outcome)
    }

    fn finish_build(&self, outcome: Result<VectorIndex>) -> Result<()> {
        let mut lifecycle = self.lifecycle.write().unwrap_or_else(PoisonError::into_inner);
        match outcome {
            Ok(index) => {
                let retriever = Retriever::new(Arc::clone(&self.embedder), Arc::new(index))
                    .with_min_score(self.config.min_score);
                lifecycle.retriever = Some(retriever);
                lifecycle.state = PipelineState::Ready;
                info!("pipeline ready");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "index build failed");
                lifecycle.retriever = None;
                lifecycle.state = PipelineState::Failed;
                Err(e)
            }
        }
    }

    async fn build_index(&self, allow_snapshot: bool) -> Result<VectorIndex> {
        if allow_snapshot {
            if let Some(index) = self.restore_snapshot() {
                return Ok(index);
            }
        }

        let loader = Arc::clone(&self.loader);
        let documents = tokio::task::spawn_blocking(move || loader.load())
            .await
            .map_err(|e| RagError::DataLoadError {
                path: self.config.data_path.display().to_string(),
                message: format!("loader task failed: {e}"),
            })??;
        let chunks: Vec<Chunk> = documents.iter().flat_map(|doc| self.chunker.split(doc)).collect();
        info!(documents = documents.len(), chunks = chunks.len(), "chunked knowledge base");

        let mut index = VectorIndex::new(self.embedder.dimensions());
        for batch in chunks.chunks(self.config.embed_batch_size) {
            let texts: Vec<&str> = batch.iter().map(|c| c.text.as_str()).collect();
            let embeddings = self.embedder.embed_batch(&texts).await?;
            if embeddings.len() != batch.len() {
                return Err(RagError::EmbeddingUnavailable {
                    provider: self.embedder.model_id().to_string(),
                    message: format!("expected {} embeddings, got {}", batch.len(), embeddings.len()),
                });
            }
            let entries = batch
                .iter()
                .cloned()
                .zip(embeddings)
                .map(|(chunk, embedding)| VectorIndexEntry { embedding, chunk })
                .collect();
            index.add(entries)?;
        }
        info!(entries = index.len(), dimensions = index.dimensions(), "built vector index");

        if let Some(path) = &self.config.index_path {
            if let Err(e) = index.save(path, self.embedder.model_id()) {
                warn!(path = %path.display(), error = %e, "failed to persist vector index");
            }
        }
        Ok(index)
    }

    /// Load the persisted index if it was built by the current embedder.
    fn restore_snapshot(&self) -> Option<VectorIndex> {
        let path = self.config.index_path.as_ref().filter(|p| p.exists())?;
        match VectorIndex::load(path) {
            Ok((index, model))
                if model == self.embedder.model_id()
                    && index.dimensions() == self.embedder.dimensions() =>
            {
                Some(index)
            }
            Ok((_, model)) => {
                warn!(path = %path.display(), snapshot_model = %model, "persisted index built by a different embedder, rebuilding");
                None
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unreadable persisted index, rebuilding");
                None
            }
        }
    }

    fn ready_retriever(&self) -> Result<Retriever> {
        let lifecycle = self.lifecycle.read().unwrap_or_else(PoisonError::into_inner);
        match (&lifecycle.state, &lifecycle.retriever) {
            (PipelineState::Ready, Some(retriever)) => Ok(retriever.clone()),
            (state, _) => Err(RagError::NotReady { state: state.to_string() }),
        }
    }

    /// Answer one question: retrieve, assemble, generate.
    ///
    /// The question reaches the prompt verbatim; surrounding whitespace only
    /// matters for the blank check. The whole call is bounded by
    /// [`RagConfig::query_timeout`]. Dropping
    /// the returned future abandons the query without affecting others.
    ///
    /// # Errors
    ///
    /// - [`RagError::InvalidInput`] if `question` is blank;
    /// - [`RagError::NotReady`] outside the `Ready` state;
    /// - [`RagError::EmbeddingUnavailable`] / [`RagError::GenerationFailed`]
    ///   from the models;
    /// - [`RagError::Timeout`] when the deadline passes.
    #[instrument(skip(self, question), fields(question_len = question.len()))]
    pub async fn query(&self, question: &str) -> Result<RagResponse> {
        if question.trim().is_empty() {
            return Err(RagError::InvalidInput("question must not be empty".to_string()));
        }
        let retriever = self.ready_retriever()?;

        let deadline = self.config.query_timeout;
        match tokio::time::timeout(deadline, self.answer(&retriever, question)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout = ?deadline, "query timed out");
                Err(RagError::Timeout(deadline))
            }
        }
    }

    async fn answer(&self, retriever: &Retriever, question: &str) -> Result<RagResponse> {
        let retrieved = retriever
            .retrieve(question, self.config.top_k)
            .instrument(info_span!("retrieving"))
            .await?;

        let request = GenerationRequest::new(
            prompt::assemble(question, retrieved.chunks()),
            self.config.max_new_tokens,
            self.config.temperature,
            self.config.sampling_enabled,
        );

        let raw_model_output = async {
            let _permit = self.generation_permits.acquire().await.map_err(|_| {
                RagError::GenerationFailed {
                    generator: self.generator.model_id().to_string(),
                    message: "generation queue closed".to_string(),
                }
            })?;
            self.generator.generate(&request).await
        }
        .instrument(info_span!("generating"))
        .await?;

        info!(retrieved = retrieved.len(), output_len = raw_model_output.len(), "query answered");

        Ok(RagResponse {
            answer: raw_model_output.trim().to_string(),
            retrieved_chunks: retrieved.into_chunks(),
            raw_model_output,
        })
    }
}

/// Builder for constructing a [`RagPipeline`].
///
/// `config`, `loader`, `embedder` and `generator` are required. When no
/// chunker is given a [`FixedSizeChunker`] is built from the config.
#[derive(Default)]
pub struct RagPipelineBuilder {
    config: Option<RagConfig>,
    loader: Option<Arc<dyn DocumentLoader>>,
    chunker: Option<Arc<dyn Chunker>>,
    embedder: Option<Arc<dyn Embedder>>,
    generator: Option<Arc<dyn Generator>>,
}

impl RagPipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the knowledge base source.
    pub fn loader(mut self, loader: Arc<dyn DocumentLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Override the chunking strategy.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Set the embedding provider.
    pub fn embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Set the generation backend.
    pub fn generator(mut self, generator: Arc<dyn Generator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Build the [`RagPipeline`] in the `Uninitialized` state.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfiguration`] if a required field is
    /// missing or the config fails validation.
    pub fn build(self) -> Result<RagPipeline> {
        let config = self.config.ok_or_else(|| missing("config"))?;
        config.validate()?;
        let loader = self.loader.ok_or_else(|| missing("loader"))?;
        let embedder = self.embedder.ok_or_else(|| missing("embedder"))?;
        let generator = self.generator.ok_or_else(|| missing("generator"))?;
        let chunker = match self.chunker {
            Some(chunker) => chunker,
            None => Arc::new(FixedSizeChunker::new(config.chunk_size, config.chunk_overlap)?),
        };

        Ok(RagPipeline {
            generation_permits: Semaphore::new(config.generation_concurrency),
            config,
            loader,
            chunker,
            embedder,
            generator,
            lifecycle: RwLock::new(Lifecycle { state: PipelineState::Uninitialized, retriever: None }),
            build_lock: Mutex::new(()),
        })
    }
}

fn missing(field: &str) -> RagError {
    RagError::InvalidConfiguration(format!("{field} is required"))
}

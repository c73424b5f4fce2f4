//! # bank-rag
//!
//! Retrieval-augmented question answering over a banking FAQ.
//!
//! Reference question/answer pairs are loaded from CSV, split into
//! fixed-size chunks, embedded and stored in an exact in-memory vector
//! index. Each incoming question is embedded, matched against the index, and
//! answered by a language model prompted with the retrieved pairs.
//!
//! ## Components
//!
//! - [`CsvLoader`]: FAQ rows to [`Document`]s
//! - [`FixedSizeChunker`]: sliding character windows with overlap
//! - [`Embedder`]: [`HashingEmbedder`], or `onnx::FastEmbedder` with the
//!   `fastembed` feature
//! - [`VectorIndex`]: brute-force cosine k-NN
//! - [`Retriever`]: question in, [`RetrievalResult`] out
//! - [`prompt::assemble`]: the fixed generation template
//! - [`Generator`]: [`ExtractiveGenerator`], or
//!   `openai::OpenAiCompatGenerator` with the `openai` feature
//! - [`RagPipeline`]: lifecycle, index build and query orchestration
//!
//! ## Features
//!
//! - `fastembed` (default): local ONNX sentence embeddings
//! - `openai` (default): OpenAI-compatible completions generator

pub mod chunking;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod generator;
pub mod index;
pub mod loader;
pub mod pipeline;
pub mod prompt;
pub mod retriever;

#[cfg(feature = "fastembed")]
pub mod onnx;

#[cfg(feature = "openai")]
pub mod openai;

pub use chunking::{Chunker, FixedSizeChunker};
pub use config::{DEFAULT_EMBEDDING_MODEL_ID, DEFAULT_MODEL_ID, RagConfig, RagConfigBuilder};
pub use document::{Chunk, Document, QaPair, RetrievalResult, ScoredChunk};
pub use embedding::{Embedder, HashingEmbedder};
pub use error::{RagError, Result};
pub use generator::{ExtractiveGenerator, GenerationRequest, Generator, NO_ANSWER_DISCLAIMER};
pub use index::{VectorIndex, VectorIndexEntry, cosine_similarity};
pub use loader::{CsvLoader, DocumentLoader};
pub use pipeline::{PipelineState, RagPipeline, RagPipelineBuilder, RagResponse, SystemStatus};
pub use prompt::NO_CONTEXT_MARKER;
pub use retriever::Retriever;

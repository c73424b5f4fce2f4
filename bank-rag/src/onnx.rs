//! Local sentence embeddings through the `fastembed` ONNX runtime.
//!
//! This module is only available when the `fastembed` feature is enabled.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use tracing::{debug, error, info};

use crate::embedding::Embedder;
use crate::error::{RagError, Result};

const PROVIDER: &str = "fastembed";

/// An [`Embedder`] running a sentence-transformer model in-process.
///
/// `TextEmbedding` needs exclusive access while encoding, so calls are
/// serialized through a mutex and executed on the blocking thread pool.
///
/// # Example
///
/// ```rust,ignore
/// use bank_rag::onnx::FastEmbedder;
///
/// let embedder = FastEmbedder::new("all-MiniLM-L6-v2")?;
/// let embedding = embedder.embed("How do I reset my PIN?").await?;
/// assert_eq!(embedding.len(), 384);
/// ```
pub struct FastEmbedder {
    model: Arc<Mutex<TextEmbedding>>,
    model_id: String,
    dimensions: usize,
}

impl FastEmbedder {
    /// Load the named model, downloading it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmbeddingUnavailable`] if the identifier is not a
    /// supported model or the model cannot be initialized.
    pub fn new(model_id: &str) -> Result<Self> {
        let model = resolve_model(model_id).ok_or_else(|| unavailable(format!(
            "unsupported embedding model '{model_id}'"
        )))?;

        info!(model = model_id, "loading embedding model");
        let mut text_model = TextEmbedding::try_new(InitOptions::new(model)).map_err(|e| {
            error!(model = model_id, error = %e, "failed to load embedding model");
            unavailable(e.to_string())
        })?;

        let sample = text_model.embed(vec!["dimension check"], None).map_err(|e| unavailable(e.to_string()))?;
        let dimensions = sample
            .first()
            .map(Vec::len)
            .ok_or_else(|| unavailable("model returned no sample embedding"))?;
        info!(model = model_id, dimensions, "embedding model ready");

        Ok(Self { model: Arc::new(Mutex::new(text_model)), model_id: model_id.to_string(), dimensions })
    }
}

/// Map the short sentence-transformers names onto fastembed's model enum.
fn resolve_model(model_id: &str) -> Option<EmbeddingModel> {
    let name = model_id.rsplit('/').next().unwrap_or(model_id).to_ascii_lowercase();
    match name.as_str() {
        "all-minilm-l6-v2" => Some(EmbeddingModel::AllMiniLML6V2),
        "all-minilm-l12-v2" => Some(EmbeddingModel::AllMiniLML12V2),
        "bge-small-en-v1.5" => Some(EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Some(EmbeddingModel::BGEBaseENV15),
        "paraphrase-multilingual-minilm-l12-v2" => Some(EmbeddingModel::ParaphraseMLMiniLML12V2),
        _ => None,
    }
}

fn unavailable(message: impl Into<String>) -> RagError {
    RagError::EmbeddingUnavailable { provider: PROVIDER.to_string(), message: message.into() }
}

#[async_trait]
impl Embedder for FastEmbedder {
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(provider = PROVIDER, batch_size = texts.len(), "embedding batch");

        let owned: Vec<String> = texts.iter().map(|t| (*t).to_string()).collect();
        let expected = owned.len();
        let model = Arc::clone(&self.model);

        let vectors = tokio::task::spawn_blocking(move || {
            let mut model = model.lock().map_err(|_| unavailable("embedding model lock poisoned"))?;
            model.embed(owned, None).map_err(|e| unavailable(e.to_string()))
        })
        .await
        .map_err(|e| unavailable(format!("embedding task failed: {e}")))??;

        if vectors.len() != expected {
            return Err(unavailable(format!("expected {expected} embeddings, got {}", vectors.len())));
        }
        Ok(vectors)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

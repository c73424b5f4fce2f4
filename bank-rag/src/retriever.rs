//! Question-to-chunks retrieval over a frozen [`VectorIndex`].

use std::sync::Arc;

use tracing::{debug, error};

use crate::document::RetrievalResult;
use crate::embedding::Embedder;
use crate::error::Result;
use crate::index::VectorIndex;

/// Encodes questions and looks them up in a read-only index.
///
/// Cloning is cheap; clones share the embedder and the index.
#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<VectorIndex>,
    min_score: Option<f32>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<VectorIndex>) -> Self {
        Self { embedder, index, min_score: None }
    }

    /// Drop hits scoring below `threshold`.
    pub fn with_min_score(mut self, threshold: Option<f32>) -> Self {
        self.min_score = threshold;
        self
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    /// Return up to `k` chunks ranked by similarity to `question`.
    ///
    /// An empty index yields an empty result rather than an error; the
    /// prompt assembler then renders an explicit no-context marker.
    ///
    /// # Errors
    ///
    /// Propagates [`RagError::EmbeddingUnavailable`](crate::RagError) from
    /// the embedder and index query errors.
    pub async fn retrieve(&self, question: &str, k: usize) -> Result<RetrievalResult> {
        if self.index.is_empty() {
            debug!("index is empty, skipping retrieval");
            return Ok(RetrievalResult::empty());
        }

        let embedding = self.embedder.embed(question).await.map_err(|e| {
            error!(error = %e, "question embedding failed");
            e
        })?;

        let mut result = self.index.query(&embedding, k)?;
        if let Some(threshold) = self.min_score {
            result.retain_min_score(threshold);
        }
        debug!(hits = result.len(), top_score = result.hits().first().map(|h| h.score), "retrieved");
        Ok(result)
    }
}

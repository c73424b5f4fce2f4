//! In-memory vector index using exact cosine similarity.
//!
//! [`VectorIndex`] keeps every entry in insertion order and answers k-nearest
//! neighbor queries with a brute-force scan. For a knowledge base of a few
//! thousand chunks the scan is fast and exact, so no approximate structure
//! is used; an HNSW-style index is the upgrade path if the corpus grows.
//!
//! The index is append-only. `add` takes `&mut self`, so once the pipeline
//! freezes an index behind an `Arc` it can only be queried.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::document::{Chunk, RetrievalResult, ScoredChunk};
use crate::error::{RagError, Result};

/// One stored vector and the chunk it was computed from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorIndexEntry {
    pub embedding: Vec<f32>,
    pub chunk: Chunk,
}

/// An exact, brute-force vector index with a fixed dimensionality.
///
/// # Example
///
/// ```rust,ignore
/// use bank_rag::{VectorIndex, VectorIndexEntry};
///
/// let mut index = VectorIndex::new(384);
/// index.add(entries)?;
/// let result = index.query(&query_embedding, 4)?;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    dimensions: usize,
    entries: Vec<VectorIndexEntry>,
}

/// On-disk form of a [`VectorIndex`].
#[derive(Debug, Serialize, Deserialize)]
struct IndexSnapshot {
    embedding_model: String,
    dimensions: usize,
    entries: Vec<VectorIndexEntry>,
}

impl VectorIndex {
    /// Create an empty index accepting vectors of `dimensions` components.
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions, entries: Vec::new() }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append entries.
    ///
    /// Every entry is checked before any is stored, so a rejected batch
    /// leaves the index unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::DimensionMismatch`] if any embedding has the wrong
    /// length.
    pub fn add(&mut self, entries: Vec<VectorIndexEntry>) -> Result<()> {
        if let Some(bad) = entries.iter().find(|e| e.embedding.len() != self.dimensions) {
            return Err(RagError::DimensionMismatch {
                expected: self.dimensions,
                actual: bad.embedding.len(),
            });
        }
        self.entries.extend(entries);
        Ok(())
    }

    /// Return the `min(k, len)` entries most similar to `embedding`.
    ///
    /// Scores are cosine similarities; equal scores keep insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidInput`] if `k == 0` and
    /// [`RagError::DimensionMismatch`] if the query has the wrong length.
    pub fn query(&self, embedding: &[f32], k: usize) -> Result<RetrievalResult> {
        if k == 0 {
            return Err(RagError::InvalidInput("k must be greater than zero".to_string()));
        }
        if embedding.len() != self.dimensions {
            return Err(RagError::DimensionMismatch {
                expected: self.dimensions,
                actual: embedding.len(),
            });
        }

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(position, entry)| (position, cosine_similarity(&entry.embedding, embedding)))
            .collect();

        // Stable sort: ties stay in insertion order.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);

        debug!(candidates = self.entries.len(), returned = scored.len(), "index query");

        Ok(RetrievalResult::new(
            scored
                .into_iter()
                .map(|(position, score)| ScoredChunk {
                    chunk: self.entries[position].chunk.clone(),
                    score,
                })
                .collect(),
        ))
    }

    /// Write the index to `path` as JSON, tagged with the embedding model.
    ///
    /// The snapshot is written to a sibling temporary file and renamed into
    /// place, so readers never observe a partial file.
    pub fn save(&self, path: &Path, embedding_model: &str) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let snapshot = IndexSnapshot {
            embedding_model: embedding_model.to_string(),
            dimensions: self.dimensions,
            entries: self.entries.clone(),
        };
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec(&snapshot)?)?;
        fs::rename(&tmp, path)?;
        info!(path = %path.display(), entries = self.entries.len(), "persisted vector index");
        Ok(())
    }

    /// Restore an index written by [`save`](Self::save).
    ///
    /// Returns the index and the embedding model it was built with. Entry
    /// dimensions are re-validated.
    pub fn load(path: &Path) -> Result<(Self, String)> {
        let bytes = fs::read(path)?;
        let snapshot: IndexSnapshot = serde_json::from_slice(&bytes)?;
        let mut index = Self::new(snapshot.dimensions);
        index.add(snapshot.entries)?;
        info!(path = %path.display(), entries = index.len(), "restored vector index");
        Ok((index, snapshot.embedding_model))
    }
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude or contains NaN.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let similarity = dot / (norm_a * norm_b);
    if similarity.is_nan() { 0.0 } else { similarity }
}

//! Error types for the `bank-rag` crate.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while building the index or answering a question.
#[derive(Debug, Error)]
pub enum RagError {
    /// Chunking or pipeline parameters are inconsistent.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The embedding model could not be loaded or failed during inference.
    #[error("Embedding unavailable ({provider}): {message}")]
    EmbeddingUnavailable {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// A vector did not match the index dimensionality.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// The dimensionality of the index.
        expected: usize,
        /// The dimensionality of the offending vector.
        actual: usize,
    },

    /// The generation model errored or returned nothing usable.
    #[error("Generation failed ({generator}): {message}")]
    GenerationFailed {
        /// The generator that produced the error.
        generator: String,
        /// A description of the failure.
        message: String,
    },

    /// A query did not finish within its deadline.
    #[error("Query timed out after {0:?}")]
    Timeout(Duration),

    /// The FAQ source is missing or malformed.
    #[error("Failed to load data from {path}: {message}")]
    DataLoadError {
        /// The source path.
        path: String,
        /// A description of the failure.
        message: String,
    },

    /// The caller passed an argument the core cannot act on.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The pipeline is not in the `Ready` state.
    #[error("Pipeline is not ready (state: {state})")]
    NotReady {
        /// The lifecycle state the pipeline was in.
        state: String,
    },

    /// Filesystem error while persisting or restoring the index.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Index snapshot (de)serialization error.
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl RagError {
    /// A stable, machine-readable code for this error.
    ///
    /// Boundary layers expose this code instead of the formatted message so
    /// that internal details never reach end users.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::NotReady { .. } => "not_ready",
            Self::EmbeddingUnavailable { .. } => "embedding_unavailable",
            Self::GenerationFailed { .. } => "generation_failed",
            Self::Timeout(_) => "timeout",
            Self::InvalidConfiguration(_)
            | Self::DimensionMismatch { .. }
            | Self::DataLoadError { .. }
            | Self::Io(_)
            | Self::Serialization(_) => "internal_error",
        }
    }

    /// Whether this error only affects the current query.
    ///
    /// Everything else is a startup or invariant failure.
    pub fn is_query_level(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput(_)
                | Self::NotReady { .. }
                | Self::EmbeddingUnavailable { .. }
                | Self::GenerationFailed { .. }
                | Self::Timeout(_)
        )
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;

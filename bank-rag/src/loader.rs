//! Knowledge base loading.
//!
//! [`CsvLoader`] reads FAQ rows from a CSV file with (at least) a `question`
//! and an `answer` column. Rows missing either value are skipped with a
//! warning; a missing file or header is a hard [`RagError::DataLoadError`].

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::document::Document;
use crate::error::{RagError, Result};

/// A source of FAQ documents for index build.
pub trait DocumentLoader: Send + Sync {
    /// Load every valid document from the source.
    fn load(&self) -> Result<Vec<Document>>;
}

/// Documents already in memory, used as-is.
impl DocumentLoader for Vec<Document> {
    fn load(&self) -> Result<Vec<Document>> {
        Ok(self.clone())
    }
}

/// Loads FAQ documents from a UTF-8 CSV file.
///
/// Header names are matched case-insensitively after trimming; other
/// columns are ignored. Document IDs are `faq-{row}` with 1-based data rows.
#[derive(Debug, Clone)]
pub struct CsvLoader {
    path: PathBuf,
}

impl CsvLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_error(&self, message: impl Into<String>) -> RagError {
        RagError::DataLoadError { path: self.path.display().to_string(), message: message.into() }
    }
}

impl DocumentLoader for CsvLoader {
    fn load(&self) -> Result<Vec<Document>> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(&self.path)
            .map_err(|e| self.load_error(e.to_string()))?;

        let headers = reader.headers().map_err(|e| self.load_error(e.to_string()))?.clone();
        let column = |name: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(name));
        let question_col =
            column("question").ok_or_else(|| self.load_error("missing 'question' column"))?;
        let answer_col =
            column("answer").ok_or_else(|| self.load_error("missing 'answer' column"))?;

        let mut documents = Vec::new();
        let mut skipped = 0usize;

        for (index, record) in reader.records().enumerate() {
            let row = index + 1;
            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    warn!(path = %self.path.display(), row, error = %e, "skipping unreadable row");
                    skipped += 1;
                    continue;
                }
            };

            let question = record.get(question_col).filter(|v| !v.is_empty());
            let answer = record.get(answer_col).filter(|v| !v.is_empty());
            match (question, answer) {
                (Some(question), Some(answer)) => {
                    documents.push(Document::new(format!("faq-{row}"), question, answer));
                }
                _ => {
                    warn!(path = %self.path.display(), row, "skipping row without question or answer");
                    skipped += 1;
                }
            }
        }

        info!(path = %self.path.display(), documents = documents.len(), skipped, "loaded knowledge base");
        Ok(documents)
    }
}

//! Data types for FAQ documents, chunks, and retrieval results.

use serde::{Deserialize, Serialize};

/// A single FAQ entry loaded from the knowledge base.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Document {
    /// Unique identifier for the document.
    pub id: String,
    /// The reference question.
    pub question: String,
    /// The reference answer.
    pub answer: String,
    /// Where the entry came from. For CSV sources this is the question text.
    pub source_ref: String,
}

impl Document {
    /// Create a document whose `source_ref` is its question.
    pub fn new(id: impl Into<String>, question: impl Into<String>, answer: impl Into<String>) -> Self {
        let question = question.into();
        Self { id: id.into(), source_ref: question.clone(), question, answer: answer.into() }
    }

    /// The indexable text: both fields in the `question:`/`answer:` layout
    /// understood by [`QaPair::parse`].
    pub fn text(&self) -> String {
        format!("{QUESTION_PREFIX} {}\n{ANSWER_PREFIX} {}", self.question, self.answer)
    }
}

/// A bounded window of a [`Document`]'s text.
///
/// Offsets count characters (Unicode scalar values), not bytes, so
/// `end_offset - start_offset` never exceeds the configured chunk size.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    /// Unique identifier, `{document_id}_{chunk_index}`.
    pub id: String,
    /// The ID of the parent [`Document`].
    pub document_id: String,
    /// The text content of the chunk.
    pub text: String,
    /// Character offset of the first character, inclusive.
    pub start_offset: usize,
    /// Character offset one past the last character.
    pub end_offset: usize,
}

impl Chunk {
    /// Number of characters covered by this chunk.
    pub fn char_len(&self) -> usize {
        self.end_offset - self.start_offset
    }
}

/// A retrieved [`Chunk`] paired with its similarity score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredChunk {
    /// The retrieved chunk.
    pub chunk: Chunk,
    /// Cosine similarity to the query (higher is more relevant).
    pub score: f32,
}

/// Chunks returned for one query, ordered by descending score.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RetrievalResult {
    hits: Vec<ScoredChunk>,
}

impl RetrievalResult {
    /// Wrap hits that are already sorted by descending score.
    pub fn new(hits: Vec<ScoredChunk>) -> Self {
        debug_assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
        Self { hits }
    }

    /// An empty result, returned when there is nothing to search.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// The hits in rank order.
    pub fn hits(&self) -> &[ScoredChunk] {
        &self.hits
    }

    /// The chunks in rank order, without scores.
    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.hits.iter().map(|hit| &hit.chunk)
    }

    /// Keep only hits scoring at least `threshold`.
    pub fn retain_min_score(&mut self, threshold: f32) {
        self.hits.retain(|hit| hit.score >= threshold);
    }

    pub fn into_chunks(self) -> Vec<Chunk> {
        self.hits.into_iter().map(|hit| hit.chunk).collect()
    }
}

impl IntoIterator for RetrievalResult {
    type Item = ScoredChunk;
    type IntoIter = std::vec::IntoIter<ScoredChunk>;

    fn into_iter(self) -> Self::IntoIter {
        self.hits.into_iter()
    }
}

const QUESTION_PREFIX: &str = "question:";
const ANSWER_PREFIX: &str = "answer:";

/// A question/answer pair recovered from chunk text.
///
/// Structured text has a line starting with `question:` followed by a line
/// starting with `answer:` (prefixes are matched case-insensitively after
/// leading whitespace). The answer runs from its prefix to the end of the
/// text, so multi-line answers survive. Chunks cut from the middle of a
/// document usually lack one of the prefixes and do not parse.
///
/// The text is split at the first `answer:` line after the question. A
/// multi-line question whose own continuation line starts with `answer:`
/// is therefore cut short, and the remainder is read as the answer. Answers
/// containing such a line are unaffected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QaPair<'a> {
    pub question: &'a str,
    pub answer: &'a str,
}

impl<'a> QaPair<'a> {
    /// Parse structured text, returning `None` when either part is missing
    /// or the answer is blank.
    pub fn parse(text: &'a str) -> Option<Self> {
        let question_at = line_starting_with(text, 0, QUESTION_PREFIX)?;
        let question_body = question_at + QUESTION_PREFIX.len();
        let answer_at = line_starting_with(text, question_body, ANSWER_PREFIX)?;

        let question = text[question_body..answer_at].trim();
        let answer = text[answer_at + ANSWER_PREFIX.len()..].trim();
        if answer.is_empty() {
            return None;
        }
        Some(Self { question, answer })
    }
}

/// Byte offset of `prefix` at the start of a line at or after `from`.
fn line_starting_with(text: &str, from: usize, prefix: &str) -> Option<usize> {
    let mut line_start = from;
    for line in text[from..].split_inclusive('\n') {
        let trimmed = line.trim_start();
        let indent = line.len() - trimmed.len();
        let at_line_start = line_start == 0 || text.as_bytes()[line_start - 1] == b'\n';
        if at_line_start
            && trimmed.len() >= prefix.len()
            && trimmed.is_char_boundary(prefix.len())
            && trimmed[..prefix.len()].eq_ignore_ascii_case(prefix)
        {
            return Some(line_start + indent);
        }
        line_start += line.len();
    }
    None
}

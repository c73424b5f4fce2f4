//! Prompt assembly.
//!
//! The template follows the Phi-3 chat layout: a user turn holding the
//! instructions, a `CONTEXT:` section and a `QUESTION:` section, then an
//! empty assistant turn that tells the model to start answering.

use crate::document::{Chunk, QaPair};

/// Marker placed in the `CONTEXT:` section when nothing was retrieved.
pub const NO_CONTEXT_MARKER: &str = "No context available.";

/// Header of the context section.
pub const CONTEXT_HEADER: &str = "CONTEXT:";

/// Header of the question section.
pub const QUESTION_HEADER: &str = "QUESTION:";

const INSTRUCTIONS: &str = "You are a helpful banking customer service assistant. \
Use the following pieces of context to answer the question at the end.\n\
If you don't know the answer, just say that you don't have enough information. \
Be concise and professional.";

/// Build the generation prompt for `question` over `chunks`.
///
/// Chunks that parse as a [`QaPair`] are rendered as `question:`/`answer:`
/// lines so the model can read off the reference answer; any other chunk
/// text is included verbatim. Chunks are separated by a blank line.
pub fn assemble<'a>(question: &str, chunks: impl IntoIterator<Item = &'a Chunk>) -> String {
    let rendered: Vec<String> = chunks.into_iter().map(|chunk| render_chunk(&chunk.text)).collect();
    let context = if rendered.is_empty() { NO_CONTEXT_MARKER.to_string() } else { rendered.join("\n\n") };

    format!(
        "<|user|>\n{INSTRUCTIONS}\n\n{CONTEXT_HEADER}\n{context}\n\n{QUESTION_HEADER}\n{question}\n<|end|>\n<|assistant|>\n"
    )
}

fn render_chunk(text: &str) -> String {
    match QaPair::parse(text) {
        Some(pair) => format!("question: {}\nanswer: {}", pair.question, pair.answer),
        None => text.to_string(),
    }
}

/// The text of the `CONTEXT:` section of a prompt built by [`assemble`].
pub fn context_section(prompt: &str) -> Option<&str> {
    let start = prompt.find(&format!("\n{CONTEXT_HEADER}\n"))? + CONTEXT_HEADER.len() + 2;
    let end = start + prompt[start..].rfind(&format!("\n\n{QUESTION_HEADER}\n"))?;
    Some(&prompt[start..end])
}

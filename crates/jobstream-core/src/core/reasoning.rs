//! Paragraph-boundary buffering for reasoning summaries.
//!
//! Reasoning summaries arrive as raw character chunks. The only paragraph
//! terminators are blank lines inside the text or an explicit boundary event,
//! so chunks are held here until a paragraph is known to be complete.

use std::sync::LazyLock;

use regex::Regex;

static PARAGRAPH_BREAK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n").expect("paragraph regex is valid"));

/// Collapses a paragraph onto one line. Returns `None` for blank input.
pub fn normalize_paragraph(text: &str) -> Option<String> {
    let line = text.split_whitespace().collect::<Vec<_>>().join(" ");
    (!line.is_empty()).then_some(line)
}

/// Splits completed paragraphs off the front of `buffer`.
///
/// Without `force`, text after the last blank-line boundary stays in the
/// buffer for later chunks. With `force`, the remainder is flushed too and
/// the buffer is left empty.
pub fn flush(buffer: &mut String, force: bool) -> Vec<String> {
    let split_at = if force {
        buffer.len()
    } else {
        match PARAGRAPH_BREAK_RE.find_iter(buffer.as_str()).last() {
            Some(m) => m.end(),
            None => return Vec::new(),
        }
    };

    let completed: String = buffer.drain(..split_at).collect();
    PARAGRAPH_BREAK_RE
        .split(&completed)
        .filter_map(normalize_paragraph)
        .collect()
}

/// Pending reasoning text plus the summary it belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReasoningBuffer {
    buffer: String,
    summary_index: Option<u64>,
}

impl ReasoningBuffer {
    pub fn push(&mut self, delta: &str) {
        self.buffer.push_str(delta);
    }

    pub fn flush(&mut self, force: bool) -> Vec<String> {
        flush(&mut self.buffer, force)
    }

    pub fn summary_index(&self) -> Option<u64> {
        self.summary_index
    }

    pub fn set_summary_index(&mut self, index: Option<u64>) {
        self.summary_index = index;
    }

    /// Text not yet flushed.
    pub fn pending(&self) -> &str {
        &self.buffer
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

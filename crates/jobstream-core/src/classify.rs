//! Token-stream classifier.
//!
//! Splits accumulated stream text (either the rendered agent narrative or raw
//! terminal output) into typed blocks for the stream view. Classification is
//! recomputed over the whole text on every call; the text is capped upstream,
//! and whole-text correctness matters more than incremental cost.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::text::clean_terminal_text;
use crate::vocab::THINKING_LABEL;

static STAGE_MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*【([^】]+)】").expect("stage marker regex is valid"));

static RESULT_MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\[结果\]").expect("result marker regex is valid"));

static USAGE_MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Token\s*统计").expect("usage marker regex is valid"));

static BACKEND_RETRY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)attempt\s+(\d+)\s+failed(?:\s*,\s*retrying\s*\(([^)]*)\))?")
        .expect("backend retry regex is valid")
});

static NOISE_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:MODE=.*|exit=-?\d+\s*)$").expect("noise regex is valid")
});

/// `$ cmd`, `❯ cmd`, `user@host:~/dir$ cmd` style prompt echoes.
static PROMPT_ECHO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:[$❯]\s|[\w.-]+@[\w.-]+(?::\S*)?[$#](?:\s|$))")
        .expect("prompt regex is valid")
});

/// Quoted tags, or bare upper-case tags at end of line / before a redirect,
/// so `cout << MOD << endl` in echoed code is not taken for a here-doc.
static HEREDOC_START_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<<-?\s*(?:'([A-Za-z_]\w*)'|"([A-Za-z_]\w*)"|([A-Z][A-Z0-9_]+)(?:\s*$|\s+>))"#)
        .expect("heredoc regex is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenStreamKind {
    Thinking,
    Stage,
    Result,
    Usage,
    Backend,
    Other,
}

impl TokenStreamKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TokenStreamKind::Thinking => "thinking",
            TokenStreamKind::Stage => "stage",
            TokenStreamKind::Result => "result",
            TokenStreamKind::Usage => "usage",
            TokenStreamKind::Backend => "backend",
            TokenStreamKind::Other => "other",
        }
    }
}

/// One typed block of stream text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenStreamItem {
    pub kind: TokenStreamKind,
    pub title: String,
    pub content: String,
}

/// Cleans stream text for display: terminal escapes, shell-echo noise and
/// here-doc bodies removed, runs of blank lines collapsed.
pub fn clean_stream_text(raw: &str) -> String {
    let text = clean_terminal_text(raw);
    let mut kept: Vec<&str> = Vec::new();
    let mut heredoc_tag: Option<String> = None;

    for line in text.lines() {
        if let Some(tag) = &heredoc_tag {
            if line.trim() == tag {
                heredoc_tag = None;
            }
            continue;
        }
        if let Some(caps) = HEREDOC_START_RE.captures(line) {
            heredoc_tag = caps
                .get(1)
                .or_else(|| caps.get(2))
                .or_else(|| caps.get(3))
                .map(|m| m.as_str().to_string());
        }
        if NOISE_LINE_RE.is_match(line) || PROMPT_ECHO_RE.is_match(line) {
            continue;
        }
        let blank = line.trim().is_empty();
        if blank && kept.last().is_none_or(|prev| prev.trim().is_empty()) {
            continue;
        }
        kept.push(line.trim_end());
    }

    kept.join("\n").trim().to_string()
}

fn is_boundary(line: &str) -> bool {
    STAGE_MARKER_RE.is_match(line)
        || RESULT_MARKER_RE.is_match(line)
        || USAGE_MARKER_RE.is_match(line)
        || BACKEND_RETRY_RE.is_match(line)
}

/// Splits stream text into typed blocks.
///
/// Returns an empty list when nothing usable remains after cleaning; callers
/// then show [`clean_stream_text`] as-is.
pub fn classify(raw: &str) -> Vec<TokenStreamItem> {
    let cleaned = clean_stream_text(raw);
    if cleaned.is_empty() {
        return Vec::new();
    }

    let mut blocks: Vec<Vec<&str>> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in cleaned.lines() {
        if is_boundary(line) && !current.is_empty() {
            blocks.push(std::mem::take(&mut current));
        }
        current.push(line);
    }
    if !current.is_empty() {
        blocks.push(current);
    }

    blocks
        .iter()
        .filter(|lines| lines.iter().any(|l| !l.trim().is_empty()))
        .enumerate()
        .map(|(idx, lines)| classify_block(idx + 1, lines))
        .collect()
}

fn classify_block(position: usize, lines: &[&str]) -> TokenStreamItem {
    let head_idx = lines
        .iter()
        .position(|l| !l.trim().is_empty())
        .unwrap_or_default();
    let head = lines[head_idx];
    let rest = &lines[head_idx + 1..];
    let whole = lines.join("\n").trim().to_string();

    let body_after = |marker_end: usize| -> String {
        let mut parts = vec![head[marker_end..].trim()];
        parts.extend(rest.iter().copied());
        parts.join("\n").trim().to_string()
    };

    if let Some(caps) = STAGE_MARKER_RE.captures(head) {
        let label = caps[1].trim().to_string();
        let content = body_after(caps.get(0).map_or(0, |m| m.end()));
        let kind = if label == THINKING_LABEL {
            TokenStreamKind::Thinking
        } else {
            TokenStreamKind::Stage
        };
        return TokenStreamItem {
            kind,
            title: label,
            content,
        };
    }

    if let Some(m) = RESULT_MARKER_RE.find(head) {
        return TokenStreamItem {
            kind: TokenStreamKind::Result,
            title: "结果".to_string(),
            content: body_after(m.end()),
        };
    }

    if USAGE_MARKER_RE.is_match(head) {
        return TokenStreamItem {
            kind: TokenStreamKind::Usage,
            title: "Token 统计".to_string(),
            content: whole,
        };
    }

    if let Some(caps) = BACKEND_RETRY_RE.captures(head) {
        let attempt = &caps[1];
        let title = match caps.get(2).map(|m| m.as_str().trim()) {
            Some(mode) if !mode.is_empty() => format!("第 {attempt} 次尝试失败，重试（{mode}）"),
            _ => format!("第 {attempt} 次尝试失败"),
        };
        return TokenStreamItem {
            kind: TokenStreamKind::Backend,
            title,
            content: whole,
        };
    }

    TokenStreamItem {
        kind: TokenStreamKind::Other,
        title: format!("#{position}"),
        content: whole,
    }
}

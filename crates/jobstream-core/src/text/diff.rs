//! Unified diff line classifier.
//!
//! Turns diff text into rows annotated with old/new line numbers so a
//! renderer can draw a two-gutter view. Parsing never fails: anything that
//! does not look like a diff comes back as `Other` rows.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

static HUNK_HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@").expect("hunk regex is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffLineKind {
    /// File headers (`diff --git`, `index`, `---`, `+++`).
    Meta,
    /// `@@ ... @@` hunk header.
    Hunk,
    Add,
    Del,
    Ctx,
    Other,
}

/// One classified row of a unified diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffLine {
    pub kind: DiffLineKind,
    pub old_line: Option<u32>,
    pub new_line: Option<u32>,
    /// The raw line, prefix included.
    pub text: String,
}

impl DiffLine {
    fn bare(kind: DiffLineKind, text: &str) -> Self {
        Self {
            kind,
            old_line: None,
            new_line: None,
            text: text.to_string(),
        }
    }
}

/// Cursor state inside a hunk.
///
/// `None` cursors come from a malformed header: rows are still typed but
/// carry no line numbers.
#[derive(Debug, Clone, Copy)]
struct Hunk {
    old_next: Option<u32>,
    new_next: Option<u32>,
    old_remaining: Option<u32>,
    new_remaining: Option<u32>,
}

impl Hunk {
    fn parse(header: &str) -> Self {
        let Some(caps) = HUNK_HEADER_RE.captures(header) else {
            return Self {
                old_next: None,
                new_next: None,
                old_remaining: None,
                new_remaining: None,
            };
        };
        let num = |idx: usize| caps.get(idx).and_then(|m| m.as_str().parse::<u32>().ok());
        Self {
            old_next: num(1),
            old_remaining: Some(num(2).unwrap_or(1)),
            new_next: num(3),
            new_remaining: Some(num(4).unwrap_or(1)),
        }
    }

    /// True while the header's line counts say more body lines follow.
    /// Unknown counts never close the hunk on their own.
    fn expects_more(&self) -> bool {
        match (self.old_remaining, self.new_remaining) {
            (Some(old), Some(new)) => old > 0 || new > 0,
            _ => true,
        }
    }

    fn has_known_counts(&self) -> bool {
        self.old_remaining.is_some() && self.new_remaining.is_some()
    }

    fn take_old(&mut self) -> Option<u32> {
        let line = self.old_next;
        self.old_next = self.old_next.and_then(|n| n.checked_add(1));
        self.old_remaining = self.old_remaining.map(|n| n.saturating_sub(1));
        line
    }

    fn take_new(&mut self) -> Option<u32> {
        let line = self.new_next;
        self.new_next = self.new_next.and_then(|n| n.checked_add(1));
        self.new_remaining = self.new_remaining.map(|n| n.saturating_sub(1));
        line
    }
}

fn is_meta_line(line: &str) -> bool {
    line.starts_with("+++")
        || line.starts_with("---")
        || line.starts_with("diff --git")
        || line.starts_with("index ")
}

/// Parses unified diff text into classified rows.
pub fn parse_unified_diff(diff_text: &str) -> Vec<DiffLine> {
    let mut rows = Vec::new();
    let mut hunk: Option<Hunk> = None;

    for line in diff_text.lines() {
        // With trustworthy counts, a body line like "--- x" (a deleted "-- x")
        // is still part of the hunk rather than a file header.
        let inside_counted_hunk = hunk.is_some_and(|h| h.has_known_counts() && h.expects_more());

        if !inside_counted_hunk {
            if is_meta_line(line) {
                hunk = None;
                rows.push(DiffLine::bare(DiffLineKind::Meta, line));
                continue;
            }
            if line.starts_with("@@") {
                hunk = Some(Hunk::parse(line));
                rows.push(DiffLine::bare(DiffLineKind::Hunk, line));
                continue;
            }
        }

        let Some(active) = hunk.as_mut().filter(|h| h.expects_more()) else {
            rows.push(loose_row(line));
            continue;
        };

        let row = if line.starts_with('\\') {
            DiffLine::bare(DiffLineKind::Other, line)
        } else if line.starts_with('+') {
            DiffLine {
                kind: DiffLineKind::Add,
                old_line: None,
                new_line: active.take_new(),
                text: line.to_string(),
            }
        } else if line.starts_with('-') {
            DiffLine {
                kind: DiffLineKind::Del,
                old_line: active.take_old(),
                new_line: None,
                text: line.to_string(),
            }
        } else if line.starts_with(' ') || line.is_empty() {
            DiffLine {
                kind: DiffLineKind::Ctx,
                old_line: active.take_old(),
                new_line: active.take_new(),
                text: line.to_string(),
            }
        } else {
            hunk = None;
            loose_row(line)
        };
        rows.push(row);
    }

    while rows.last().is_some_and(|row| row.text.trim().is_empty()) {
        rows.pop();
    }
    rows
}

/// Rows outside any hunk keep a loose add/del typing but no numbers.
fn loose_row(line: &str) -> DiffLine {
    let kind = if line.starts_with('+') {
        DiffLineKind::Add
    } else if line.starts_with('-') {
        DiffLineKind::Del
    } else {
        DiffLineKind::Other
    };
    DiffLine::bare(kind, line)
}

//! ANSI escape and control-byte stripping for terminal output.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

/// CSI sequences, OSC sequences (BEL or ST terminated) and two-byte escapes.
static ANSI_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1b\[[0-?]*[ -/]*[@-~]|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)|\x1b[@-_]")
        .expect("ansi regex is valid")
});

/// Removes ANSI escape sequences.
///
/// Returns a borrowed string when the input contains no escape byte.
pub fn strip_ansi(s: &str) -> Cow<'_, str> {
    if !s.contains('\x1b') {
        return Cow::Borrowed(s);
    }
    // A lone ESC that did not form a sequence is still a control byte.
    Cow::Owned(ANSI_RE.replace_all(s, "").replace('\x1b', ""))
}

/// Removes control characters other than newline and tab.
pub fn strip_control(s: &str) -> Cow<'_, str> {
    if s.chars().all(|c| !c.is_control() || c == '\n' || c == '\t') {
        return Cow::Borrowed(s);
    }
    Cow::Owned(
        s.chars()
            .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
            .collect(),
    )
}

/// Full terminal cleanup: escapes stripped, `\r\n` folded to `\n`, stray
/// control bytes removed.
pub fn clean_terminal_text(raw: &str) -> String {
    let without_ansi = strip_ansi(raw);
    let normalized = without_ansi.replace("\r\n", "\n");
    strip_control(&normalized).into_owned()
}

/// Keeps only the last `max_chars` characters of `text`.
pub fn cap_tail(text: &mut String, max_chars: usize) {
    let total = text.chars().count();
    if total <= max_chars {
        return;
    }
    let excess = total - max_chars;
    let cut = text
        .char_indices()
        .nth(excess)
        .map_or(text.len(), |(idx, _)| idx);
    text.drain(..cut);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_ansi_removes_csi_and_osc() {
        let input = "\x1b[1;31mred\x1b[0m \x1b]0;title\x07plain\x1b[2K";
        assert_eq!(strip_ansi(input), "red plain");
    }

    #[test]
    fn test_strip_ansi_borrows_clean_input() {
        assert!(matches!(strip_ansi("clean"), Cow::Borrowed("clean")));
    }

    #[test]
    fn test_strip_ansi_drops_dangling_escape() {
        assert_eq!(strip_ansi("abc\x1b"), "abc");
    }

    #[test]
    fn test_clean_terminal_text_normalizes_line_endings() {
        assert_eq!(
            clean_terminal_text("line1\r\nline2\x07\x00\n\tindented"),
            "line1\nline2\n\tindented"
        );
    }

    #[test]
    fn test_cap_tail_respects_char_boundaries() {
        let mut text = "思考abc".to_string();
        cap_tail(&mut text, 4);
        assert_eq!(text, "考abc");

        let mut short = "ab".to_string();
        cap_tail(&mut short, 10);
        assert_eq!(short, "ab");
    }
}

//! Text utilities shared by the stream and artifact paths.

pub mod ansi;
pub mod diff;

pub use ansi::{cap_tail, clean_terminal_text, strip_ansi, strip_control};
pub use diff::{DiffLine, DiffLineKind, parse_unified_diff};

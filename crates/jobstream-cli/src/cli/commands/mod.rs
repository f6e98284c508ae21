//! CLI command handlers.

pub mod classify;
pub mod config;
pub mod diff;
pub mod replay;

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

/// Reads a text file, replacing invalid UTF-8 instead of failing.
fn read_lossy(path: &Path) -> Result<String> {
    let bytes = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

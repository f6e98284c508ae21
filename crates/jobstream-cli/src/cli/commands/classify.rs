//! Classify a terminal log.

use std::path::Path;

use anyhow::{Context, Result};
use jobstream_core::classify::{classify, clean_stream_text};

pub fn run(path: &Path, json: bool) -> Result<()> {
    let raw = super::read_lossy(path)?;
    let items = classify(&raw);

    if json {
        let out = serde_json::to_string_pretty(&items).context("serialize blocks")?;
        println!("{out}");
        return Ok(());
    }

    if items.is_empty() {
        let cleaned = clean_stream_text(&raw);
        if !cleaned.is_empty() {
            println!("{cleaned}");
        }
        return Ok(());
    }
    for item in &items {
        println!("[{}] {}", item.kind.as_str(), item.title);
        if !item.content.is_empty() {
            println!("{}", item.content);
        }
        println!();
    }
    Ok(())
}

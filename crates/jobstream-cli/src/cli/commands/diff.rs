//! Number the rows of a unified diff.

use std::path::Path;

use anyhow::{Context, Result};
use jobstream_core::text::parse_unified_diff;

fn gutter(n: Option<u32>) -> String {
    n.map_or_else(String::new, |n| n.to_string())
}

pub fn run(path: &Path, json: bool) -> Result<()> {
    let text = super::read_lossy(path)?;
    let rows = parse_unified_diff(&text);

    if json {
        let out = serde_json::to_string_pretty(&rows).context("serialize diff rows")?;
        println!("{out}");
        return Ok(());
    }

    for row in &rows {
        println!(
            "{:>5} {:>5} | {}",
            gutter(row.old_line),
            gutter(row.new_line),
            row.text
        );
    }
    Ok(())
}

//! Config command handlers.

use anyhow::{Result, bail};
use jobstream_core::config::{self, Config};

pub fn path() -> Result<()> {
    let Some(path) = config::paths::config_path() else {
        bail!("Could not determine config directory; set JOBSTREAM_HOME");
    };
    println!("{}", path.display());
    Ok(())
}

pub fn show(config: &Config) -> Result<()> {
    print!("{}", config.to_toml()?);
    Ok(())
}

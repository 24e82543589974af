//! Configuration-file loading, including the missing-file fallback: an
//! unspecified default path that doesn't exist falls back to built-in
//! defaults with a warning; an explicitly-given `--conf` path that doesn't
//! exist is startup-fatal.

use std::path::Path;

use anyhow::{Context, Result};
use gmond_core::GmondConfig;

pub fn load(path: &Path, was_explicit: bool) -> Result<GmondConfig> {
    if !path.exists() {
        if was_explicit {
            anyhow::bail!("configuration file {} not found", path.display());
        }
        eprintln!(
            "warning: configuration file {} not found, using built-in defaults",
            path.display()
        );
        return Ok(GmondConfig::default_example());
    }

    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read configuration file {}", path.display()))?;
    GmondConfig::from_toml_str(&text)
        .with_context(|| format!("failed to parse configuration file {}", path.display()))
}

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

/// `$TAGLINE_HOME`, or `~/.tagline`.
pub fn tagline_home() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os("TAGLINE_HOME").filter(|d| !d.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    let home = std::env::var("HOME").context("HOME is not set")?;
    Ok(PathBuf::from(home).join(".tagline"))
}

pub fn ensure_tagline_home() -> Result<PathBuf> {
    let dir = tagline_home()?;
    fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    Ok(dir)
}

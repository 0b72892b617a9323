//! Site data loading for template rendering.
//!
//! One JSON file, `<data-dir>/site.json`, is read at the start of every
//! template pass. Every template depends on it, so a missing or malformed
//! file aborts the pass instead of being papered over.

use crate::registry::PathRegistry;
use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use std::fs;

/// Fixed file name of the site data file inside the data directory
pub const SITE_DATA_FILE: &str = "site.json";

/// Read and parse `site.json`. Fatal for the calling pass on failure.
pub fn load_site_data(registry: &PathRegistry) -> Result<Value> {
    let path = registry.data_dir().join(SITE_DATA_FILE);
    let raw = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read site data: {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Invalid JSON in site data: {}", path.display()))
}

/// Per-file render context handed to the template engine.
///
/// Created fresh for every source file on every pass; never persisted.
#[derive(Debug, Serialize)]
pub struct RenderContext<'a> {
    /// Parsed `site.json`, structure opaque to the pipeline
    pub site: &'a Value,
    /// Output path relative to the destination root, forward slashes,
    /// no leading separator: `about/index.html`
    pub relative_path: String,
}

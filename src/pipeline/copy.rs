//! Passthrough copy pipeline for plain `.css` and `.js` files.
//!
//! Copies every matching file unchanged, preserving the path below the
//! source root. A copy failure is fatal for the pass: a file vanishing
//! mid-glob is not an expected condition.

use super::PassOutcome;
use crate::registry::{PathRegistry, SourceKind};
use anyhow::{Context, Result};
use std::fs;

/// Copy the category's files byte-for-byte into the output tree.
pub fn copy_passthrough(kind: SourceKind, registry: &PathRegistry) -> Result<PassOutcome> {
    let mut outcome = PassOutcome::default();

    for source in registry.select(kind) {
        let Some(dest) = registry.dest_for(kind, &source) else {
            continue;
        };

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::copy(&source, &dest).with_context(|| {
            format!("Failed to copy {} -> {}", source.display(), dest.display())
        })?;
        outcome.written += 1;
    }

    Ok(outcome)
}

//! Site building orchestration.
//!
//! Runs the four pipelines over the source tree and signals reload per
//! category as each finishes.
//!
//! # Architecture
//!
//! ```text
//! build_site()
//!     │
//!     ├── ensure_output_dir() ──► create (or clean + create) output root
//!     │
//!     ├── rayon::join ─┬─► render templates ──► reload("templates")
//!     │                ├─► compile styles   ──► reload("styles")
//!     │                ├─► copy css         ──► reload("css")
//!     │                └─► copy scripts     ──► reload("scripts")
//!     │
//!     └── log_build_result() ──► per-pipeline summary / empty warning
//! ```
//!
//! Pipelines overlap freely: each writes a disjoint part of the output
//! tree, so completion order does not matter.

use crate::{
    config::SiteConfig,
    log,
    pipeline::{PassOutcome, Pipeline},
    registry::PathRegistry,
    reload::{ReloadHub, ReloadMessage},
};
use anyhow::{Context, Result};
use std::{fs, path::Path};

/// Build the entire site, running all pipelines in parallel.
///
/// Per-file errors are reported inside each pass and do not fail the build;
/// a fatal pass error (missing site data, unwritable output) is propagated.
/// If `config.build.clean` is true, clears the output directory first.
pub fn build_site(
    config: &SiteConfig,
    registry: &PathRegistry,
    hub: Option<&ReloadHub>,
) -> Result<()> {
    ensure_output_dir(registry.output_root(), config.build.clean)?;

    let run = |pipeline: Pipeline| -> Result<PassOutcome> {
        let outcome = pipeline.run(registry)?;
        log!(pipeline.category(); "{}", outcome.summary());
        // Signal only after the pass wrote its files; a fatally failed pass
        // never reaches this point.
        if let Some(hub) = hub {
            hub.broadcast(&ReloadMessage::Reload {
                category: pipeline.category(),
            });
        }
        Ok(outcome)
    };

    let ((templates, styles), (css, scripts)) = rayon::join(
        || {
            rayon::join(
                || run(Pipeline::Templates),
                || run(Pipeline::Styles),
            )
        },
        || {
            rayon::join(
                || run(Pipeline::Css),
                || run(Pipeline::Scripts),
            )
        },
    );

    let outcomes = [templates?, styles?, css?, scripts?];
    log_build_result(registry.output_root(), &outcomes)?;

    Ok(())
}

/// Ensure the output directory exists.
///
/// When `clean` is true, removes all existing content first; otherwise the
/// previous tree is overwritten file by file.
fn ensure_output_dir(output: &Path, clean: bool) -> Result<()> {
    if clean && output.exists() {
        fs::remove_dir_all(output)
            .with_context(|| format!("Failed to clear output directory: {}", output.display()))?;
    }
    fs::create_dir_all(output)
        .with_context(|| format!("Failed to create output directory: {}", output.display()))
}

/// Log build result based on output directory contents
fn log_build_result(output: &Path, outcomes: &[PassOutcome; 4]) -> Result<()> {
    let written: usize = outcomes.iter().map(|o| o.written).sum();
    let failed: usize = outcomes.iter().map(|o| o.errors.len()).sum();

    match (written, failed) {
        (0, 0) => log!("warn"; "output is empty, check {} for sources", output.display()),
        (_, 0) => log!("build"; "done"),
        (_, n) => log!("build"; "done with {n} failed files"),
    }

    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn full_site(root: &Path) -> PathRegistry {
        let files: &[(&str, &str)] = &[
            ("_data/site.json", r#"{"title": "Demo"}"#),
            (
                "index.jinja",
                "<html><head><title>{{ site.title }}</title></head><body></body></html>",
            ),
            ("css/site.scss", "body { margin: 0; }\n"),
            ("css/normalize.css", "html{box-sizing:border-box}"),
            ("js/main.js", "console.log(1);\n"),
        ];
        for (rel, content) in files {
            let path = root.join("src").join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        PathRegistry::with_roots(&root.join("src"), &root.join("dist"), Path::new("_data"))
    }

    #[test]
    fn test_build_site_produces_all_categories() {
        let tmp = TempDir::new().unwrap();
        let root = &tmp.path().canonicalize().unwrap();
        let registry = full_site(root);
        let config = SiteConfig::default();

        build_site(&config, &registry, None).unwrap();

        assert!(root.join("dist/index.html").exists());
        assert!(root.join("dist/css/site.css").exists());
        assert!(root.join("dist/css/normalize.css").exists());
        assert!(root.join("dist/js/main.js").exists());
    }

    #[test]
    fn test_build_site_missing_data_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let root = &tmp.path().canonicalize().unwrap();
        let registry = full_site(root);
        fs::remove_file(root.join("src/_data/site.json")).unwrap();
        let config = SiteConfig::default();

        assert!(build_site(&config, &registry, None).is_err());
    }

    #[test]
    fn test_clean_removes_stale_output() {
        let tmp = TempDir::new().unwrap();
        let root = &tmp.path().canonicalize().unwrap();
        let registry = full_site(root);

        let stale = root.join("dist/stale.html");
        fs::create_dir_all(stale.parent().unwrap()).unwrap();
        fs::write(&stale, "old").unwrap();

        let mut config = SiteConfig::default();
        config.build.clean = true;
        build_site(&config, &registry, None).unwrap();

        assert!(!stale.exists());
        assert!(root.join("dist/index.html").exists());
    }

    #[test]
    fn test_ensure_output_dir_creates_nested() {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path().join("deep/nested/dist");
        ensure_output_dir(&out, false).unwrap();
        assert!(out.is_dir());
    }
}

//! Template rendering pipeline.
//!
//! Renders every non-partial `.jinja` file under the source root to a
//! pretty-printed HTML file at the mirrored output path. Each file gets a
//! fresh context holding the parsed site data and its own root-relative
//! output path.
//!
//! Include and extends names resolve against the source root, so a name
//! with a leading `/` (`/_includes/_layout.jinja`) works from any depth.

use super::{PassOutcome, pretty};
use crate::{
    data::{RenderContext, load_site_data},
    log,
    registry::{PathRegistry, SourceKind},
};
use anyhow::{Context, Result};
use minijinja::Environment;
use std::{
    fs,
    path::{Component, Path, PathBuf},
};

/// Render all templates once. Fatal only when the site data cannot be
/// loaded or the output directory cannot be written; a single template
/// failing to render is reported and skipped.
pub fn render_templates(registry: &PathRegistry) -> Result<PassOutcome> {
    // Every template depends on the site data; no point rendering without it.
    let site = load_site_data(registry)?;

    let env = build_environment(registry.source_root());
    let mut outcome = PassOutcome::default();

    for source in registry.select(SourceKind::Templates) {
        let Some(relative_path) = registry.rel_url(SourceKind::Templates, &source) else {
            continue;
        };
        let Some(dest) = registry.dest_for(SourceKind::Templates, &source) else {
            continue;
        };

        let ctx = RenderContext {
            site: &site,
            relative_path,
        };

        match render_one(&env, registry, &source, &ctx) {
            Ok(html) => {
                write_output(&dest, html.as_bytes())?;
                outcome.written += 1;
            }
            Err(err) => {
                // Old output (if any) stays in place; the watcher keeps going.
                log!("error"; "{}: {err:#}", source.display());
                outcome.record_error(source, format!("{err:#}"));
            }
        }
    }

    Ok(outcome)
}

/// Render a single template and pretty-print the result.
fn render_one(
    env: &Environment<'_>,
    registry: &PathRegistry,
    source: &Path,
    ctx: &RenderContext<'_>,
) -> Result<String> {
    let name = registry
        .relative(source)
        .map(|rel| crate::registry::rel_to_slash(&rel))
        .context("template outside source root")?;

    let template = env.get_template(&name)?;
    let html = template.render(ctx)?;

    // Formatting never blocks output: markup the parser cannot digest is
    // written as rendered.
    Ok(pretty::pretty_print(&html).unwrap_or(html))
}

/// Build a fresh environment whose loader resolves template names against
/// the source root. Nothing survives between passes.
fn build_environment(source_root: &Path) -> Environment<'static> {
    let root = source_root.to_path_buf();
    let mut env = Environment::new();
    env.set_loader(move |name| {
        let Some(path) = resolve_template_name(&root, name) else {
            return Ok(None);
        };
        match fs::read_to_string(&path) {
            Ok(source) => Ok(Some(source)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(minijinja::Error::new(
                minijinja::ErrorKind::InvalidOperation,
                format!("could not read {}: {err}", path.display()),
            )),
        }
    });
    env
}

/// Map a template name to a path under the root.
///
/// A leading separator is a root-relative reference and is stripped; names
/// escaping the root (`..`) resolve to nothing.
fn resolve_template_name(root: &Path, name: &str) -> Option<PathBuf> {
    let name = name.trim_start_matches('/');
    let rel = Path::new(name);
    if rel
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return None;
    }
    Some(root.join(rel))
}

fn write_output(dest: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(dest, content).with_context(|| format!("Failed to write {}", dest.display()))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::PathRegistry;
    use tempfile::TempDir;

    fn site(root: &Path, files: &[(&str, &str)]) -> PathRegistry {
        for (rel, content) in files {
            let path = root.join("src").join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        PathRegistry::with_roots(&root.join("src"), &root.join("dist"), Path::new("_data"))
    }

    #[test]
    fn test_renders_site_data_pretty_printed() {
        let tmp = TempDir::new().unwrap();
        let root = &tmp.path().canonicalize().unwrap();
        let registry = site(
            root,
            &[
                ("_data/site.json", r#"{"title": "Demo"}"#),
                (
                    "index.jinja",
                    "<html><head><title>{{ site.title }}</title></head><body><p>hi</p></body></html>",
                ),
            ],
        );

        let outcome = render_templates(&registry).unwrap();
        assert_eq!(outcome.written, 1);
        assert!(outcome.errors.is_empty());

        let html = fs::read_to_string(root.join("dist/index.html")).unwrap();
        // Pretty-printed: the title sits on its own indented line.
        assert!(html.lines().any(|l| l.trim() == "<title>Demo</title>"));
        assert!(html.lines().count() > 1);
    }

    #[test]
    fn test_relative_path_in_context() {
        let tmp = TempDir::new().unwrap();
        let root = &tmp.path().canonicalize().unwrap();
        let registry = site(
            root,
            &[
                ("_data/site.json", "{}"),
                ("about/index.jinja", "<p>{{ relative_path }}</p>"),
            ],
        );

        render_templates(&registry).unwrap();

        let html = fs::read_to_string(root.join("dist/about/index.html")).unwrap();
        assert!(html.contains("about/index.html"));
    }

    #[test]
    fn test_partials_produce_no_output() {
        let tmp = TempDir::new().unwrap();
        let root = &tmp.path().canonicalize().unwrap();
        let registry = site(
            root,
            &[
                ("_data/site.json", "{}"),
                ("_includes/_layout.jinja", "<html><body>{% block content %}{% endblock %}</body></html>"),
                (
                    "index.jinja",
                    "{% extends \"/_includes/_layout.jinja\" %}{% block content %}<p>home</p>{% endblock %}",
                ),
            ],
        );

        let outcome = render_templates(&registry).unwrap();
        assert_eq!(outcome.written, 1);

        assert!(root.join("dist/index.html").exists());
        assert!(!root.join("dist/_includes/_layout.html").exists());
    }

    #[test]
    fn test_root_relative_include() {
        let tmp = TempDir::new().unwrap();
        let root = &tmp.path().canonicalize().unwrap();
        let registry = site(
            root,
            &[
                ("_data/site.json", r#"{"title": "T"}"#),
                ("_includes/_head.jinja", "<head><title>{{ site.title }}</title></head>"),
                (
                    "deep/nested/page.jinja",
                    "<html>{% include \"/_includes/_head.jinja\" %}<body></body></html>",
                ),
            ],
        );

        let outcome = render_templates(&registry).unwrap();
        assert_eq!(outcome.written, 1);

        let html = fs::read_to_string(root.join("dist/deep/nested/page.html")).unwrap();
        assert!(html.contains("<title>T</title>"));
    }

    #[test]
    fn test_render_error_does_not_abort_pass() {
        let tmp = TempDir::new().unwrap();
        let root = &tmp.path().canonicalize().unwrap();
        let registry = site(
            root,
            &[
                ("_data/site.json", "{}"),
                ("bad.jinja", "{% include \"/missing.jinja\" %}"),
                ("good.jinja", "<p>ok</p>"),
            ],
        );

        let outcome = render_templates(&registry).unwrap();
        assert_eq!(outcome.written, 1);
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors[0].path.ends_with("bad.jinja"));

        assert!(root.join("dist/good.html").exists());
        assert!(!root.join("dist/bad.html").exists());
    }

    #[test]
    fn test_missing_site_data_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let root = &tmp.path().canonicalize().unwrap();
        let registry = site(root, &[("index.jinja", "<p>hi</p>")]);

        assert!(render_templates(&registry).is_err());
        assert!(!root.join("dist/index.html").exists());
    }

    #[test]
    fn test_resolve_template_name() {
        let root = Path::new("/site/src");
        assert_eq!(
            resolve_template_name(root, "/_includes/_layout.jinja"),
            Some(PathBuf::from("/site/src/_includes/_layout.jinja"))
        );
        assert_eq!(
            resolve_template_name(root, "about/index.jinja"),
            Some(PathBuf::from("/site/src/about/index.jinja"))
        );
        assert_eq!(resolve_template_name(root, "../escape.jinja"), None);
    }
}

//! Style compilation pipeline.
//!
//! Compiles every non-partial `.scss` file to CSS at the mirrored output
//! path. Before compilation, glob-style import directives are expanded so a
//! logical stylesheet can be split across partials; after compilation the
//! CSS goes through a fixed post-processing chain: flexbox layout-bug fixes,
//! then vendor prefixing for the support matrix below.

use super::PassOutcome;
use crate::{
    log,
    registry::{PathRegistry, SourceKind},
};
use anyhow::{Context, Result, anyhow};
use lightningcss::{
    stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet},
    targets::{Browsers, Targets},
};
use regex::Regex;
use std::{
    fs,
    path::{Path, PathBuf},
    sync::OnceLock,
};

/// Encode a browser version the way lightningcss expects.
const fn v(major: u32, minor: u32, patch: u32) -> u32 {
    (major << 16) | (minor << 8) | patch
}

/// Fixed support matrix: last three releases of the major desktop browsers
/// at the pin date, plus the named mobile minimums. Not user-configurable.
fn browser_targets() -> Targets {
    Targets {
        browsers: Some(Browsers {
            chrome: Some(v(136, 0, 0)),
            edge: Some(v(136, 0, 0)),
            firefox: Some(v(137, 0, 0)),
            safari: Some(v(17, 0, 0)),
            ios_saf: Some(v(9, 3, 0)),
            android: Some(v(4, 4, 0)),
            ..Browsers::default()
        }),
        ..Targets::default()
    }
}

/// Compile all style sources once. A single file failing to compile is
/// reported and skipped; its previous output stays in place.
pub fn compile_styles(registry: &PathRegistry) -> Result<PassOutcome> {
    let mut outcome = PassOutcome::default();

    for source in registry.select(SourceKind::Styles) {
        let Some(dest) = registry.dest_for(SourceKind::Styles, &source) else {
            continue;
        };
        let dest = dest.with_extension("css");

        match compile_one(registry, &source) {
            Ok(css) => {
                if let Some(parent) = dest.parent() {
                    fs::create_dir_all(parent)
                        .with_context(|| format!("Failed to create {}", parent.display()))?;
                }
                fs::write(&dest, css)
                    .with_context(|| format!("Failed to write {}", dest.display()))?;
                outcome.written += 1;
            }
            Err(err) => {
                log!("error"; "{}: {err:#}", source.display());
                outcome.record_error(source, format!("{err:#}"));
            }
        }
    }

    Ok(outcome)
}

/// Expand imports, compile, and post-process one stylesheet.
fn compile_one(registry: &PathRegistry, source: &Path) -> Result<String> {
    let raw = fs::read_to_string(source)
        .with_context(|| format!("Failed to read {}", source.display()))?;

    let dir = source.parent().unwrap_or(Path::new("."));
    let expanded = expand_glob_imports(&raw, dir, source);

    let options = grass::Options::default()
        .style(grass::OutputStyle::Expanded)
        .load_path(dir)
        .load_path(registry.source_root());
    let css = grass::from_string(expanded, &options).map_err(|e| anyhow!("{e}"))?;

    postprocess(&css)
}

// ============================================================================
// Glob Import Expansion
// ============================================================================

fn glob_import_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?m)^(\s*)@(import|use)\s+['"]([^'"]*\*[^'"]*)['"]\s*;?\s*$"#)
            .expect("static regex")
    })
}

/// Replace `@import "dir/*";` directives with one import per matching file,
/// sorted for stable output. The pattern resolves relative to the importing
/// file; the importing file itself is never re-imported.
fn expand_glob_imports(source: &str, dir: &Path, importer: &Path) -> String {
    glob_import_re()
        .replace_all(source, |caps: &regex::Captures<'_>| {
            let indent = &caps[1];
            let keyword = &caps[2];
            let pattern = &caps[3];
            let imports = matching_partials(dir, pattern, importer)
                .into_iter()
                .map(|rel| format!("{indent}@{keyword} \"{rel}\";"))
                .collect::<Vec<_>>();
            imports.join("\n")
        })
        .into_owned()
}

/// Resolve a glob pattern against the importing file's directory, returning
/// forward-slash relative paths of style sources, sorted.
fn matching_partials(dir: &Path, pattern: &str, importer: &Path) -> Vec<String> {
    let full = dir.join(pattern);
    let Some(full) = full.to_str() else {
        return Vec::new();
    };

    let mut found: Vec<PathBuf> = glob::glob(full)
        .map(|paths| paths.filter_map(|p| p.ok()).collect())
        .unwrap_or_default();
    found.sort();

    found
        .into_iter()
        .filter(|p| {
            matches!(
                p.extension().and_then(|e| e.to_str()),
                Some("scss" | "sass")
            )
        })
        .filter(|p| p != importer)
        .map(|p| {
            let rel = p.strip_prefix(dir).unwrap_or(&p);
            crate::registry::rel_to_slash(rel)
        })
        .collect()
}

// ============================================================================
// Post-processing
// ============================================================================

fn flex_shorthand_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)\bflex:\s*(\d+(?:\.\d+)?)(?:\s+(\d+(?:\.\d+)?))?\s*;").expect("static regex")
    })
}

/// Normalize unitless `flex` shorthands to an explicit `0%` basis, working
/// around the old-Edge/IE behavior where an implied basis collapses flex
/// items.
fn apply_flex_fixes(css: &str) -> String {
    flex_shorthand_re()
        .replace_all(css, |caps: &regex::Captures<'_>| {
            let grow = &caps[1];
            let shrink = caps.get(2).map_or("1", |m| m.as_str());
            format!("flex: {grow} {shrink} 0%;")
        })
        .into_owned()
}

/// Apply layout fixes, then vendor prefixes for the fixed target matrix,
/// printed expanded (non-minified).
fn postprocess(css: &str) -> Result<String> {
    let fixed = apply_flex_fixes(css);

    let mut sheet = StyleSheet::parse(&fixed, ParserOptions::default())
        .map_err(|e| anyhow!("css parse error: {e}"))?;
    sheet
        .minify(MinifyOptions {
            targets: browser_targets(),
            ..MinifyOptions::default()
        })
        .map_err(|e| anyhow!("css transform error: {e}"))?;
    let printed = sheet
        .to_css(PrinterOptions {
            minify: false,
            targets: browser_targets(),
            ..PrinterOptions::default()
        })
        .map_err(|e| anyhow!("css print error: {e}"))?;

    Ok(printed.code)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn style_tree(root: &Path, files: &[(&str, &str)]) -> PathRegistry {
        for (rel, content) in files {
            let path = root.join("src").join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        PathRegistry::with_roots(&root.join("src"), &root.join("dist"), Path::new("_data"))
    }

    // ------------------------------------------------------------------------
    // Glob import expansion
    // ------------------------------------------------------------------------

    #[test]
    fn test_expand_glob_imports() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path();
        fs::create_dir_all(dir.join("modules")).unwrap();
        fs::write(dir.join("modules/_b.scss"), "").unwrap();
        fs::write(dir.join("modules/_a.scss"), "").unwrap();
        fs::write(dir.join("modules/readme.md"), "").unwrap();
        let importer = dir.join("site.scss");

        let expanded = expand_glob_imports("@import \"modules/*\";\n", dir, &importer);
        assert_eq!(
            expanded,
            "@import \"modules/_a.scss\";\n@import \"modules/_b.scss\";\n"
        );
    }

    #[test]
    fn test_expand_glob_imports_skips_importer_itself() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path();
        fs::write(dir.join("site.scss"), "").unwrap();
        fs::write(dir.join("_extra.scss"), "").unwrap();
        let importer = dir.join("site.scss");

        let expanded = expand_glob_imports("@import \"*\";", dir, &importer);
        assert_eq!(expanded, "@import \"_extra.scss\";");
    }

    #[test]
    fn test_plain_imports_untouched() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path();
        let importer = dir.join("site.scss");

        let source = "@import \"vars\";\nbody { color: red; }\n";
        assert_eq!(expand_glob_imports(source, dir, &importer), source);
    }

    // ------------------------------------------------------------------------
    // Flex fixes
    // ------------------------------------------------------------------------

    #[test]
    fn test_flex_fix_single_value() {
        assert_eq!(
            apply_flex_fixes(".a {\n  flex: 1;\n}\n"),
            ".a {\n  flex: 1 1 0%;\n}\n"
        );
    }

    #[test]
    fn test_flex_fix_two_values() {
        assert_eq!(
            apply_flex_fixes(".a { flex: 2 2; }"),
            ".a { flex: 2 2 0%; }"
        );
    }

    #[test]
    fn test_flex_fix_leaves_full_shorthand() {
        let css = ".a { flex: 0 0 auto; }";
        assert_eq!(apply_flex_fixes(css), css);
    }

    #[test]
    fn test_flex_fix_leaves_display_flex() {
        let css = ".a { display: flex; }";
        assert_eq!(apply_flex_fixes(css), css);
    }

    // ------------------------------------------------------------------------
    // Full pipeline
    // ------------------------------------------------------------------------

    #[test]
    fn test_compiles_with_partials_and_no_partial_output() {
        let tmp = TempDir::new().unwrap();
        let root = &tmp.path().canonicalize().unwrap();
        let registry = style_tree(
            root,
            &[
                ("css/site.scss", "@import \"modules/*\";\nbody { color: $ink; }\n"),
                ("css/modules/_vars.scss", "$ink: #222;\n"),
            ],
        );

        let outcome = compile_styles(&registry).unwrap();
        assert_eq!(outcome.written, 1);
        assert!(outcome.errors.is_empty());

        let css = fs::read_to_string(root.join("dist/css/site.css")).unwrap();
        assert!(css.contains("#222"));
        // Expanded output, not minified to one line
        assert!(css.trim().contains('\n'));
        // The partial never produces a standalone file
        assert!(!root.join("dist/css/modules/_vars.css").exists());
    }

    #[test]
    fn test_vendor_prefixes_applied() {
        let tmp = TempDir::new().unwrap();
        let root = &tmp.path().canonicalize().unwrap();
        let registry = style_tree(
            root,
            &[("css/app.scss", ".toolbar { user-select: none; }\n")],
        );

        compile_styles(&registry).unwrap();

        let css = fs::read_to_string(root.join("dist/css/app.css")).unwrap();
        assert!(css.contains("-webkit-user-select"));
        assert!(css.contains("user-select: none"));
    }

    #[test]
    fn test_compile_error_does_not_abort_pass() {
        let tmp = TempDir::new().unwrap();
        let root = &tmp.path().canonicalize().unwrap();
        let registry = style_tree(
            root,
            &[
                ("css/broken.scss", "body { color: ; }\n"),
                ("css/fine.scss", "p { margin: 0; }\n"),
            ],
        );

        let outcome = compile_styles(&registry).unwrap();
        assert_eq!(outcome.written, 1);
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors[0].path.ends_with("broken.scss"));

        assert!(root.join("dist/css/fine.css").exists());
        assert!(!root.join("dist/css/broken.css").exists());
    }

    #[test]
    fn test_fix_and_save_recovers() {
        let tmp = TempDir::new().unwrap();
        let root = &tmp.path().canonicalize().unwrap();
        let registry = style_tree(root, &[("css/app.scss", "body { color: ; }\n")]);

        let outcome = compile_styles(&registry).unwrap();
        assert_eq!(outcome.errors.len(), 1);

        fs::write(root.join("src/css/app.scss"), "body { color: #000; }\n").unwrap();
        let outcome = compile_styles(&registry).unwrap();
        assert!(outcome.errors.is_empty());
        assert!(
            fs::read_to_string(root.join("dist/css/app.css"))
                .unwrap()
                .contains("#000")
        );
    }
}

//! Immutable source/destination path registry.
//!
//! Built once at start-up from the loaded config and passed explicitly into
//! every pipeline component. Each source category maps to an inclusion glob
//! and an optional exclusion glob; the exclusion subtracts partial files
//! (name starting with `_`) from the category's selection.
//!
//! # Categories
//!
//! | Category  | Include          | Exclude        | Pipeline        |
//! |-----------|------------------|----------------|-----------------|
//! | Templates | `**/*.jinja`     | `**/_*.jinja`  | render to HTML  |
//! | Styles    | `**/*.scss`      | `**/_*.scss`   | compile to CSS  |
//! | Css       | `**/*.css`       | -              | copy unchanged  |
//! | Scripts   | `**/*.js`        | -              | copy unchanged  |
//! | Data      | `<data>/**/*.json` | -            | read per pass   |

use crate::config::SiteConfig;
use glob::Pattern;
use std::{
    env,
    path::{Path, PathBuf},
};
use walkdir::WalkDir;

/// Source file extension for templates
pub const TEMPLATE_EXT: &str = "jinja";

/// Source file extension for style sheets
pub const STYLE_EXT: &str = "scss";

/// Output extension for rendered templates
pub const HTML_EXT: &str = "html";

/// Files to ignore during directory traversal
const IGNORED_FILES: &[&str] = &[".DS_Store"];

// ============================================================================
// Source Categories
// ============================================================================

/// A source file category. Exhaustive: an undefined category is
/// unrepresentable, so registry lookups cannot fail at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// Template sources (`.jinja`), rendered to HTML
    Templates,
    /// Style sources (`.scss`), compiled to CSS
    Styles,
    /// Plain stylesheets (`.css`), copied unchanged
    Css,
    /// Script files (`.js`), copied unchanged
    Scripts,
    /// JSON data files under the data directory, read at render time
    Data,
}

impl SourceKind {
    /// Short name used in logs and reload messages
    pub const fn name(self) -> &'static str {
        match self {
            Self::Templates => "templates",
            Self::Styles => "styles",
            Self::Css => "css",
            Self::Scripts => "scripts",
            Self::Data => "data",
        }
    }
}

/// Inclusion/exclusion globs for one category, matched against
/// source-root-relative paths.
#[derive(Debug, Clone)]
pub struct SourceRule {
    include: Pattern,
    exclude: Option<Pattern>,
}

impl SourceRule {
    fn new(include: &str, exclude: Option<&str>) -> Self {
        // Patterns are static strings; a malformed one is a programming error.
        Self {
            include: Pattern::new(include).expect("static glob pattern"),
            exclude: exclude.map(|p| Pattern::new(p).expect("static glob pattern")),
        }
    }

    /// Check a source-root-relative path against include minus exclude.
    pub fn matches(&self, rel: &Path) -> bool {
        self.include.matches_path(rel)
            && self.exclude.as_ref().is_none_or(|ex| !ex.matches_path(rel))
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Immutable lookup table from category to globs and roots.
#[derive(Debug, Clone)]
pub struct PathRegistry {
    source_root: PathBuf,
    output_root: PathBuf,
    /// Data directory, relative to the source root
    data_dir: PathBuf,
    templates: SourceRule,
    styles: SourceRule,
    css: SourceRule,
    scripts: SourceRule,
    data: SourceRule,
}

impl PathRegistry {
    pub fn new(config: &SiteConfig) -> Self {
        Self::with_roots(&config.build.source, &config.build.output, &config.build.data)
    }

    pub fn with_roots(source: &Path, output: &Path, data: &Path) -> Self {
        let data_glob = format!("{}/**/*.json", data.display());
        Self {
            source_root: source.to_path_buf(),
            output_root: output.to_path_buf(),
            data_dir: data.to_path_buf(),
            templates: SourceRule::new("**/*.jinja", Some("**/_*.jinja")),
            styles: SourceRule::new("**/*.scss", Some("**/_*.scss")),
            css: SourceRule::new("**/*.css", None),
            scripts: SourceRule::new("**/*.js", None),
            data: SourceRule::new(&data_glob, None),
        }
    }

    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Absolute path of the data directory
    pub fn data_dir(&self) -> PathBuf {
        self.source_root.join(&self.data_dir)
    }

    /// Glob rule for a category. Pure lookup, no side effects.
    pub const fn rule(&self, kind: SourceKind) -> &SourceRule {
        match kind {
            SourceKind::Templates => &self.templates,
            SourceKind::Styles => &self.styles,
            SourceKind::Css => &self.css,
            SourceKind::Scripts => &self.scripts,
            SourceKind::Data => &self.data,
        }
    }

    /// Enumerate the category's selected files, sorted for stable order.
    pub fn select(&self, kind: SourceKind) -> Vec<PathBuf> {
        let rule = self.rule(kind);
        let mut files: Vec<_> = WalkDir::new(&self.source_root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| {
                let name = e.file_name().to_str().unwrap_or_default();
                !IGNORED_FILES.contains(&name)
            })
            .map(|e| e.into_path())
            .filter(|p| {
                p.strip_prefix(&self.source_root)
                    .is_ok_and(|rel| rule.matches(rel))
            })
            .collect();
        files.sort();
        files
    }

    /// Categorize an absolute path for the watch dispatcher.
    ///
    /// Matches by extension rather than by selection globs, so a partial
    /// (`_layout.jinja`, `_vars.scss`) still maps to its category and a
    /// change to it reruns the category's pipeline. Files outside the
    /// source root return `None`.
    pub fn categorize(&self, path: &Path) -> Option<SourceKind> {
        let path = normalize_path(path);
        let rel = path.strip_prefix(&self.source_root).ok()?;

        if rel.starts_with(&self.data_dir) {
            return match rel.extension().and_then(|e| e.to_str()) {
                Some("json") => Some(SourceKind::Data),
                _ => None,
            };
        }

        match rel.extension().and_then(|e| e.to_str()) {
            Some(TEMPLATE_EXT) => Some(SourceKind::Templates),
            Some(STYLE_EXT) => Some(SourceKind::Styles),
            Some("css") => Some(SourceKind::Css),
            Some("js") => Some(SourceKind::Scripts),
            _ => None,
        }
    }

    /// Source-root-relative form of an absolute path
    pub fn relative(&self, path: &Path) -> Option<PathBuf> {
        normalize_path(path)
            .strip_prefix(&self.source_root)
            .ok()
            .map(Path::to_path_buf)
    }

    /// Destination path for a source file, preserving relative structure.
    /// Template sources get their extension replaced by `.html`.
    pub fn dest_for(&self, kind: SourceKind, source: &Path) -> Option<PathBuf> {
        let rel = self.relative(source)?;
        let rel = match kind {
            SourceKind::Templates => rel.with_extension(HTML_EXT),
            _ => rel,
        };
        Some(self.output_root.join(rel))
    }

    /// Root-relative output path with forward slashes and no leading
    /// separator: `src/about/index.jinja` -> `about/index.html`.
    pub fn rel_url(&self, kind: SourceKind, source: &Path) -> Option<String> {
        let rel = self.relative(source)?;
        let rel = match kind {
            SourceKind::Templates => rel.with_extension(HTML_EXT),
            _ => rel,
        };
        Some(rel_to_slash(&rel))
    }
}

/// Join path components with `/` regardless of platform separator.
pub fn rel_to_slash(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Normalize a path to absolute form for reliable comparison.
///
/// Registry roots are already normalized, so incoming paths (e.g., from the
/// file watcher) are normalized before comparison.
pub fn normalize_path(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            env::current_dir().map_or_else(|_| path.to_path_buf(), |cwd| cwd.join(path))
        }
    })
}

// ============================================================================
// Tests
// ============================================================================

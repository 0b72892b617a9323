//! Build pipelines and their dispatch table.
//!
//! Each pipeline is a fallible pass over one source category. The mapping
//! from category to pipeline is an exhaustive enum match, so adding a
//! category is a compile-time-visible change, not a table edit.

pub mod copy;
pub mod pretty;
pub mod styles;
pub mod templates;

use crate::registry::{PathRegistry, SourceKind};
use anyhow::Result;
use std::path::PathBuf;

// ============================================================================
// Pass Outcome
// ============================================================================

/// A per-file failure recorded during a pass.
#[derive(Debug)]
pub struct FileError {
    pub path: PathBuf,
    pub message: String,
}

/// Result of one pipeline pass.
///
/// A pass that returns `Ok` may still carry per-file errors; those files'
/// previous outputs are left untouched. A pass that returns `Err` failed
/// before writing anything (fatal for the pass, not for the process).
#[derive(Debug, Default)]
pub struct PassOutcome {
    /// Files written to the output tree
    pub written: usize,
    /// Per-file failures, reported but not fatal
    pub errors: Vec<FileError>,
}

impl PassOutcome {
    pub fn record_error(&mut self, path: PathBuf, message: String) {
        self.errors.push(FileError { path, message });
    }

    pub fn summary(&self) -> String {
        match self.errors.len() {
            0 => format!("{} files", self.written),
            n => format!("{} files, {} failed", self.written, n),
        }
    }
}

// ============================================================================
// Pipeline Dispatch
// ============================================================================

/// The four build pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pipeline {
    /// Render `.jinja` templates to pretty-printed HTML
    Templates,
    /// Compile `.scss` sources to post-processed CSS
    Styles,
    /// Copy plain `.css` files unchanged
    Css,
    /// Copy `.js` files unchanged
    Scripts,
}

impl Pipeline {
    /// All pipelines in dispatch order
    pub const ALL: [Self; 4] = [Self::Templates, Self::Styles, Self::Css, Self::Scripts];

    /// Category name carried by reload signals and logs
    pub const fn category(self) -> &'static str {
        self.source().name()
    }

    /// The source category this pipeline consumes
    pub const fn source(self) -> SourceKind {
        match self {
            Self::Templates => SourceKind::Templates,
            Self::Styles => SourceKind::Styles,
            Self::Css => SourceKind::Css,
            Self::Scripts => SourceKind::Scripts,
        }
    }

    /// Pipeline responsible for a changed source category, if any.
    ///
    /// `Data` maps to no pipeline: site data is re-read at the start of the
    /// next template pass rather than triggering one.
    pub const fn for_source(kind: SourceKind) -> Option<Self> {
        match kind {
            SourceKind::Templates => Some(Self::Templates),
            SourceKind::Styles => Some(Self::Styles),
            SourceKind::Css => Some(Self::Css),
            SourceKind::Scripts => Some(Self::Scripts),
            SourceKind::Data => None,
        }
    }

    /// Run this pipeline once over its whole category.
    pub fn run(self, registry: &PathRegistry) -> Result<PassOutcome> {
        match self {
            Self::Templates => templates::render_templates(registry),
            Self::Styles => styles::compile_styles(registry),
            Self::Css => copy::copy_passthrough(SourceKind::Css, registry),
            Self::Scripts => copy::copy_passthrough(SourceKind::Scripts, registry),
        }
    }
}

//! `[build]` section configuration.
//!
//! Source and destination roots for every pipeline.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// `[build]` section in vela.toml - pipeline paths.
///
/// # Example
/// ```toml
/// [build]
/// source = "src"    # templates, styles and assets live here
/// output = "dist"   # the generated tree, overwritten on each pass
/// data = "_data"    # subdirectory of `source` holding site.json
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct BuildConfig {
    /// Project root directory (set from CLI, not from the config file)
    #[serde(default = "defaults::build::root")]
    #[educe(Default = defaults::build::root())]
    pub root: Option<PathBuf>,

    /// Source directory containing templates, styles, scripts and data.
    #[serde(default = "defaults::build::source")]
    #[educe(Default = defaults::build::source())]
    pub source: PathBuf,

    /// Output directory. Its contents mirror the source tree's relative
    /// structure and are overwritten, not diffed, on every pass.
    #[serde(default = "defaults::build::output")]
    #[educe(Default = defaults::build::output())]
    pub output: PathBuf,

    /// Data directory, relative to `source`, holding `site.json`.
    #[serde(default = "defaults::build::data")]
    #[educe(Default = defaults::build::data())]
    pub data: PathBuf,

    /// Remove the output directory completely before building.
    #[serde(default = "defaults::r#false")]
    #[educe(Default = false)]
    pub clean: bool,
}

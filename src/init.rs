//! Site initialization module.
//!
//! Creates a starter site: default configuration, a layout partial, one
//! page, site data, a glob-importing stylesheet and a script.

use crate::config::SiteConfig;
use anyhow::{Context, Result, bail};
use std::{fs, path::Path};

/// Default config filename
const CONFIG_FILE: &str = "vela.toml";

/// Default site directory structure
const SITE_DIRS: &[&str] = &[
    "src/_data",
    "src/_includes",
    "src/css/modules",
    "src/js",
];

/// Starter files written into the new site (embedded at compile time)
const STARTER_FILES: &[(&str, &str)] = &[
    ("src/index.jinja", include_str!("embed/starter/index.jinja")),
    (
        "src/_includes/_layout.jinja",
        include_str!("embed/starter/_layout.jinja"),
    ),
    ("src/_data/site.json", include_str!("embed/starter/site.json")),
    ("src/css/site.scss", include_str!("embed/starter/site.scss")),
    (
        "src/css/modules/_reset.scss",
        include_str!("embed/starter/_reset.scss"),
    ),
    (
        "src/css/modules/_vars.scss",
        include_str!("embed/starter/_vars.scss"),
    ),
    (
        "src/css/normalize.css",
        include_str!("embed/starter/normalize.css"),
    ),
    ("src/js/main.js", include_str!("embed/starter/main.js")),
];

/// Create a new site with the default structure
pub fn new_site(config: &'static SiteConfig, has_name: bool) -> Result<()> {
    let root = config.get_root();

    // Safety check: if no name was provided (init in current dir),
    // the directory must be completely empty
    if !has_name && !is_dir_empty(root)? {
        bail!(
            "Current directory is not empty. Use `vela init <SITE_NAME>` to create in a subdirectory."
        );
    }

    init_site_structure(root)?;
    init_default_config(root)?;
    init_starter_files(root)?;

    crate::log!("init"; "site created at {}", root.display());
    Ok(())
}

/// Check if a directory is completely empty
fn is_dir_empty(path: &Path) -> Result<bool> {
    if !path.exists() {
        return Ok(true);
    }
    Ok(fs::read_dir(path)?.next().is_none())
}

/// Write default configuration file
fn init_default_config(root: &Path) -> Result<()> {
    let content = toml::to_string_pretty(&SiteConfig::default())?;
    fs::write(root.join(CONFIG_FILE), content)?;
    Ok(())
}

/// Create site directory structure
fn init_site_structure(root: &Path) -> Result<()> {
    for dir in SITE_DIRS {
        let path = root.join(dir);
        if path.exists() {
            bail!(
                "Path `{}` already exists. Try `vela init <SITE_NAME>` instead.",
                path.display()
            );
        }
        fs::create_dir_all(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
    }
    Ok(())
}

/// Write the embedded starter files
fn init_starter_files(root: &Path) -> Result<()> {
    for (rel, content) in STARTER_FILES {
        let path = root.join(rel);
        fs::write(&path, content)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

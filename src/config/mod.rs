//! Site configuration management for `vela.toml`.
//!
//! # Sections
//!
//! | Section     | Purpose                                      |
//! |-------------|----------------------------------------------|
//! | `[build]`   | Source/output/data directories, clean flag   |
//! | `[serve]`   | Development server (port, interface, watch)  |
//!
//! # Example
//!
//! ```toml
//! [build]
//! source = "src"
//! output = "dist"
//! data = "_data"
//!
//! [serve]
//! port = 4000
//! watch = true
//! ```

mod build;
pub mod defaults;
mod error;
mod serve;

use build::BuildConfig;
use error::ConfigError;
use serve::ServeConfig;

use crate::cli::{Cli, Commands};
use anyhow::{Result, bail};
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration structure representing vela.toml
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct SiteConfig {
    /// CLI arguments reference
    #[serde(skip)]
    pub cli: Option<&'static Cli>,

    /// Absolute path to the config file (set after loading)
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Build settings
    #[serde(default)]
    pub build: BuildConfig,

    /// Development server settings
    #[serde(default)]
    pub serve: ServeConfig,
}

impl SiteConfig {
    /// Parse configuration from TOML string
    pub fn from_str(content: &str) -> Result<Self> {
        let config: SiteConfig = toml::from_str(content).map_err(ConfigError::Toml)?;
        Ok(config)
    }

    /// Load configuration from file path
    pub fn from_path(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;
        Self::from_str(&content)
    }

    /// Get the root directory path
    pub fn get_root(&self) -> &Path {
        self.build.root.as_deref().unwrap_or(Path::new("./"))
    }

    /// Set the root directory path
    pub fn set_root(&mut self, path: &Path) {
        self.build.root = Some(path.to_path_buf());
    }

    /// Get CLI arguments reference
    pub fn get_cli(&self) -> &'static Cli {
        self.cli.unwrap()
    }

    /// Update configuration with CLI arguments
    pub fn update_with_cli(&mut self, cli: &'static Cli) {
        self.cli = Some(cli);

        // Determine the final root path based on command
        let root = match &cli.command {
            Commands::Init { name: Some(name) } => {
                let base = cli
                    .root
                    .as_ref()
                    .cloned()
                    .unwrap_or_else(|| self.get_root().to_owned());
                base.join(name)
            }
            _ => cli
                .root
                .as_ref()
                .cloned()
                .unwrap_or_else(|| self.get_root().to_owned()),
        };

        self.set_root(&root);
        self.update_path_with_root(&root);

        if cli.clean() {
            self.build.clean = true;
        }

        if let Commands::Serve {
            interface,
            port,
            watch,
            ..
        } = &cli.command
        {
            Self::update_option(&mut self.serve.interface, interface.as_ref());
            Self::update_option(&mut self.serve.port, port.as_ref());
            Self::update_option(&mut self.serve.watch, watch.as_ref());
        }
    }

    /// Update config option if CLI value is provided
    fn update_option<T: Clone>(config_option: &mut T, cli_option: Option<&T>) {
        if let Some(option) = cli_option {
            *config_option = option.clone();
        }
    }

    /// Update all paths relative to root directory and normalize to absolute paths
    fn update_path_with_root(&mut self, root: &Path) {
        let cli = self.get_cli();

        // Apply CLI overrides first
        Self::update_option(&mut self.build.source, cli.source.as_ref());
        Self::update_option(&mut self.build.output, cli.output.as_ref());

        // Normalize root to absolute path
        let root = Self::normalize_path(root);
        self.set_root(&root);

        // Normalize config path
        self.config_path = Self::normalize_path(&root.join(&cli.config));

        // Normalize all directory paths. The data directory stays relative:
        // it names a subdirectory of the source tree.
        self.build.source = Self::normalize_path(&root.join(&self.build.source));
        self.build.output = Self::normalize_path(&root.join(&self.build.output));
    }

    /// Normalize a path to absolute, using canonicalize if the path exists
    fn normalize_path(path: &Path) -> PathBuf {
        path.canonicalize().unwrap_or_else(|_| {
            // For non-existent paths, manually make them absolute
            if path.is_absolute() {
                path.to_path_buf()
            } else {
                std::env::current_dir()
                    .map(|cwd| cwd.join(path))
                    .unwrap_or_else(|_| path.to_path_buf())
            }
        })
    }

    /// Validate configuration for the current command
    pub fn validate(&self) -> Result<()> {
        if !self.config_path.exists() {
            bail!("Config file not found");
        }

        if !self.build.source.exists() {
            bail!(ConfigError::Validation(format!(
                "[build.source] directory not found: {}",
                self.build.source.display()
            )));
        }

        if self.build.data.is_absolute() {
            bail!(ConfigError::Validation(
                "[build.data] must be a path relative to [build.source]".into()
            ));
        }

        if self.serve.interface.parse::<std::net::IpAddr>().is_err() {
            bail!(ConfigError::Validation(format!(
                "[serve.interface] is not a valid IP address: {}",
                self.serve.interface
            )));
        }

        if self.serve.port == self.serve.ws_port {
            bail!(ConfigError::Validation(
                "[serve.port] and [serve.ws_port] must differ".into()
            ));
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_str() {
        let config_str = r#"
            [build]
            source = "site"
            output = "out"
        "#;
        let config = SiteConfig::from_str(config_str).unwrap();

        assert_eq!(config.build.source, PathBuf::from("site"));
        assert_eq!(config.build.output, PathBuf::from("out"));
    }

    #[test]
    fn test_from_str_invalid_toml() {
        let invalid_config = r#"
            [build
            source = "site"
        "#;
        let result = SiteConfig::from_str(invalid_config);

        assert!(result.is_err());
    }

    #[test]
    fn test_get_root_default() {
        let config = SiteConfig::default();
        assert_eq!(config.get_root(), Path::new("./"));
    }

    #[test]
    fn test_set_root() {
        let mut config = SiteConfig::default();
        config.set_root(Path::new("/custom/path"));
        assert_eq!(config.get_root(), Path::new("/custom/path"));
    }

    #[test]
    fn test_site_config_default() {
        let config = SiteConfig::default();

        assert!(config.cli.is_none());
        assert_eq!(config.config_path, PathBuf::new());
        assert_eq!(config.build.source, PathBuf::from("src"));
        assert_eq!(config.build.output, PathBuf::from("dist"));
        assert_eq!(config.build.data, PathBuf::from("_data"));
        assert!(!config.build.clean);
        assert_eq!(config.serve.port, 4000);
        assert_eq!(config.serve.ws_port, 35729);
        assert!(config.serve.watch);
    }

    #[test]
    fn test_unknown_top_level_field_rejection() {
        let config = r#"
            [build]
            source = "src"

            [unknown_section]
            field = "value"
        "#;
        let result = SiteConfig::from_str(config);
        assert!(result.is_err());
    }

    #[test]
    fn test_full_config_all_sections() {
        let config = r#"
            [build]
            source = "site"
            output = "public"
            data = "_json"
            clean = true

            [serve]
            interface = "0.0.0.0"
            port = 3000
            ws_port = 3001
            watch = false
        "#;
        let config = SiteConfig::from_str(config).unwrap();

        assert_eq!(config.build.source, PathBuf::from("site"));
        assert_eq!(config.build.output, PathBuf::from("public"));
        assert_eq!(config.build.data, PathBuf::from("_json"));
        assert!(config.build.clean);
        assert_eq!(config.serve.interface, "0.0.0.0");
        assert_eq!(config.serve.port, 3000);
        assert_eq!(config.serve.ws_port, 3001);
        assert!(!config.serve.watch);
    }
}

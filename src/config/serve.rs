//! `[serve]` section configuration.
//!
//! Contains development server settings.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};

/// `[serve]` section in vela.toml - development server settings.
///
/// # Example
/// ```toml
/// [serve]
/// interface = "0.0.0.0"  # Listen on all interfaces
/// port = 3000
/// watch = true           # Auto-rebuild on file changes
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct ServeConfig {
    /// Network interface to bind.
    /// - `127.0.0.1` (default): localhost only
    /// - `0.0.0.0`: all interfaces (LAN accessible)
    #[serde(default = "defaults::serve::interface")]
    #[educe(Default = defaults::serve::interface())]
    pub interface: String,

    /// HTTP port number (default: 4000).
    #[serde(default = "defaults::serve::port")]
    #[educe(Default = defaults::serve::port())]
    pub port: u16,

    /// WebSocket port for reload signals (default: 35729).
    #[serde(default = "defaults::serve::ws_port")]
    #[educe(Default = defaults::serve::ws_port())]
    pub ws_port: u16,

    /// Enable file watcher for live reload on changes.
    #[serde(default = "defaults::r#true")]
    #[educe(Default = true)]
    pub watch: bool,
}

#[cfg(test)]
mod tests {
    use super::super::SiteConfig;

    #[test]
    fn test_serve_config() {
        let config = r#"
            [serve]
            interface = "0.0.0.0"
            port = 8080
            watch = false
        "#;
        let config = SiteConfig::from_str(config).unwrap();

        assert_eq!(config.serve.interface, "0.0.0.0");
        assert_eq!(config.serve.port, 8080);
        assert!(!config.serve.watch);
    }

    #[test]
    fn test_serve_config_defaults() {
        let config = SiteConfig::from_str("").unwrap();

        assert_eq!(config.serve.interface, "127.0.0.1");
        assert_eq!(config.serve.port, 4000);
        assert_eq!(config.serve.ws_port, 35729);
        assert!(config.serve.watch);
    }

    #[test]
    fn test_unknown_field_rejection() {
        let config = r#"
            [serve]
            unknown_field = "should_fail"
        "#;
        let result = SiteConfig::from_str(config);

        assert!(result.is_err());
    }

    #[test]
    fn test_serve_config_interface_variants() {
        let config = SiteConfig::from_str(
            r#"
            [serve]
            interface = "::1"
        "#,
        )
        .unwrap();
        assert_eq!(config.serve.interface, "::1");
    }

    #[test]
    fn test_serve_config_partial_override() {
        let config = SiteConfig::from_str(
            r#"
            [serve]
            port = 3000
        "#,
        )
        .unwrap();

        // port is overridden
        assert_eq!(config.serve.port, 3000);
        // interface uses default
        assert_eq!(config.serve.interface, "127.0.0.1");
        // watch uses default
        assert!(config.serve.watch);
    }
}

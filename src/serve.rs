//! Development server with live reload support.
//!
//! A lightweight HTTP server over the output directory, built on
//! `tiny_http`:
//!
//! - Static file serving with `index.html` as the default document
//! - Reload script injection into HTML responses while watching
//! - File watching and auto-rebuild (via `watch` module)
//! - Graceful shutdown on Ctrl+C
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐   ┌──────────────────┐   ┌─────────────────┐
//! │   Main Thread   │   │  Watcher Thread  │   │  Reload Hub     │
//! │  (HTTP server)  │   │  (notify events) │   │  (WebSocket)    │
//! └────────┬────────┘   └────────┬─────────┘   └────────┬────────┘
//!          │                     │                      │
//!          ▼                     ▼                      ▼
//!    Serve files           Rerun pipelines        Push reload to
//!    from output           per category           browser sessions
//! ```

use crate::{
    build::build_site,
    config::SiteConfig,
    log,
    registry::PathRegistry,
    reload::ReloadHub,
    watch::watch_for_changes_blocking,
};
use anyhow::{Context, Result};
use std::{
    fs,
    io::Cursor,
    net::SocketAddr,
    path::Path,
    sync::Arc,
};
use tiny_http::{Header, Request, Response, Server, StatusCode};

// ============================================================================
// Constants
// ============================================================================

/// Reload client script (embedded at compile time)
const RELOAD_SCRIPT: &str = include_str!("embed/reload.js");

/// Route the reload client script is served from
const RELOAD_SCRIPT_ROUTE: &str = "/__vela/reload.js";

/// Try binding to port, retry with incremented port if in use
const MAX_PORT_RETRIES: u16 = 10;

// ============================================================================
// Server Entry Point
// ============================================================================

/// Run the full serve flow: initial build, HTTP server, watcher.
///
/// 1. Starts the reload hub and performs the initial full build
/// 2. Binds the configured interface and port (auto-retry on conflict)
/// 3. Sets up Ctrl+C handler for graceful shutdown
/// 4. Spawns the file watcher thread (if enabled)
/// 5. Enters the request handling loop until Ctrl+C
pub fn serve_site(config: &'static SiteConfig, registry: &'static PathRegistry) -> Result<()> {
    let hub = ReloadHub::start(config.serve.ws_port)?;

    // Initial full build; a fatal failure here aborts serving entirely.
    build_site(config, registry, Some(&hub))?;

    let interface: std::net::IpAddr = config.serve.interface.parse()?;
    let (server, addr) = try_bind_port(interface, config.serve.port, MAX_PORT_RETRIES)?;
    let server = Arc::new(server);

    // Set up Ctrl+C handler for graceful shutdown
    let server_for_signal = Arc::clone(&server);
    ctrlc::set_handler(move || {
        log!("serve"; "shutting down...");
        server_for_signal.unblock();
    })
    .context("Failed to set Ctrl+C handler")?;

    log!("serve"; "http://{}", addr);

    // Spawn file watcher thread
    let inject_port = if config.serve.watch {
        let hub_for_watch = Arc::clone(&hub);
        std::thread::spawn(move || {
            if let Err(err) = watch_for_changes_blocking(config, registry, &hub_for_watch) {
                log!("watch"; "{err}");
            }
        });
        Some(hub.port())
    } else {
        None
    };

    // Handle requests in main thread (blocks until Ctrl+C)
    for request in server.incoming_requests() {
        if let Err(e) = handle_request(request, registry.output_root(), inject_port) {
            log!("serve"; "request error: {e}");
        }
    }

    Ok(())
}

/// Try to bind to a port, retrying with incremented port numbers if in use.
fn try_bind_port(
    interface: std::net::IpAddr,
    base_port: u16,
    max_retries: u16,
) -> Result<(Server, SocketAddr)> {
    for offset in 0..max_retries {
        let port = base_port.saturating_add(offset);
        let addr = SocketAddr::new(interface, port);

        match Server::http(addr) {
            Ok(server) => {
                if offset > 0 {
                    log!("serve"; "port {} in use, using {} instead", base_port, port);
                }
                return Ok((server, addr));
            }
            Err(_) if offset + 1 < max_retries => {
                // Will retry silently
                continue;
            }
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "Failed to bind after {} attempts (ports {}-{}): {}",
                    max_retries,
                    base_port,
                    port,
                    e
                ));
            }
        }
    }
    unreachable!()
}

// ============================================================================
// Request Handling
// ============================================================================

/// Handle a single HTTP request.
///
/// Resolution order:
/// 1. Reload script route → serve from memory
/// 2. Exact file match → serve file
/// 3. Directory with index.html → serve index.html
/// 4. Nothing found → 404
fn handle_request(request: Request, serve_root: &Path, inject_port: Option<u16>) -> Result<()> {
    // Decode URL-encoded characters (e.g., %20 → space)
    let url_path = urlencoding::decode(request.url())
        .map(std::borrow::Cow::into_owned)
        .unwrap_or_default();

    // Strip query string (e.g., ?v=123456) before resolving the path;
    // the reload client uses cache-busting queries on stylesheets.
    let path_without_query = url_path.split('?').next().unwrap_or(&url_path);

    if let Some(port) = inject_port
        && path_without_query == RELOAD_SCRIPT_ROUTE
    {
        return serve_reload_script(request, port);
    }

    let request_path = path_without_query.trim_matches('/');
    let local_path = serve_root.join(request_path);

    // Try to serve the file directly
    if local_path.is_file() {
        return serve_file(request, &local_path, inject_port);
    }

    // If it's a directory, try index.html
    if local_path.is_dir() {
        let index_path = local_path.join("index.html");
        if index_path.is_file() {
            return serve_file(request, &index_path, inject_port);
        }
    }

    serve_not_found(request)
}

// ============================================================================
// Response Helpers
// ============================================================================

/// Serve a file with appropriate content type, injecting the reload script
/// into HTML while watching.
fn serve_file(request: Request, path: &Path, inject_port: Option<u16>) -> Result<()> {
    let content = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let content_type = guess_content_type(path);

    let content = match inject_port {
        Some(_) if content_type.starts_with("text/html") => inject_reload_script(&content),
        _ => content,
    };

    let response = Response::from_data(content)
        .with_header(Header::from_bytes("Content-Type", content_type).unwrap());

    request.respond(response)?;
    Ok(())
}

/// Serve the embedded reload client with the hub port substituted.
fn serve_reload_script(request: Request, ws_port: u16) -> Result<()> {
    let script = RELOAD_SCRIPT.replace("{ws_port}", &ws_port.to_string());
    let response = Response::from_string(script).with_header(
        Header::from_bytes("Content-Type", "application/javascript; charset=utf-8").unwrap(),
    );
    request.respond(response)?;
    Ok(())
}

/// Serve 404 Not Found response.
fn serve_not_found(request: Request) -> Result<()> {
    let response = Response::new(
        StatusCode(404),
        vec![Header::from_bytes("Content-Type", "text/plain").unwrap()],
        Cursor::new("404 Not Found"),
        Some(13),
        None,
    );
    request.respond(response)?;
    Ok(())
}

/// Inject the reload script tag before `</body>`, or append when the tag
/// is missing (browsers handle that gracefully).
fn inject_reload_script(content: &[u8]) -> Vec<u8> {
    let tag = format!("<script src=\"{RELOAD_SCRIPT_ROUTE}\"></script>");
    let tag_bytes = tag.as_bytes();

    const PATTERN: &[u8] = b"</body>";

    if let Some(pos) = content
        .windows(PATTERN.len())
        .rposition(|w| w.eq_ignore_ascii_case(PATTERN))
    {
        let mut result = Vec::with_capacity(content.len() + tag_bytes.len());
        result.extend_from_slice(&content[..pos]);
        result.extend_from_slice(tag_bytes);
        result.extend_from_slice(&content[pos..]);
        return result;
    }

    let mut result = Vec::with_capacity(content.len() + tag_bytes.len());
    result.extend_from_slice(content);
    result.extend_from_slice(tag_bytes);
    result
}

// ============================================================================
// Content Type Detection
// ============================================================================

/// Guess MIME content type from file extension.
///
/// Returns `application/octet-stream` for unknown extensions.
fn guess_content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        // Web content
        Some("html" | "htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js" | "mjs") => "application/javascript; charset=utf-8",
        Some("json") => "application/json; charset=utf-8",
        Some("xml") => "application/xml; charset=utf-8",

        // Images
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("ico") => "image/x-icon",

        // Fonts
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("ttf") => "font/ttf",
        Some("otf") => "font/otf",

        // Documents
        Some("txt") => "text/plain; charset=utf-8",

        // Default binary
        _ => "application/octet-stream",
    }
}

// ============================================================================
// Tests
// ============================================================================

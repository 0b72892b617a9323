//! File system watcher driving the rebuild pipelines.
//!
//! Monitors the source root for changes and reruns the pipeline owning each
//! changed category.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      Event Loop                              │
//! │                                                              │
//! │  ┌──────────┐    ┌──────────┐    ┌────────────────────────┐  │
//! │  │ notify   │───▶│ Debouncer│───▶│    handle_changes()    │  │
//! │  │ events   │    │ (300ms)  │    │                        │  │
//! │  └──────────┘    └──────────┘    │  categorize changes,   │  │
//! │                                  │  rerun one pipeline    │  │
//! │                                  │  per category, signal  │  │
//! │                                  │  reload / error        │  │
//! │                                  └────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Triggered pipelines run sequentially on this thread in fixed order, so
//! two rapid saves of the same category queue rather than overlap. The
//! debouncer is the coalescing contract for rapid events: uncoalesced
//! delivery from the watch primitive is never assumed.

use crate::{
    config::SiteConfig,
    log,
    logger::WatchStatus,
    pipeline::Pipeline,
    registry::PathRegistry,
    reload::{ReloadHub, ReloadMessage},
};
use anyhow::{Context, Result};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use rustc_hash::FxHashSet;
use std::{
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

// =============================================================================
// Constants
// =============================================================================

const DEBOUNCE_MS: u64 = 300;

// =============================================================================
// Path Utilities
// =============================================================================

/// Check if path is a temp/backup file (editor artifacts).
fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "tmp")
        || name.ends_with('~')
        || name.starts_with('.')
}

/// Format path as source-root-relative for display.
fn rel_path(path: &Path, registry: &PathRegistry) -> String {
    registry
        .relative(path)
        .map(|rel| rel.display().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

// =============================================================================
// Debounce State
// =============================================================================

/// Batches rapid file events behind a settle window.
struct Debouncer {
    pending: FxHashSet<PathBuf>,
    last_event: Option<Instant>,
}

impl Debouncer {
    fn new() -> Self {
        Self {
            pending: FxHashSet::default(),
            last_event: None,
        }
    }

    fn add(&mut self, event: Event) {
        for path in event.paths {
            if !is_temp_file(&path) {
                self.pending.insert(path);
            }
        }
        self.last_event = Some(Instant::now());
    }

    fn ready(&self) -> bool {
        !self.pending.is_empty()
            && self
                .last_event
                .is_some_and(|t| t.elapsed() >= Duration::from_millis(DEBOUNCE_MS))
    }

    fn take(&mut self) -> Vec<PathBuf> {
        self.last_event = None;
        self.pending.drain().collect()
    }

    fn timeout(&self) -> Duration {
        if self.pending.is_empty() {
            Duration::from_secs(60)
        } else {
            Duration::from_millis(DEBOUNCE_MS)
        }
    }
}

// =============================================================================
// Event Handler
// =============================================================================

/// Pipelines affected by a batch of changed paths, in dispatch order.
fn affected_pipelines(paths: &[PathBuf], registry: &PathRegistry) -> Vec<Pipeline> {
    let triggered: FxHashSet<Pipeline> = paths
        .iter()
        .filter_map(|path| registry.categorize(path))
        .filter_map(Pipeline::for_source)
        .collect();

    Pipeline::ALL
        .into_iter()
        .filter(|p| triggered.contains(p))
        .collect()
}

/// Rerun the pipeline owning each changed category.
fn handle_changes(
    paths: &[PathBuf],
    registry: &PathRegistry,
    hub: &ReloadHub,
    status: &mut WatchStatus,
) {
    let pipelines = affected_pipelines(paths, registry);
    if pipelines.is_empty() {
        return;
    }

    let trigger = paths
        .iter()
        .map(|p| rel_path(p, registry))
        .collect::<Vec<_>>()
        .join(", ");

    for pipeline in pipelines {
        let category = pipeline.category();

        match pipeline.run(registry) {
            Ok(outcome) if outcome.errors.is_empty() => {
                status.success(&format!("{category} rebuilt ({}) [{trigger}]", outcome.summary()));
                hub.broadcast(&ReloadMessage::Reload { category });
            }
            Ok(outcome) => {
                // Some files were written: reload what did build, then
                // surface the first failure in the browser.
                hub.broadcast(&ReloadMessage::Reload { category });
                if let Some(err) = outcome.errors.first() {
                    status.error(
                        &format!("{category} rebuilt with failures ({})", outcome.summary()),
                        &err.message,
                    );
                    hub.broadcast(&ReloadMessage::Error {
                        path: rel_path(&err.path, registry),
                        message: err.message.clone(),
                    });
                }
            }
            Err(err) => {
                // Fatal for this pass only; keep watching.
                status.error(&format!("{category} build failed"), &format!("{err:#}"));
                hub.broadcast(&ReloadMessage::Error {
                    path: trigger.clone(),
                    message: format!("{err:#}"),
                });
            }
        }
    }
}

const fn is_relevant(event: &Event) -> bool {
    matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_))
}

// =============================================================================
// Public API
// =============================================================================

/// Start blocking file watcher with debouncing and live rebuild.
pub fn watch_for_changes_blocking(
    config: &'static SiteConfig,
    registry: &'static PathRegistry,
    hub: &ReloadHub,
) -> Result<()> {
    if !config.serve.watch {
        return Ok(());
    }

    let (tx, rx) = std::sync::mpsc::channel();
    let mut watcher = notify::recommended_watcher(tx).context("Failed to create file watcher")?;
    watcher
        .watch(registry.source_root(), RecursiveMode::Recursive)
        .with_context(|| format!("Failed to watch {}", registry.source_root().display()))?;

    log!("watch"; "watching {}", registry.source_root().display());
    eprintln!(); // Blank line to separate init logs from change events

    let mut debouncer = Debouncer::new();
    let mut status = WatchStatus::new();

    loop {
        match rx.recv_timeout(debouncer.timeout()) {
            Ok(Ok(event)) if is_relevant(&event) => {
                debouncer.add(event);
            }
            Ok(Err(e)) => log!("watch"; "error: {e}"),
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) if debouncer.ready() => {
                handle_changes(&debouncer.take(), registry, hub, &mut status);
            }
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
            // Other cases: irrelevant events, timeout without ready, etc.
            _ => {}
        }
    }

    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

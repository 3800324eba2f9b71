//! Registry hot reload driven by filesystem changes.
//!
//! Provides:
//! - `watch_registry()` -- starts a debounced watcher on the registry root
//! - `RegistryWatcher` -- RAII handle that keeps the watcher and reload task alive
//!
//! Change notifications are coalesced into a single pending reload. A reload
//! that fails validation is logged and the previously active index stays in
//! place.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

// notify types come through notify-debouncer-mini so both agree on the
// notify version.
use notify_debouncer_mini::notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{DebounceEventResult, Debouncer, new_debouncer};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use skillflow_core::Registry;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("registry was not loaded from a directory")]
    NoRoot,

    #[error("watcher creation failed: {0}")]
    WatcherCreation(String),

    #[error("failed to watch path '{path}': {reason}")]
    WatchPath { path: PathBuf, reason: String },
}

/// Outcome of one reload attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    Reloaded,
    KeptPrevious,
}

/// Keeps the registry watcher alive. Dropping it stops watching.
pub struct RegistryWatcher {
    _debouncer: Debouncer<RecommendedWatcher>,
    root: PathBuf,
    task: JoinHandle<()>,
}

impl RegistryWatcher {
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Drop for RegistryWatcher {
    fn drop(&mut self) {
        self.task.abort();
        tracing::debug!(root = %self.root.display(), "registry watcher dropped");
    }
}

/// Watch the registry root and reload on every debounced batch of changes.
///
/// Must be called from within a Tokio runtime.
pub fn watch_registry(registry: Arc<Registry>, debounce: Duration) -> Result<RegistryWatcher, WatchError> {
    let root = registry.root().ok_or(WatchError::NoRoot)?.to_path_buf();
    // Capacity 1: a reload already queued covers any later change.
    let (tx, mut rx) = mpsc::channel::<()>(1);

    let mut debouncer = new_debouncer(debounce, move |result: DebounceEventResult| match result {
        Ok(events) if !events.is_empty() => {
            tracing::debug!(count = events.len(), "registry change detected");
            let _ = tx.try_send(());
        }
        Ok(_) => {}
        Err(err) => tracing::warn!(error = %err, "registry watcher error"),
    })
    .map_err(|e| WatchError::WatcherCreation(e.to_string()))?;

    debouncer
        .watcher()
        .watch(&root, RecursiveMode::Recursive)
        .map_err(|e| WatchError::WatchPath {
            path: root.clone(),
            reason: e.to_string(),
        })?;

    let task = tokio::spawn(async move {
        while rx.recv().await.is_some() {
            let registry = Arc::clone(&registry);
            if let Err(err) = tokio::task::spawn_blocking(move || reload_now(&registry)).await {
                tracing::error!(error = %err, "registry reload task panicked");
            }
        }
    });

    tracing::info!(root = %root.display(), "registry watcher started");
    Ok(RegistryWatcher {
        _debouncer: debouncer,
        root,
        task,
    })
}

/// Reload the registry, keeping the active index if the new one is invalid.
pub fn reload_now(registry: &Registry) -> ReloadOutcome {
    match registry.reload() {
        Ok(index) => {
            tracing::info!(
                skills = index.skill_count(),
                flows = index.flow_count(),
                "registry hot-reloaded"
            );
            ReloadOutcome::Reloaded
        }
        Err(err) => {
            tracing::warn!(error = %err, "registry reload failed, keeping previous index");
            ReloadOutcome::KeptPrevious
        }
    }
}

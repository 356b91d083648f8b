use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use crate::infra::error::InfraError;

use super::patterns::IgnoreMatcher;

/// Fan-out of reload signals to every connected browser.
#[derive(Debug, Clone)]
pub struct ReloadNotifier {
    sender: broadcast::Sender<()>,
}

impl Default for ReloadNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ReloadNotifier {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(16);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.sender.subscribe()
    }

    /// Returns the number of clients that were signalled.
    pub fn notify(&self) -> usize {
        self.sender.send(()).unwrap_or(0)
    }
}

/// Start watching `root` recursively. Relevant changes are coalesced for
/// `debounce` and then signalled once through `notifier`.
///
/// The returned watcher must be kept alive for events to keep flowing.
pub fn watch_root(
    root: &Path,
    matcher: Arc<IgnoreMatcher>,
    debounce: Duration,
    notifier: ReloadNotifier,
) -> Result<RecommendedWatcher, InfraError> {
    let (notify_tx, notify_rx) = std::sync::mpsc::channel();
    let mut watcher = notify::recommended_watcher(move |res| {
        let _ = notify_tx.send(res);
    })
    .map_err(|err| InfraError::watcher(err.to_string()))?;
    watcher
        .watch(root, RecursiveMode::Recursive)
        .map_err(|err| InfraError::watcher(format!("{}: {err}", root.display())))?;

    // notify delivers on its own thread; bridge into the runtime.
    let (async_tx, mut async_rx) = mpsc::channel::<Event>(64);
    std::thread::spawn(move || {
        while let Ok(result) = notify_rx.recv() {
            match result {
                Ok(event) => {
                    if async_tx.blocking_send(event).is_err() {
                        break;
                    }
                }
                Err(err) => warn!(
                    target = "isledoc::livereload",
                    error = %err,
                    "File watcher error"
                ),
            }
        }
    });

    let root = root.to_path_buf();
    tokio::spawn(async move {
        while let Some(event) = async_rx.recv().await {
            let Some(changed) = first_relevant_path(&root, &event, &matcher) else {
                continue;
            };

            // Swallow the burst that follows a single save.
            let deadline = tokio::time::sleep(debounce);
            tokio::pin!(deadline);
            loop {
                tokio::select! {
                    _ = &mut deadline => break,
                    next = async_rx.recv() => {
                        if next.is_none() {
                            break;
                        }
                    }
                }
            }

            let clients = notifier.notify();
            debug!(
                target = "isledoc::livereload",
                path = %changed.display(),
                clients,
                "Reload signalled"
            );
        }
    });

    Ok(watcher)
}

/// First path in `event` that is under `root` and not ignored, relative to
/// `root`. Pure access events never count.
pub(crate) fn first_relevant_path(
    root: &Path,
    event: &Event,
    matcher: &IgnoreMatcher,
) -> Option<PathBuf> {
    if matches!(event.kind, EventKind::Access(_)) {
        return None;
    }

    event.paths.iter().find_map(|path| {
        let relative = path.strip_prefix(root).ok()?;
        if relative.as_os_str().is_empty() {
            return None;
        }
        let is_dir = path.is_dir();
        (!matcher.is_ignored(relative, is_dir)).then(|| relative.to_path_buf())
    })
}

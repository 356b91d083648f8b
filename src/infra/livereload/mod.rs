//! Development server that serves the output directory and tells connected
//! browsers to reload when a published file changes.

mod patterns;
mod server;
mod watcher;

use std::{net::IpAddr, path::Path, sync::Arc, time::Duration};

use tokio::net::TcpListener;
use tracing::info;

use super::error::InfraError;

pub use patterns::IgnoreMatcher;
pub use server::{LIVERELOAD_PATH, build_router};
pub use watcher::{ReloadNotifier, watch_root};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveReloadSettings {
    pub host: IpAddr,
    pub port: u16,
    /// Gitignore-style patterns, relative to the served root.
    pub ignore: Vec<String>,
    pub debounce: Duration,
}

/// Watch and serve `root` until the listener fails.
pub async fn serve(root: &Path, settings: &LiveReloadSettings) -> Result<(), InfraError> {
    let root = tokio::fs::canonicalize(root).await?;
    let matcher = Arc::new(IgnoreMatcher::new(&settings.ignore)?);
    let notifier = ReloadNotifier::new();
    let _watcher = watch_root(&root, matcher, settings.debounce, notifier.clone())?;

    let listener = TcpListener::bind((settings.host, settings.port)).await?;
    info!(
        target = "isledoc::livereload",
        addr = %listener.local_addr()?,
        root = %root.display(),
        "Live reload server listening"
    );

    let router = build_router(root, notifier);
    axum::serve(listener, router.into_make_service()).await?;
    Ok(())
}

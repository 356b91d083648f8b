use std::{
    ffi::OsString,
    io,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};

use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use super::FileSystem;

/// Delay between rename attempts while the destination is held by another process.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Extension appended to pending writes; the live-reload watcher ignores it.
pub const TEMP_EXTENSION: &str = "tmp";

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("destination `{path}` has no file name")]
    InvalidDestination { path: PathBuf },
    #[error("failed to write pending file `{path}`: {source}")]
    WriteTemp {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Outcome of a successful publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishReport {
    pub bytes: usize,
    /// Rename attempts including the successful one.
    pub attempts: u32,
}

/// Publishes file contents by writing a sibling temp file and renaming it
/// over the destination.
///
/// Readers of the destination only ever observe the previous or the new
/// complete content. A failed rename is treated as a transient lock and
/// retried after [`DEFAULT_RETRY_DELAY`] with no upper bound.
#[derive(Clone)]
pub struct AtomicWriter {
    fs: Arc<dyn FileSystem>,
    retry_delay: Duration,
}

impl AtomicWriter {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self {
            fs,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub async fn write(
        &self,
        destination: &Path,
        contents: &str,
    ) -> Result<PublishReport, PublishError> {
        let pending = pending_path(destination)?;

        if let Err(source) = self.fs.write(&pending, contents.as_bytes()).await {
            // The pending file may exist half-written; it is never published.
            let _ = self.fs.remove_file(&pending).await;
            return Err(PublishError::WriteTemp {
                path: pending,
                source,
            });
        }

        let started_at = Instant::now();
        let mut attempts: u32 = 0;
        loop {
            attempts = attempts.saturating_add(1);
            match self.fs.rename(&pending, destination).await {
                Ok(()) => break,
                Err(err) => {
                    metrics::counter!("isledoc_publish_retry_total").increment(1);
                    warn!(
                        target = "isledoc::publish",
                        destination = %destination.display(),
                        pending = %pending.display(),
                        attempt = attempts,
                        retry_in_ms = self.retry_delay.as_millis() as u64,
                        error = %err,
                        "Rename onto destination failed; retrying"
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
            }
        }

        info!(
            target = "isledoc::publish",
            destination = %destination.display(),
            bytes = contents.len(),
            attempts,
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "Published document"
        );

        Ok(PublishReport {
            bytes: contents.len(),
            attempts,
        })
    }
}

/// `<dir>/<name>.<random>.tmp` beside the destination, so the final rename
/// never crosses a volume boundary.
pub(crate) fn pending_path(destination: &Path) -> Result<PathBuf, PublishError> {
    let file_name = destination
        .file_name()
        .ok_or_else(|| PublishError::InvalidDestination {
            path: destination.to_path_buf(),
        })?;

    let (suffix, _) = Uuid::new_v4().as_u64_pair();
    let mut pending_name = OsString::from(file_name);
    pending_name.push(format!(".{suffix}.{TEMP_EXTENSION}"));

    Ok(destination.with_file_name(pending_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::fs::LocalFileSystem;
    use async_trait::async_trait;
    use std::{
        sync::atomic::{AtomicBool, AtomicU32, Ordering},
        time::SystemTime,
    };
    use tempfile::TempDir;

    /// Delegates to the local filesystem but refuses the first `failures` renames.
    struct LockedDestination {
        failures: u32,
        rename_calls: AtomicU32,
        successful_renames: AtomicU32,
    }

    impl LockedDestination {
        fn new(failures: u32) -> Self {
            Self {
                failures,
                rename_calls: AtomicU32::new(0),
                successful_renames: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl FileSystem for LockedDestination {
        async fn list_files(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
            LocalFileSystem.list_files(dir).await
        }

        async fn read_to_string(&self, path: &Path) -> io::Result<String> {
            LocalFileSystem.read_to_string(path).await
        }

        async fn modified(&self, path: &Path) -> io::Result<SystemTime> {
            LocalFileSystem.modified(path).await
        }

        async fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
            LocalFileSystem.write(path, contents).await
        }

        async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
            let call = self.rename_calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(io::Error::new(
                    io::ErrorKind::PermissionDenied,
                    "destination is locked",
                ));
            }
            LocalFileSystem.rename(from, to).await?;
            self.successful_renames.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn remove_file(&self, path: &Path) -> io::Result<()> {
            LocalFileSystem.remove_file(path).await
        }
    }

    fn leftover_pending_files(dir: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(dir)
            .expect("read dir")
            .map(|entry| entry.expect("entry").path())
            .filter(|path| {
                path.extension()
                    .is_some_and(|ext| ext == TEMP_EXTENSION)
            })
            .collect()
    }

    #[test]
    fn pending_path_is_unique_sibling_with_temp_extension() {
        let destination = Path::new("/docs/index.html");
        let first = pending_path(destination).expect("pending path");
        let second = pending_path(destination).expect("pending path");

        assert_ne!(first, second);
        assert_eq!(first.parent(), destination.parent());
        let name = first.file_name().and_then(|n| n.to_str()).expect("utf-8");
        assert!(name.starts_with("index.html."), "unexpected name {name}");
        assert!(name.ends_with(".tmp"), "unexpected name {name}");
        let middle = &name["index.html.".len()..name.len() - ".tmp".len()];
        assert!(middle.chars().all(|c| c.is_ascii_digit()), "suffix {middle}");
    }

    #[test]
    fn pending_path_requires_file_name() {
        let err = pending_path(Path::new("/")).expect_err("root has no file name");
        assert!(matches!(err, PublishError::InvalidDestination { .. }));
    }

    #[tokio::test]
    async fn write_replaces_destination_and_cleans_up() {
        let dir = TempDir::new().expect("temp dir");
        let destination = dir.path().join("guide.html");
        std::fs::write(&destination, "old").expect("seed");

        let writer = AtomicWriter::new(Arc::new(LocalFileSystem));
        let report = writer
            .write(&destination, "<p>new</p>")
            .await
            .expect("publish");

        assert_eq!(report.attempts, 1);
        assert_eq!(report.bytes, "<p>new</p>".len());
        assert_eq!(
            std::fs::read_to_string(&destination).expect("read"),
            "<p>new</p>"
        );
        assert!(leftover_pending_files(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn rename_is_retried_until_the_lock_clears() {
        let dir = TempDir::new().expect("temp dir");
        let destination = dir.path().join("index.html");
        std::fs::write(&destination, "previous").expect("seed");

        let fs = Arc::new(LockedDestination::new(3));
        let writer =
            AtomicWriter::new(fs.clone()).with_retry_delay(Duration::from_millis(1));

        let report = writer
            .write(&destination, "fresh content")
            .await
            .expect("publish eventually succeeds");

        assert_eq!(report.attempts, 4);
        assert_eq!(fs.rename_calls.load(Ordering::SeqCst), 4);
        assert_eq!(fs.successful_renames.load(Ordering::SeqCst), 1);
        assert_eq!(
            std::fs::read_to_string(&destination).expect("read"),
            "fresh content"
        );
        assert!(leftover_pending_files(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn temp_write_failure_is_returned_without_touching_destination() {
        let dir = TempDir::new().expect("temp dir");
        let destination = dir.path().join("missing-dir").join("index.html");

        let writer = AtomicWriter::new(Arc::new(LocalFileSystem));
        let err = writer
            .write(&destination, "content")
            .await
            .expect_err("parent directory does not exist");

        assert!(matches!(err, PublishError::WriteTemp { .. }));
        assert!(!destination.exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_reader_never_sees_partial_content() {
        let dir = TempDir::new().expect("temp dir");
        let destination = dir.path().join("big.html");
        let old = "a".repeat(256 * 1024);
        let new = "b".repeat(512 * 1024);
        std::fs::write(&destination, &old).expect("seed");

        let stop = Arc::new(AtomicBool::new(false));
        let reader = {
            let destination = destination.clone();
            let stop = Arc::clone(&stop);
            let (old, new) = (old.clone(), new.clone());
            tokio::task::spawn_blocking(move || {
                let mut observed = 0usize;
                while !stop.load(Ordering::SeqCst) {
                    let content = std::fs::read_to_string(&destination).expect("read");
                    assert!(
                        content == old || content == new,
                        "observed a partial file of {} bytes",
                        content.len()
                    );
                    observed += 1;
                }
                observed
            })
        };

        let writer = AtomicWriter::new(Arc::new(LocalFileSystem));
        for round in 0..20 {
            let content = if round % 2 == 0 { &new } else { &old };
            writer.write(&destination, content).await.expect("publish");
        }

        stop.store(true, Ordering::SeqCst);
        let observed = reader.await.expect("reader task");
        assert!(observed > 0);
    }
}

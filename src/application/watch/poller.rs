use std::{
    fmt::Display,
    future::Future,
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant, SystemTime},
};

use tracing::{debug, error, info, warn};

use crate::infra::fs::FileSystem;

/// Delay between modification-time checks of one source.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Result of a single poll cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Modification time matches the last one seen.
    Unchanged,
    /// A change was seen and the reaction succeeded.
    Reacted,
    /// A change was seen and the reaction failed. The new time is still
    /// recorded, so the failure is not retried until the file changes again.
    Failed,
    /// The file could not be stat-ed; nothing was recorded. Only the first
    /// failure in a row is logged at `warn`.
    Unavailable,
}

/// Watches one file by polling its modification time and runs `reaction`
/// whenever that time differs from the last one seen.
///
/// The first cycle always reacts. Reactions for one poller never overlap:
/// each is awaited before the next stat.
pub struct ChangePoller<R> {
    path: PathBuf,
    fs: Arc<dyn FileSystem>,
    reaction: R,
    interval: Duration,
    last_seen_modified: Option<SystemTime>,
    unavailable: bool,
}

impl<R, Fut, E> ChangePoller<R>
where
    R: FnMut() -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: Display,
{
    pub fn new(path: impl Into<PathBuf>, fs: Arc<dyn FileSystem>, reaction: R) -> Self {
        Self {
            path: path.into(),
            fs,
            reaction,
            interval: DEFAULT_POLL_INTERVAL,
            last_seen_modified: None,
            unavailable: false,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    #[cfg(test)]
    fn last_seen_modified(&self) -> Option<SystemTime> {
        self.last_seen_modified
    }

    /// Run one cycle without sleeping.
    pub async fn poll_once(&mut self) -> PollOutcome {
        let modified = match self.fs.modified(&self.path).await {
            Ok(modified) => modified,
            Err(err) => {
                if self.unavailable {
                    debug!(
                        target = "isledoc::watch",
                        source = %self.path.display(),
                        error = %err,
                        "Source still unavailable"
                    );
                } else {
                    warn!(
                        target = "isledoc::watch",
                        source = %self.path.display(),
                        error = %err,
                        "Unable to read modification time"
                    );
                    self.unavailable = true;
                }
                return PollOutcome::Unavailable;
            }
        };

        if self.unavailable {
            info!(
                target = "isledoc::watch",
                source = %self.path.display(),
                "Source available again"
            );
            self.unavailable = false;
        }

        if self.last_seen_modified == Some(modified) {
            return PollOutcome::Unchanged;
        }

        debug!(
            target = "isledoc::watch",
            source = %self.path.display(),
            "Change detected"
        );

        let started_at = Instant::now();
        let result = (self.reaction)().await;
        let elapsed_ms = started_at.elapsed().as_millis() as u64;
        self.last_seen_modified = Some(modified);

        match result {
            Ok(()) => PollOutcome::Reacted,
            Err(err) => {
                error!(
                    target = "isledoc::watch",
                    source = %self.path.display(),
                    error = %err,
                    elapsed_ms,
                    "Reaction failed; waiting for the next change"
                );
                PollOutcome::Failed
            }
        }
    }

    /// Poll forever. Only returns if the surrounding task is aborted.
    pub async fn run(mut self) {
        loop {
            self.poll_once().await;
            tokio::time::sleep(self.interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::fs::LocalFileSystem;
    use std::{
        path::Path,
        sync::atomic::{AtomicUsize, Ordering},
    };
    use tempfile::TempDir;
    use tracing::subscriber::DefaultGuard;

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().expect("log buffer").extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl CapturedLogs {
        fn lines_with(&self, level: &str, message: &str) -> Vec<String> {
            let bytes = self.0.lock().expect("log buffer").clone();
            String::from_utf8_lossy(&bytes)
                .lines()
                .filter(|line| line.contains(level) && line.contains(message))
                .map(str::to_string)
                .collect()
        }
    }

    fn capture_logs() -> (CapturedLogs, DefaultGuard) {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        (logs, tracing::subscriber::set_default(subscriber))
    }

    fn counting_reaction(
        calls: Arc<AtomicUsize>,
        fail: bool,
    ) -> impl FnMut() -> std::future::Ready<Result<(), String>> {
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            std::future::ready(if fail {
                Err("render exploded".to_string())
            } else {
                Ok(())
            })
        }
    }

    fn touch(path: &Path, seconds_after_epoch: u64) {
        let file = std::fs::File::options()
            .write(true)
            .open(path)
            .expect("open");
        file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(seconds_after_epoch))
            .expect("set mtime");
    }

    #[tokio::test]
    async fn first_cycle_reacts_and_unchanged_file_is_skipped() {
        let dir = TempDir::new().expect("temp dir");
        let source = dir.path().join("readme.md");
        std::fs::write(&source, "# Hi").expect("write");

        let calls = Arc::new(AtomicUsize::new(0));
        let mut poller = ChangePoller::new(
            &source,
            Arc::new(LocalFileSystem),
            counting_reaction(calls.clone(), false),
        );

        assert_eq!(poller.poll_once().await, PollOutcome::Reacted);
        assert_eq!(poller.poll_once().await, PollOutcome::Unchanged);
        assert_eq!(poller.poll_once().await, PollOutcome::Unchanged);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn any_change_in_modification_time_triggers_reaction() {
        let dir = TempDir::new().expect("temp dir");
        let source = dir.path().join("design.md");
        std::fs::write(&source, "# Design").expect("write");
        touch(&source, 2_000_000);

        let calls = Arc::new(AtomicUsize::new(0));
        let mut poller = ChangePoller::new(
            &source,
            Arc::new(LocalFileSystem),
            counting_reaction(calls.clone(), false),
        );

        assert_eq!(poller.poll_once().await, PollOutcome::Reacted);
        touch(&source, 2_000_100);
        assert_eq!(poller.poll_once().await, PollOutcome::Reacted);
        // Moving the clock backwards is still a change.
        touch(&source, 1_000_000);
        assert_eq!(poller.poll_once().await, PollOutcome::Reacted);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            poller.last_seen_modified(),
            Some(SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000))
        );
    }

    #[tokio::test]
    async fn failed_reaction_is_not_retried_without_a_new_change() {
        let dir = TempDir::new().expect("temp dir");
        let source = dir.path().join("broken.md");
        std::fs::write(&source, "```nope\n```").expect("write");

        let calls = Arc::new(AtomicUsize::new(0));
        let mut poller = ChangePoller::new(
            &source,
            Arc::new(LocalFileSystem),
            counting_reaction(calls.clone(), true),
        );

        assert_eq!(poller.poll_once().await, PollOutcome::Failed);
        assert_eq!(poller.poll_once().await, PollOutcome::Unchanged);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(poller.last_seen_modified().is_some());
    }

    #[tokio::test]
    async fn missing_file_leaves_state_untouched() {
        let dir = TempDir::new().expect("temp dir");
        let source = dir.path().join("gone.md");

        let calls = Arc::new(AtomicUsize::new(0));
        let mut poller = ChangePoller::new(
            &source,
            Arc::new(LocalFileSystem),
            counting_reaction(calls.clone(), false),
        );

        assert_eq!(poller.poll_once().await, PollOutcome::Unavailable);
        assert_eq!(poller.last_seen_modified(), None);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        std::fs::write(&source, "# Back").expect("write");
        assert_eq!(poller.poll_once().await, PollOutcome::Reacted);
    }

    #[tokio::test]
    async fn missing_file_warns_once_until_it_returns() {
        let (logs, _guard) = capture_logs();
        let dir = TempDir::new().expect("temp dir");
        let source = dir.path().join("gone.md");

        let calls = Arc::new(AtomicUsize::new(0));
        let mut poller = ChangePoller::new(
            &source,
            Arc::new(LocalFileSystem),
            counting_reaction(calls.clone(), false),
        );

        for _ in 0..3 {
            assert_eq!(poller.poll_once().await, PollOutcome::Unavailable);
        }
        assert_eq!(logs.lines_with("WARN", "Unable to read modification time").len(), 1);
        assert_eq!(logs.lines_with("DEBUG", "Source still unavailable").len(), 2);

        std::fs::write(&source, "# Back").expect("write");
        assert_eq!(poller.poll_once().await, PollOutcome::Reacted);
        assert_eq!(logs.lines_with("INFO", "Source available again").len(), 1);

        std::fs::remove_file(&source).expect("remove");
        assert_eq!(poller.poll_once().await, PollOutcome::Unavailable);
        assert_eq!(logs.lines_with("WARN", "Unable to read modification time").len(), 2);
    }

    #[tokio::test]
    async fn failed_reaction_is_logged_with_its_duration() {
        let (logs, _guard) = capture_logs();
        let dir = TempDir::new().expect("temp dir");
        let source = dir.path().join("broken.md");
        std::fs::write(&source, "x").expect("write");

        let mut poller = ChangePoller::new(
            &source,
            Arc::new(LocalFileSystem),
            counting_reaction(Arc::new(AtomicUsize::new(0)), true),
        );

        assert_eq!(poller.poll_once().await, PollOutcome::Failed);
        let failures = logs.lines_with("ERROR", "Reaction failed");
        assert_eq!(failures.len(), 1);
        assert!(failures[0].contains("elapsed_ms="), "{}", failures[0]);
        assert!(failures[0].contains("render exploded"));
    }

    async fn wait_for_calls(calls: &AtomicUsize, expected: usize) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while calls.load(Ordering::SeqCst) < expected {
            assert!(
                tokio::time::Instant::now() < deadline,
                "reaction ran {} times, expected {expected}",
                calls.load(Ordering::SeqCst)
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn run_keeps_polling_until_aborted() {
        let dir = TempDir::new().expect("temp dir");
        let source = dir.path().join("guide.md");
        std::fs::write(&source, "# v1").expect("write");
        touch(&source, 3_000_000);

        let calls = Arc::new(AtomicUsize::new(0));
        let poller = ChangePoller::new(
            &source,
            Arc::new(LocalFileSystem),
            counting_reaction(calls.clone(), false),
        )
        .with_interval(Duration::from_millis(20));
        let handle = tokio::spawn(poller.run());

        wait_for_calls(&calls, 1).await;
        touch(&source, 3_000_001);
        wait_for_calls(&calls, 2).await;

        handle.abort();
        assert!(handle.await.expect_err("aborted").is_cancelled());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}

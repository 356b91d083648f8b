use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};

use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::{
    application::render::{RenderRequest, RenderService},
    domain::documents::{DocumentCatalog, WatchTarget},
    infra::fs::{AtomicWriter, DEFAULT_RETRY_DELAY, FileSystem, PublishReport},
};

use super::{
    error::WatchError,
    poller::{ChangePoller, DEFAULT_POLL_INTERVAL},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchSettings {
    /// Directory scanned (non-recursively) for markdown sources.
    pub root: PathBuf,
    pub poll_interval: Duration,
    pub publish_retry: Duration,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            poll_interval: DEFAULT_POLL_INTERVAL,
            publish_retry: DEFAULT_RETRY_DELAY,
        }
    }
}

/// Reaction run by a watch task: read the source, render it, publish it.
pub struct DocumentPublisher {
    target: WatchTarget,
    fs: Arc<dyn FileSystem>,
    renderer: Arc<dyn RenderService>,
    writer: AtomicWriter,
}

impl DocumentPublisher {
    pub fn new(
        target: WatchTarget,
        fs: Arc<dyn FileSystem>,
        renderer: Arc<dyn RenderService>,
        writer: AtomicWriter,
    ) -> Self {
        Self {
            target,
            fs,
            renderer,
            writer,
        }
    }

    pub async fn publish(&self) -> Result<PublishReport, WatchError> {
        metrics::counter!("isledoc_render_total").increment(1);
        let started_at = Instant::now();

        let result = self.render_and_write(started_at).await;
        match &result {
            Ok(_) => {
                metrics::histogram!("isledoc_render_ms")
                    .record(started_at.elapsed().as_secs_f64() * 1000.0);
            }
            Err(_) => metrics::counter!("isledoc_render_failed_total").increment(1),
        }
        result
    }

    async fn render_and_write(&self, started_at: Instant) -> Result<PublishReport, WatchError> {
        let source = &self.target.source;
        let markdown =
            self.fs
                .read_to_string(source)
                .await
                .map_err(|source_err| WatchError::ReadSource {
                    path: source.clone(),
                    source: source_err,
                })?;

        let request = RenderRequest::new(
            markdown,
            self.target.metadata.clone(),
            OffsetDateTime::now_utc(),
        );
        let output = self
            .renderer
            .render(&request)
            .map_err(|err| WatchError::Render {
                path: source.clone(),
                source: err,
            })?;

        info!(
            target = "isledoc::render",
            source = %source.display(),
            headings = output.headings.len(),
            code_blocks = output.code_blocks,
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "Rendered document"
        );

        self.writer
            .write(&self.target.output, &output.html)
            .await
            .map_err(|err| WatchError::Publish {
                path: self.target.output.clone(),
                source: err,
            })
    }
}

/// Discovers the sources under the root and runs one watch task per file.
pub struct Orchestrator {
    fs: Arc<dyn FileSystem>,
    renderer: Arc<dyn RenderService>,
    catalog: DocumentCatalog,
    settings: WatchSettings,
}

impl Orchestrator {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        renderer: Arc<dyn RenderService>,
        catalog: DocumentCatalog,
        settings: WatchSettings,
    ) -> Self {
        Self {
            fs,
            renderer,
            catalog,
            settings,
        }
    }

    pub fn root(&self) -> &Path {
        &self.settings.root
    }

    /// Markdown sources directly inside the root, sorted by file name.
    pub async fn discover(&self) -> Result<Vec<WatchTarget>, WatchError> {
        let root = &self.settings.root;
        let files = self
            .fs
            .list_files(root)
            .await
            .map_err(|source| WatchError::Discovery {
                root: root.clone(),
                source,
            })?;

        let mut targets: Vec<WatchTarget> = files
            .iter()
            .filter_map(|path| self.catalog.target_for(path))
            .collect();
        targets.sort_by(|a, b| a.source.file_name().cmp(&b.source.file_name()));

        Ok(targets)
    }

    /// Spawn one polling task per discovered source. The tasks are not
    /// awaited; they run for the life of the runtime.
    pub async fn start(&self) -> Result<WatchSet, WatchError> {
        let targets = self.discover().await?;
        if targets.is_empty() {
            warn!(
                target = "isledoc::watch",
                root = %self.settings.root.display(),
                "No markdown sources found"
            );
        }

        let tasks = targets
            .into_iter()
            .map(|target| {
                info!(
                    target = "isledoc::watch",
                    source = %target.source.display(),
                    output = %target.output.display(),
                    title = %target.metadata.title,
                    "Watching document"
                );
                self.spawn_task(target)
            })
            .collect();

        Ok(WatchSet { tasks })
    }

    fn spawn_task(&self, target: WatchTarget) -> JoinHandle<()> {
        let writer = AtomicWriter::new(Arc::clone(&self.fs))
            .with_retry_delay(self.settings.publish_retry);
        let source = target.source.clone();
        let publisher = Arc::new(DocumentPublisher::new(
            target,
            Arc::clone(&self.fs),
            Arc::clone(&self.renderer),
            writer,
        ));

        let reaction = move || {
            let publisher = Arc::clone(&publisher);
            async move { publisher.publish().await.map(|_| ()) }
        };

        let poller = ChangePoller::new(source, Arc::clone(&self.fs), reaction)
            .with_interval(self.settings.poll_interval);
        tokio::spawn(poller.run())
    }
}

/// Handles of the running watch tasks.
pub struct WatchSet {
    tasks: Vec<JoinHandle<()>>,
}

impl WatchSet {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn abort_all(&self) {
        for handle in &self.tasks {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        application::render::{RenderError, RenderOutput},
        domain::documents::{DocumentRule, RenderMetadata},
        infra::fs::LocalFileSystem,
    };
    use tempfile::TempDir;

    /// Echoes the title and source back, or fails on a marker line.
    struct EchoRenderer;

    impl RenderService for EchoRenderer {
        fn render(&self, request: &RenderRequest) -> Result<RenderOutput, RenderError> {
            if request.markdown.contains("FAIL") {
                return Err(RenderError::Document {
                    message: "forced failure".to_string(),
                });
            }
            Ok(RenderOutput {
                html: format!("<title>{}</title>{}", request.metadata.title, request.markdown),
                headings: Vec::new(),
                code_blocks: 0,
            })
        }
    }

    fn orchestrator(root: &Path, catalog: DocumentCatalog) -> Orchestrator {
        Orchestrator::new(
            Arc::new(LocalFileSystem),
            Arc::new(EchoRenderer),
            catalog,
            WatchSettings {
                root: root.to_path_buf(),
                poll_interval: Duration::from_millis(10),
                publish_retry: Duration::from_millis(1),
            },
        )
    }

    #[tokio::test]
    async fn discovery_is_sorted_and_filters_non_markdown() {
        let dir = TempDir::new().expect("temp dir");
        for name in ["zeta.md", "README.md", "notes.txt", "Guide.MARKDOWN"] {
            std::fs::write(dir.path().join(name), "x").expect("write");
        }
        std::fs::create_dir(dir.path().join("sub")).expect("mkdir");
        std::fs::write(dir.path().join("sub").join("deep.md"), "x").expect("write");

        let targets = orchestrator(dir.path(), DocumentCatalog::default())
            .discover()
            .await
            .expect("discover");

        let outputs: Vec<_> = targets
            .iter()
            .map(|t| t.output.file_name().and_then(|n| n.to_str()).unwrap_or_default().to_string())
            .collect();
        assert_eq!(outputs, ["Guide.html", "index.html", "zeta.html"]);
        assert_eq!(targets[1].metadata.title, "The Island Programming Language");
    }

    #[tokio::test]
    async fn discovery_failure_is_reported() {
        let dir = TempDir::new().expect("temp dir");
        let err = orchestrator(&dir.path().join("missing"), DocumentCatalog::default())
            .discover()
            .await
            .expect_err("root does not exist");
        assert!(matches!(err, WatchError::Discovery { .. }));
    }

    #[tokio::test]
    async fn publisher_renders_with_rule_metadata() {
        let dir = TempDir::new().expect("temp dir");
        let source = dir.path().join("faq.md");
        std::fs::write(&source, "body").expect("write");
        let rule = DocumentRule::new(
            "faq.md",
            "questions.html",
            RenderMetadata::new("FAQ", "", ""),
        )
        .expect("rule");
        let catalog = DocumentCatalog::with_overrides(vec![rule]);
        let target = catalog.target_for(&source).expect("target");

        let publisher = DocumentPublisher::new(
            target,
            Arc::new(LocalFileSystem),
            Arc::new(EchoRenderer),
            AtomicWriter::new(Arc::new(LocalFileSystem)),
        );
        let report = publisher.publish().await.expect("publish");

        assert_eq!(report.attempts, 1);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("questions.html")).expect("read"),
            "<title>FAQ</title>body"
        );
    }

    #[tokio::test]
    async fn render_failure_leaves_previous_output() {
        let dir = TempDir::new().expect("temp dir");
        let source = dir.path().join("notes.md");
        std::fs::write(&source, "FAIL").expect("write");
        std::fs::write(dir.path().join("notes.html"), "previous").expect("seed");

        let target = DocumentCatalog::default()
            .target_for(&source)
            .expect("target");
        let publisher = DocumentPublisher::new(
            target,
            Arc::new(LocalFileSystem),
            Arc::new(EchoRenderer),
            AtomicWriter::new(Arc::new(LocalFileSystem)),
        );

        let err = publisher.publish().await.expect_err("render fails");
        assert!(matches!(err, WatchError::Render { .. }));
        assert_eq!(
            std::fs::read_to_string(dir.path().join("notes.html")).expect("read"),
            "previous"
        );
    }

    #[tokio::test]
    async fn one_failing_document_does_not_stop_the_others() {
        let dir = TempDir::new().expect("temp dir");
        std::fs::write(dir.path().join("good.md"), "fine").expect("write");
        std::fs::write(dir.path().join("bad.md"), "FAIL").expect("write");

        let watch_set = orchestrator(dir.path(), DocumentCatalog::default())
            .start()
            .await
            .expect("start");
        assert_eq!(watch_set.len(), 2);

        let good_output = dir.path().join("good.html");
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while !good_output.exists() {
            assert!(tokio::time::Instant::now() < deadline, "good.html never appeared");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        std::fs::write(dir.path().join("good.md"), "fine again").expect("rewrite");
        std::fs::File::options()
            .write(true)
            .open(dir.path().join("good.md"))
            .and_then(|file| {
                file.set_modified(std::time::SystemTime::UNIX_EPOCH + Duration::from_secs(86_400))
            })
            .expect("bump mtime");
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let content = std::fs::read_to_string(&good_output).unwrap_or_default();
            if content.ends_with("fine again") {
                break;
            }
            assert!(tokio::time::Instant::now() < deadline, "update never published");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert!(!dir.path().join("bad.html").exists());
        watch_set.abort_all();
    }
}

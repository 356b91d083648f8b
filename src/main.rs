use std::{process, sync::Arc};

use isledoc::{
    application::{
        error::AppError,
        render::{Highlighter, RenderPipeline, RenderService},
        watch::Orchestrator,
    },
    config,
    domain::documents::DocumentCatalog,
    infra::{
        fs::{FileSystem, LocalFileSystem},
        livereload, telemetry,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (_cli_args, settings) = config::load_with_cli()?;

    telemetry::init(&settings.logging)?;

    let highlighter = Arc::new(Highlighter::load(&settings.render.highlighter)?);
    let renderer: Arc<dyn RenderService> = Arc::new(RenderPipeline::new(
        highlighter,
        settings.render.pipeline.clone(),
    ));
    let fs: Arc<dyn FileSystem> = Arc::new(LocalFileSystem);
    let catalog = DocumentCatalog::with_overrides(settings.documents.clone());

    let orchestrator = Orchestrator::new(fs, renderer, catalog, settings.watch.clone());
    let watch_set = orchestrator.start().await?;
    info!(
        target = "isledoc::watch",
        root = %orchestrator.root().display(),
        documents = watch_set.len(),
        "Watching documents"
    );

    if settings.server.enabled {
        livereload::serve(orchestrator.root(), &settings.server.live_reload).await?;
    } else {
        // The watch tasks run until the process is interrupted.
        std::future::pending::<()>().await;
    }

    watch_set.abort_all();
    Ok(())
}

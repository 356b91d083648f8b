use std::{io, path::PathBuf};

use thiserror::Error;

use crate::{application::render::RenderError, infra::fs::PublishError};

/// Failures raised while discovering sources or reacting to a change.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("failed to list source directory `{root}`: {source}")]
    Discovery {
        root: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to read source `{path}`: {source}")]
    ReadSource {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to render `{path}`: {source}")]
    Render {
        path: PathBuf,
        #[source]
        source: RenderError,
    },
    #[error("failed to publish `{path}`: {source}")]
    Publish {
        path: PathBuf,
        #[source]
        source: PublishError,
    },
}

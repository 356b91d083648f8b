use thiserror::Error;

use crate::{
    application::{render::HighlighterError, watch::WatchError},
    config::LoadError,
    infra::error::InfraError,
};

/// Fatal startup and runtime failures surfaced by the binary.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to load configuration: {0}")]
    Config(#[from] LoadError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("failed to prepare syntax highlighting: {0}")]
    Highlighter(#[from] HighlighterError),
    #[error(transparent)]
    Watch(#[from] WatchError),
}

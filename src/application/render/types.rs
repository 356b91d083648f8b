use thiserror::Error;
use time::OffsetDateTime;

use crate::domain::documents::RenderMetadata;

/// Rendering request passed into the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRequest {
    /// Source markdown as read from disk.
    pub markdown: String,
    pub metadata: RenderMetadata,
    /// Stamped into the page footer; the only input that varies between
    /// otherwise identical renders.
    pub edited_at: OffsetDateTime,
}

impl RenderRequest {
    pub fn new(
        markdown: impl Into<String>,
        metadata: RenderMetadata,
        edited_at: OffsetDateTime,
    ) -> Self {
        Self {
            markdown: markdown.into(),
            metadata,
            edited_at,
        }
    }
}

/// Heading discovered while rendering, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedHeading {
    pub level: u8,
    pub anchor_slug: String,
    pub text: String,
}

/// Complete page produced by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOutput {
    /// Full HTML document, doctype included.
    pub html: String,
    pub headings: Vec<RenderedHeading>,
    /// Number of fenced or indented code blocks in the body.
    pub code_blocks: usize,
}

/// Structured errors surfaced by the rendering pipeline. Any of them aborts
/// the render; there is no partial output.
#[derive(Debug, Clone, Error)]
pub enum RenderError {
    #[error("markdown rendering failed: {message}")]
    Markdown { message: String },
    #[error("no grammar registered for code fence language `{language}`")]
    UnknownLanguage { language: String },
    #[error("syntax highlighting failed: {language}: {message}")]
    Highlighting { language: String, message: String },
    #[error("document processing failed: {message}")]
    Document { message: String },
    #[error("page template failed: {message}")]
    Template { message: String },
}

/// Trait exposed by the rendering pipeline. Implementations must be
/// deterministic: the same request yields identical output or the same error.
pub trait RenderService: Send + Sync {
    fn render(&self, request: &RenderRequest) -> Result<RenderOutput, RenderError>;
}

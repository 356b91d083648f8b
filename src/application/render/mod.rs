//! Markdown to HTML rendering.
//!
//! The pipeline is pure: it accepts markdown plus metadata, produces a
//! complete HTML page, and surfaces structured errors. Reading sources and
//! publishing output happen in the caller, typically a watch task.

mod service;
mod types;

pub use service::{
    DEFAULT_ANCHOR_SYMBOL, DEFAULT_THEME, Highlighter, HighlighterError, HighlighterSettings,
    PipelineSettings, RenderPipeline, RewriteSummary, ShellAssets, ThemeSource,
};
pub use types::{RenderError, RenderOutput, RenderRequest, RenderService, RenderedHeading};

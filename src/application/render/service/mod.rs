mod config;
mod highlight;
mod html;
mod rewrite;
mod sections;
mod shell;
mod toc;

use std::sync::Arc;

use comrak::{Arena, format_html, nodes::AstNode, parse_document};

use crate::application::render::types::{
    RenderError, RenderOutput, RenderRequest, RenderService, RenderedHeading,
};

pub use highlight::{DEFAULT_THEME, Highlighter, HighlighterError, HighlighterSettings, ThemeSource};
pub use shell::ShellAssets;

use config::default_options;
use rewrite::{RewriteOutcome, rewrite_ast};
use sections::{apply_heading_anchors, wrap_sections};
use toc::restore_toc;

/// Permalink glyph appended to headings when nothing else is configured.
pub const DEFAULT_ANCHOR_SYMBOL: &str = "¶";

/// Page-level options that do not depend on the document being rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    pub anchor_symbol: String,
    pub assets: ShellAssets,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            anchor_symbol: DEFAULT_ANCHOR_SYMBOL.to_string(),
            assets: ShellAssets::default(),
        }
    }
}

/// Comrak-based rendering pipeline with Syntect highlighting.
///
/// Stages run in a fixed order: parse, rewrite (highlight, slugs, TOC
/// marker), emit HTML, heading anchors, TOC restore, section wrapping and
/// finally the document shell.
pub struct RenderPipeline {
    options: comrak::Options<'static>,
    highlighter: Arc<Highlighter>,
    settings: PipelineSettings,
}

impl RenderPipeline {
    pub fn new(highlighter: Arc<Highlighter>, settings: PipelineSettings) -> Self {
        Self {
            options: default_options(),
            highlighter,
            settings,
        }
    }

    /// Render only the `<main>` body, without the surrounding page.
    pub fn render_body(&self, markdown: &str) -> Result<(String, RewriteSummary), RenderError> {
        let arena = Arena::new();
        let root = parse_document(&arena, markdown, &self.options);

        let outcome = rewrite_ast(root, &self.highlighter)?;
        let rendered_html = render_html_stage(root, &self.options)?;
        let anchored_html =
            apply_heading_anchors(&rendered_html, &outcome.headings, &self.settings.anchor_symbol)?;
        let restored_html = restore_toc(anchored_html, &outcome.headings);
        let body = wrap_sections(&restored_html)?;

        Ok((body, RewriteSummary::from_outcome(outcome)))
    }
}

impl RenderService for RenderPipeline {
    fn render(&self, request: &RenderRequest) -> Result<RenderOutput, RenderError> {
        let (body, summary) = self.render_body(&request.markdown)?;
        let html = shell::render_document(
            &request.metadata,
            &self.settings.assets,
            &body,
            request.edited_at,
        )?;

        Ok(RenderOutput {
            html,
            headings: summary.headings,
            code_blocks: summary.code_blocks,
        })
    }
}

/// What the rewrite pass learned about a document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewriteSummary {
    pub headings: Vec<RenderedHeading>,
    pub code_blocks: usize,
}

impl RewriteSummary {
    fn from_outcome(outcome: RewriteOutcome) -> Self {
        Self {
            headings: outcome
                .headings
                .into_iter()
                .map(|heading| RenderedHeading {
                    level: heading.level,
                    anchor_slug: heading.slug,
                    text: heading.text,
                })
                .collect(),
            code_blocks: outcome.code_blocks,
        }
    }
}

fn render_html_stage<'a>(
    root: &'a AstNode<'a>,
    options: &comrak::Options<'static>,
) -> Result<String, RenderError> {
    let mut html = String::new();
    format_html(root, options, &mut html).map_err(|err| RenderError::Markdown {
        message: err.to_string(),
    })?;
    Ok(html)
}

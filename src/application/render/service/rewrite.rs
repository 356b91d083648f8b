use comrak::nodes::{AstNode, NodeHtmlBlock, NodeValue};

use crate::{application::render::types::RenderError, domain::slug::AnchorSlugger};

use super::highlight::{Highlighter, plain_code_block};

/// Paragraph contents that request a table of contents at that position.
pub(crate) const TOC_MARKERS: [&str; 3] = ["[[toc]]", "[toc]", "${toc}"];

pub(crate) const TOC_PLACEHOLDER: &str = "<div>__ISLEDOC_TOC_PLACEHOLDER__</div>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct HeadingInfo {
    pub(crate) level: u8,
    pub(crate) slug: String,
    pub(crate) text: String,
    /// Direct child of the document rather than nested in a list or quote.
    pub(crate) top_level: bool,
}

#[derive(Debug, Default)]
pub(crate) struct RewriteOutcome {
    pub(crate) headings: Vec<HeadingInfo>,
    pub(crate) code_blocks: usize,
}

/// Walk the parsed document once: highlight code blocks in place, assign
/// unique anchor slugs to headings, and swap TOC markers for a placeholder.
pub(crate) fn rewrite_ast<'a>(
    root: &'a AstNode<'a>,
    highlighter: &Highlighter,
) -> Result<RewriteOutcome, RenderError> {
    let mut walker = RewriteWalker::new(highlighter);
    walker.visit_nodes(root, 0)?;
    Ok(walker.outcome)
}

struct RewriteWalker<'a> {
    highlighter: &'a Highlighter,
    outcome: RewriteOutcome,
    slugger: AnchorSlugger,
}

impl<'a> RewriteWalker<'a> {
    fn new(highlighter: &'a Highlighter) -> Self {
        Self {
            highlighter,
            outcome: RewriteOutcome::default(),
            slugger: AnchorSlugger::new(),
        }
    }

    fn visit_nodes(&mut self, node: &AstNode<'_>, depth: usize) -> Result<(), RenderError> {
        if let Some(level) = heading_level(node) {
            let text = collect_inline_text(node);
            let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
            let slug = self.slugger.anchor_for(&normalized);
            self.outcome.headings.push(HeadingInfo {
                level,
                slug,
                text: normalized,
                top_level: depth == 1,
            });
        }

        if let Some((info, literal)) = extract_code_block(node) {
            let html = match info.split_whitespace().next() {
                Some(language) => self.highlighter.highlight(language, &literal)?,
                None => plain_code_block(&literal),
            };
            self.outcome.code_blocks += 1;
            replace_with_html(node, html);
            return Ok(());
        }

        if depth == 1 && is_toc_marker(node) {
            replace_with_html(node, TOC_PLACEHOLDER.to_string());
            return Ok(());
        }

        let mut child = node.first_child();
        while let Some(next) = child {
            self.visit_nodes(next, depth + 1)?;
            child = next.next_sibling();
        }

        Ok(())
    }
}

fn replace_with_html(node: &AstNode<'_>, mut literal: String) {
    literal.push('\n');
    let mut data = node.data.borrow_mut();
    data.value = NodeValue::HtmlBlock(NodeHtmlBlock {
        block_type: 0,
        literal,
    });
}

fn is_toc_marker(node: &AstNode<'_>) -> bool {
    {
        let data = node.data.borrow();
        if !matches!(data.value, NodeValue::Paragraph) {
            return false;
        }
    }
    let text = collect_inline_text(node);
    let trimmed = text.trim();
    TOC_MARKERS
        .iter()
        .any(|marker| trimmed.eq_ignore_ascii_case(marker))
}

fn collect_inline_text(node: &AstNode<'_>) -> String {
    fn walk(node: &AstNode<'_>, buffer: &mut String) {
        {
            let data = node.data.borrow();
            match &data.value {
                NodeValue::Text(text) => buffer.push_str(text),
                NodeValue::Code(code) => buffer.push_str(&code.literal),
                NodeValue::LineBreak | NodeValue::SoftBreak => buffer.push(' '),
                _ => {}
            }
        }
        let mut child = node.first_child();
        while let Some(next) = child {
            walk(next, buffer);
            child = next.next_sibling();
        }
    }

    let mut text = String::new();
    let mut child = node.first_child();
    while let Some(next) = child {
        walk(next, &mut text);
        child = next.next_sibling();
    }
    text
}

fn extract_code_block(node: &AstNode<'_>) -> Option<(String, String)> {
    let data = node.data.borrow();
    if let NodeValue::CodeBlock(block) = &data.value {
        Some((block.info.trim().to_string(), block.literal.clone()))
    } else {
        None
    }
}

fn heading_level(node: &AstNode<'_>) -> Option<u8> {
    let data = node.data.borrow();
    if let NodeValue::Heading(heading) = &data.value {
        Some(heading.level)
    } else {
        None
    }
}

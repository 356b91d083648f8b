use askama::Template;
use time::{
    OffsetDateTime, UtcOffset,
    format_description::{FormatItem, well_known::Rfc3339},
    macros::format_description,
};

use crate::{application::render::types::RenderError, domain::documents::RenderMetadata};

const EDITED_FORMAT: &[FormatItem<'static>] = format_description!(
    "[weekday repr:long], [month repr:long] [day padding:none], [year] at [hour]:[minute] UTC"
);

/// Asset links placed in every page head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellAssets {
    pub stylesheet: String,
    pub icon: String,
}

impl Default for ShellAssets {
    fn default() -> Self {
        Self {
            stylesheet: "style.css".to_string(),
            icon: "favicon.ico".to_string(),
        }
    }
}

#[derive(Template)]
#[template(path = "document.html")]
struct DocumentTemplate<'a> {
    title: &'a str,
    description: &'a str,
    author: &'a str,
    stylesheet: &'a str,
    icon: &'a str,
    body: &'a str,
    edited_iso: String,
    edited_human: String,
}

pub(crate) fn render_document(
    metadata: &RenderMetadata,
    assets: &ShellAssets,
    body: &str,
    edited_at: OffsetDateTime,
) -> Result<String, RenderError> {
    let edited_at = edited_at.to_offset(UtcOffset::UTC);
    let template = DocumentTemplate {
        title: &metadata.title,
        description: &metadata.description,
        author: &metadata.author,
        stylesheet: &assets.stylesheet,
        icon: &assets.icon,
        body,
        edited_iso: edited_at.format(&Rfc3339).map_err(template_error)?,
        edited_human: edited_at.format(EDITED_FORMAT).map_err(template_error)?,
    };

    template.render().map_err(template_error)
}

fn template_error(err: impl std::fmt::Display) -> RenderError {
    RenderError::Template {
        message: err.to_string(),
    }
}

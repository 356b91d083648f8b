use std::{cell::RefCell, rc::Rc};

use lol_html::{RewriteStrSettings, element, html_content::ContentType, rewrite_str};

use crate::application::render::types::RenderError;

use super::{html::escape_text, rewrite::HeadingInfo};

const MARKDOWN_HEADINGS: &str = "h1[data-sourcepos], h2[data-sourcepos], h3[data-sourcepos], \
     h4[data-sourcepos], h5[data-sourcepos], h6[data-sourcepos]";

/// Temporary attribute set on headings that open a `<section>`.
const SECTION_MARKER: &str = "data-section-start";
const SECTION_HEADINGS: &str = "h1[data-section-start], h2[data-section-start], \
     h3[data-section-start], h4[data-section-start], h5[data-section-start], \
     h6[data-section-start]";

/// Give every markdown heading its slug as `id` and append a permalink
/// anchor. Headings written as raw HTML in the source are left untouched.
///
/// Top-level headings are also marked for [`wrap_sections`].
pub(crate) fn apply_heading_anchors(
    html: &str,
    headings: &[HeadingInfo],
    anchor_symbol: &str,
) -> Result<String, RenderError> {
    let headings_shared = Rc::new(headings.to_vec());
    let index = Rc::new(RefCell::new(0usize));
    let error_slot = Rc::new(RefCell::new(None));
    let symbol = escape_text(anchor_symbol);

    let rewritten = rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![
                element!(MARKDOWN_HEADINGS, {
                    let headings_shared = Rc::clone(&headings_shared);
                    let index = Rc::clone(&index);
                    let error_slot = Rc::clone(&error_slot);
                    move |el| {
                        let mut idx = index.borrow_mut();
                        let Some(info) = headings_shared.get(*idx) else {
                            *error_slot.borrow_mut() = Some(RenderError::Document {
                                message: "unexpected extra heading".to_string(),
                            });
                            return Ok(());
                        };
                        *idx += 1;

                        let tag_name = el.tag_name();
                        if heading_level(&tag_name) != info.level {
                            *error_slot.borrow_mut() = Some(RenderError::Document {
                                message: format!(
                                    "heading level mismatch: expected h{}, found {}",
                                    info.level, tag_name
                                ),
                            });
                            return Ok(());
                        }

                        el.set_attribute("id", &info.slug)?;
                        if info.top_level {
                            el.set_attribute(SECTION_MARKER, "")?;
                        }
                        el.append(
                            &format!(
                                " <a class=\"header-anchor\" href=\"#{}\" aria-hidden=\"true\">{symbol}</a>",
                                info.slug
                            ),
                            ContentType::Html,
                        );
                        Ok(())
                    }
                }),
                element!("[data-sourcepos]", |el| {
                    el.remove_attribute("data-sourcepos");
                    Ok(())
                }),
            ],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|err| RenderError::Document {
        message: err.to_string(),
    })?;

    if let Some(err) = error_slot.borrow_mut().take() {
        return Err(err);
    }

    let seen = *index.borrow();
    if seen != headings.len() {
        return Err(RenderError::Document {
            message: format!(
                "expected {} headings in rendered html, found {seen}",
                headings.len()
            ),
        });
    }

    Ok(rewritten)
}

/// Wrap each marked heading and the content that follows it in a
/// `<section>`, nesting deeper headings inside shallower ones. The marker
/// attribute is removed.
pub(crate) fn wrap_sections(html: &str) -> Result<String, RenderError> {
    let open_levels = Rc::new(RefCell::new(Vec::<u8>::new()));

    let mut wrapped = rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![element!(SECTION_HEADINGS, {
                let open_levels = Rc::clone(&open_levels);
                move |el| {
                    let level = heading_level(&el.tag_name());
                    let mut open = open_levels.borrow_mut();

                    let mut prefix = String::new();
                    while open.last().is_some_and(|&outer| outer >= level) {
                        prefix.push_str("</section>\n");
                        open.pop();
                    }
                    prefix.push_str("<section>\n");
                    open.push(level);

                    el.before(&prefix, ContentType::Html);
                    el.remove_attribute(SECTION_MARKER);
                    Ok(())
                }
            })],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|err| RenderError::Document {
        message: err.to_string(),
    })?;

    let still_open = open_levels.borrow().len();
    for _ in 0..still_open {
        wrapped.push_str("</section>\n");
    }

    Ok(wrapped)
}

fn heading_level(tag_name: &str) -> u8 {
    tag_name
        .strip_prefix('h')
        .and_then(|value| value.parse::<u8>().ok())
        .unwrap_or(0)
}

use super::{
    html::{escape_attribute, escape_text},
    rewrite::{HeadingInfo, TOC_PLACEHOLDER},
};

/// Nested ordered list linking to every heading in document order.
pub(crate) fn build_toc(headings: &[HeadingInfo]) -> String {
    let mut html = String::from("<nav class=\"table-of-contents\">");
    let mut open_levels: Vec<u8> = Vec::new();

    for heading in headings {
        match open_levels.last() {
            None => {
                html.push_str("<ol>");
                open_levels.push(heading.level);
            }
            Some(&current) if heading.level > current => {
                html.push_str("<ol>");
                open_levels.push(heading.level);
            }
            Some(_) => {
                while open_levels.len() > 1
                    && open_levels
                        .last()
                        .is_some_and(|&current| heading.level < current)
                {
                    html.push_str("</li></ol>");
                    open_levels.pop();
                }
                html.push_str("</li>");
            }
        }

        html.push_str(&format!(
            "<li><a href=\"#{}\">{}</a>",
            escape_attribute(&heading.slug),
            escape_text(&heading.text)
        ));
    }

    while open_levels.pop().is_some() {
        html.push_str("</li></ol>");
    }
    html.push_str("</nav>");
    html
}

/// Swap the placeholder left by the rewrite pass for the rendered TOC.
pub(crate) fn restore_toc(html: String, headings: &[HeadingInfo]) -> String {
    if !html.contains(TOC_PLACEHOLDER) {
        return html;
    }
    html.replace(TOC_PLACEHOLDER, &build_toc(headings))
}

use std::path::{Path, PathBuf};

use syntect::{
    dumps::from_uncompressed_data,
    easy::HighlightLines,
    highlighting::{Theme, ThemeSet},
    html::{IncludeBackground, styled_line_to_highlighted_html},
    parsing::{SyntaxDefinition, SyntaxReference, SyntaxSet},
    util::LinesWithEndings,
};
use thiserror::Error;
use tracing::debug;

use crate::application::render::types::RenderError;

use super::html::{escape_attribute, escape_text};

/// Theme used when nothing else is configured.
pub const DEFAULT_THEME: &str = "base16-ocean.dark";

const ISLAND_GRAMMAR: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/grammars/isl.sublime-syntax"
));

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThemeSource {
    /// One of syntect's bundled themes, looked up by name.
    Bundled(String),
    /// A `.tmTheme` file on disk.
    File(PathBuf),
}

impl Default for ThemeSource {
    fn default() -> Self {
        Self::Bundled(DEFAULT_THEME.to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HighlighterSettings {
    pub theme: ThemeSource,
    /// Extra `.sublime-syntax` grammars merged into the bundled set.
    pub grammars_dir: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum HighlighterError {
    #[error("bundled syntax pack is invalid: {message}")]
    SyntaxPack { message: String },
    #[error("failed to load grammar `{source_name}`: {message}")]
    Grammar {
        source_name: String,
        message: String,
    },
    #[error("unknown highlight theme `{name}`")]
    UnknownTheme { name: String },
    #[error("failed to load theme file `{path}`: {message}")]
    ThemeFile { path: PathBuf, message: String },
}

/// Grammar registry plus the active color theme.
///
/// Built once at startup and shared by reference across every render; it is
/// never mutated afterwards.
pub struct Highlighter {
    syntax_set: SyntaxSet,
    theme: Theme,
}

impl std::fmt::Debug for Highlighter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Highlighter")
            .field("syntaxes", &self.syntax_set.syntaxes().len())
            .field("theme", &self.theme.name)
            .finish()
    }
}

impl Highlighter {
    pub fn load(settings: &HighlighterSettings) -> Result<Self, HighlighterError> {
        let syntax_bytes = include_bytes!(env!("SYNTAX_PACK_FILE"));
        let bundled: SyntaxSet =
            from_uncompressed_data(syntax_bytes).map_err(|err| HighlighterError::SyntaxPack {
                message: err.to_string(),
            })?;

        let mut builder = bundled.into_builder();
        let island = SyntaxDefinition::load_from_str(ISLAND_GRAMMAR, true, None).map_err(
            |err| HighlighterError::Grammar {
                source_name: "isl.sublime-syntax".to_string(),
                message: err.to_string(),
            },
        )?;
        builder.add(island);

        if let Some(dir) = settings.grammars_dir.as_deref() {
            builder
                .add_from_folder(dir, true)
                .map_err(|err| HighlighterError::Grammar {
                    source_name: dir.display().to_string(),
                    message: err.to_string(),
                })?;
        }

        let syntax_set = builder.build();
        let theme = load_theme(&settings.theme)?;

        debug!(
            target = "isledoc::render::highlight",
            syntaxes = syntax_set.syntaxes().len(),
            theme = theme.name.as_deref().unwrap_or("unnamed"),
            "Highlighter ready"
        );

        Ok(Self { syntax_set, theme })
    }

    /// Highlight `code` as `language`, producing a complete `<pre>` block
    /// with inline styles from the active theme.
    pub fn highlight(&self, language: &str, code: &str) -> Result<String, RenderError> {
        let syntax = find_syntax(&self.syntax_set, language).ok_or_else(|| {
            RenderError::UnknownLanguage {
                language: language.to_string(),
            }
        })?;

        let mut code_with_newline = code.to_string();
        if !code_with_newline.ends_with('\n') {
            code_with_newline.push('\n');
        }

        let mut lines = HighlightLines::new(syntax, &self.theme);
        let mut highlighted = String::with_capacity(code_with_newline.len() * 2);
        for line in LinesWithEndings::from(code_with_newline.as_str()) {
            let regions = lines
                .highlight_line(line, &self.syntax_set)
                .map_err(|err| highlighting_error(language, err))?;
            let html = styled_line_to_highlighted_html(&regions, IncludeBackground::No)
                .map_err(|err| highlighting_error(language, err))?;
            highlighted.push_str(&html);
        }

        let token = escape_attribute(&language.to_ascii_lowercase());
        Ok(format!(
            "<pre class=\"highlight\" data-language=\"{token}\"{style}><code class=\"language-{token}\">{highlighted}</code></pre>",
            style = self.background_style(),
        ))
    }

    fn background_style(&self) -> String {
        self.theme
            .settings
            .background
            .map(|color| {
                format!(
                    " style=\"background-color:#{:02x}{:02x}{:02x};\"",
                    color.r, color.g, color.b
                )
            })
            .unwrap_or_default()
    }
}

/// Code block with no language: escaped verbatim, no highlighting.
pub(crate) fn plain_code_block(code: &str) -> String {
    let mut escaped = escape_text(code);
    if !escaped.ends_with('\n') {
        escaped.push('\n');
    }
    format!("<pre class=\"highlight\"><code>{escaped}</code></pre>")
}

fn highlighting_error(language: &str, err: syntect::Error) -> RenderError {
    RenderError::Highlighting {
        language: language.to_string(),
        message: err.to_string(),
    }
}

fn load_theme(source: &ThemeSource) -> Result<Theme, HighlighterError> {
    match source {
        ThemeSource::Bundled(name) => {
            let mut themes = ThemeSet::load_defaults();
            themes
                .themes
                .remove(name)
                .ok_or_else(|| HighlighterError::UnknownTheme { name: name.clone() })
        }
        ThemeSource::File(path) => load_theme_file(path),
    }
}

fn load_theme_file(path: &Path) -> Result<Theme, HighlighterError> {
    ThemeSet::get_theme(path).map_err(|err| HighlighterError::ThemeFile {
        path: path.to_path_buf(),
        message: err.to_string(),
    })
}

fn find_syntax<'a>(syntax_set: &'a SyntaxSet, token: &str) -> Option<&'a SyntaxReference> {
    let lowercase = token.to_ascii_lowercase();
    syntax_set
        .find_syntax_by_token(&lowercase)
        .or_else(|| syntax_set.find_syntax_by_extension(&lowercase))
        .or_else(|| syntax_set.find_syntax_by_name(token))
}

//! Source documents, their render metadata, and the rules that map a source
//! file name to its published output.

use std::path::{Path, PathBuf};

use super::error::DomainError;

/// Extensions (compared case-insensitively) recognised as markdown sources.
pub const MARKDOWN_EXTENSIONS: [&str; 2] = ["md", "markdown"];

/// Metadata injected into the document shell of a rendered page.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RenderMetadata {
    pub title: String,
    pub description: String,
    pub author: String,
}

impl RenderMetadata {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        author: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            author: author.into(),
        }
    }

    /// Metadata for a document without an explicit rule: the title is the
    /// file stem, description and author stay empty.
    pub fn from_stem(stem: &str) -> Self {
        Self {
            title: stem.to_string(),
            ..Self::default()
        }
    }
}

/// Maps one source file name to a fixed output name and metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRule {
    /// Source file name, matched case-insensitively.
    pub source: String,
    pub output: String,
    pub metadata: RenderMetadata,
}

impl DocumentRule {
    pub fn new(
        source: impl Into<String>,
        output: impl Into<String>,
        metadata: RenderMetadata,
    ) -> Result<Self, DomainError> {
        let source = source.into();
        let output = output.into();
        validate_file_name("source", &source)?;
        validate_file_name("output", &output)?;
        Ok(Self {
            source,
            output,
            metadata,
        })
    }

    fn matches(&self, file_name: &str) -> bool {
        self.source.eq_ignore_ascii_case(file_name)
    }
}

/// Rules shipped with the tool for the Island documentation set.
pub fn builtin_rules() -> Vec<DocumentRule> {
    vec![
        DocumentRule {
            source: "readme.md".to_string(),
            output: "index.html".to_string(),
            metadata: RenderMetadata::new(
                "The Island Programming Language",
                "A small, expression-oriented language for scripting and tooling.",
                "The Island Project",
            ),
        },
        DocumentRule {
            source: "design.md".to_string(),
            output: "design.html".to_string(),
            metadata: RenderMetadata::new(
                "Island Language Design",
                "Design notes and rationale for the Island programming language.",
                "The Island Project",
            ),
        },
    ]
}

/// Resolves output paths and metadata for discovered sources.
///
/// Configured rules are consulted before the built-in ones, so a configured
/// rule for `readme.md` replaces the shipped metadata.
#[derive(Debug, Clone)]
pub struct DocumentCatalog {
    rules: Vec<DocumentRule>,
}

impl Default for DocumentCatalog {
    fn default() -> Self {
        Self {
            rules: builtin_rules(),
        }
    }
}

impl DocumentCatalog {
    pub fn with_overrides(overrides: Vec<DocumentRule>) -> Self {
        let mut rules = overrides;
        rules.extend(builtin_rules());
        Self { rules }
    }

    /// Returns the rule applying to `file_name`, if any.
    pub fn rule_for(&self, file_name: &str) -> Option<&DocumentRule> {
        self.rules.iter().find(|rule| rule.matches(file_name))
    }

    /// Build the watch target for a markdown source. Returns `None` when the
    /// path does not name a markdown file.
    pub fn target_for(&self, source: &Path) -> Option<WatchTarget> {
        if !is_markdown_source(source) {
            return None;
        }

        let file_name = source.file_name()?.to_str()?;
        let stem = source.file_stem()?.to_str()?;
        let directory = source.parent().unwrap_or_else(|| Path::new(""));

        let (output_name, metadata) = match self.rule_for(file_name) {
            Some(rule) => (rule.output.clone(), rule.metadata.clone()),
            None => (format!("{stem}.html"), RenderMetadata::from_stem(stem)),
        };

        Some(WatchTarget {
            source: source.to_path_buf(),
            output: directory.join(output_name),
            metadata,
        })
    }
}

/// Runtime pairing of a source document, its metadata and its destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchTarget {
    pub source: PathBuf,
    pub output: PathBuf,
    pub metadata: RenderMetadata,
}

pub fn is_markdown_source(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            MARKDOWN_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

fn validate_file_name(field: &str, value: &str) -> Result<(), DomainError> {
    if value.trim().is_empty() {
        return Err(DomainError::validation(format!(
            "document {field} must not be empty"
        )));
    }
    if value.contains('/') || value.contains('\\') || value == "." || value == ".." {
        return Err(DomainError::validation(format!(
            "document {field} `{value}` must be a plain file name"
        )));
    }
    Ok(())
}

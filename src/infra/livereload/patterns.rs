use std::path::Path;

use ignore::gitignore::{Gitignore, GitignoreBuilder};

use crate::infra::error::InfraError;

/// Gitignore-style patterns for paths that should not trigger a reload.
#[derive(Debug)]
pub struct IgnoreMatcher {
    matcher: Gitignore,
}

impl IgnoreMatcher {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, InfraError> {
        let mut builder = GitignoreBuilder::new("");
        for pattern in patterns {
            let pattern = pattern.as_ref().trim();
            if pattern.is_empty() || pattern.starts_with('#') {
                continue;
            }
            builder.add_line(None, pattern).map_err(|err| {
                InfraError::configuration(format!("invalid ignore pattern `{pattern}`: {err}"))
            })?;
        }
        let matcher = builder.build().map_err(|err| {
            InfraError::configuration(format!("failed to build ignore matcher: {err}"))
        })?;
        Ok(Self { matcher })
    }

    /// `rel_path` is relative to the served root.
    pub fn is_ignored(&self, rel_path: &Path, is_dir: bool) -> bool {
        self.matcher
            .matched_path_or_any_parents(rel_path, is_dir)
            .is_ignore()
    }
}

//! Client options: which documents reach the server and which workspace
//! files are synchronized.

use std::time::Duration;

use globset::{Glob, GlobMatcher};
use lsp_types::Url;

use crate::error::ClientError;

use super::ClientResult;

/// Compiles a glob, mapping failures into [`ClientError::InvalidGlob`].
pub(crate) fn compile_glob(pattern: &str) -> ClientResult<GlobMatcher> {
    Glob::new(pattern)
        .map(|glob| glob.compile_matcher())
        .map_err(|e| ClientError::InvalidGlob {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })
}

/// A filter over documents. Unset fields match anything.
#[derive(Debug, Clone, Default)]
pub struct DocumentFilter {
    scheme: Option<String>,
    language: Option<String>,
    pattern: Option<GlobMatcher>,
}

impl DocumentFilter {
    /// Creates a filter that matches every document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts the filter to a URI scheme.
    #[must_use]
    pub fn scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = Some(scheme.into());
        self
    }

    /// Restricts the filter to a language identifier.
    #[must_use]
    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Restricts the filter to URI paths matching a glob.
    /// ## Errors
    pub fn pattern(mut self, pattern: &str) -> ClientResult<Self> {
        self.pattern = Some(compile_glob(pattern)?);
        Ok(self)
    }

    /// Checks a document against the filter.
    pub fn matches(&self, uri: &Url, language_id: &str) -> bool {
        if self.scheme.as_deref().is_some_and(|s| s != uri.scheme()) {
            return false;
        }
        if self.language.as_deref().is_some_and(|l| l != language_id) {
            return false;
        }
        self.pattern
            .as_ref()
            .is_none_or(|glob| glob.is_match(uri.path()))
    }
}

/// A set of filters; a document is selected if any filter matches.
#[derive(Debug, Clone, Default)]
pub struct DocumentSelector(Vec<DocumentFilter>);

impl DocumentSelector {
    /// Creates a selector from filters.
    pub fn new(filters: impl IntoIterator<Item = DocumentFilter>) -> Self {
        Self(filters.into_iter().collect())
    }

    /// Checks whether any filter selects the document.
    pub fn matches(&self, uri: &Url, language_id: &str) -> bool {
        self.0.iter().any(|f| f.matches(uri, language_id))
    }
}

/// Workspace files whose changes are reported to the server.
#[derive(Debug, Clone)]
pub struct FileEvents {
    /// Glob relative to the workspace root.
    pub glob: String,
    /// Quiet period before a batch of file events is forwarded.
    pub debounce: Duration,
}

impl FileEvents {
    /// Watches files matching `glob`.
    pub fn new(glob: impl Into<String>) -> Self {
        Self {
            glob: glob.into(),
            debounce: Duration::from_millis(200),
        }
    }

    /// Sets the debounce window.
    #[must_use]
    pub fn debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }
}

/// Options controlling what the client forwards to the server.
#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    /// Documents forwarded to the server.
    pub document_selector: DocumentSelector,
    /// Workspace files synchronized with the server.
    pub synchronize: Option<FileEvents>,
    /// Route server log messages to the trace output.
    pub trace_output: bool,
}

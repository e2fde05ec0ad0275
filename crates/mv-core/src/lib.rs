//! Shared primitives used across mhtview crates.

use core::fmt;

/// Result alias used across the workspace.
pub type ViewerResult<T> = Result<T, ViewerError>;

/// Top-level error type.
///
/// `code` is a stable dotted identifier (`archive.boundary_missing`,
/// `store.no_html`, ...) that tests and callers match on; `message` carries
/// the human-readable detail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewerError {
    pub code: &'static str,
    pub message: String,
}

impl ViewerError {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Returns true if the error belongs to the given code family
    /// (`"archive"` matches `archive.truncated`).
    pub fn is_in(&self, family: &str) -> bool {
        self.code
            .split_once('.')
            .is_some_and(|(prefix, _)| prefix == family)
    }
}

impl fmt::Display for ViewerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ViewerError {}

//! Error taxonomy for the retrieval and chat pipeline.
//!
//! Loaders, index persistence, federation, and the chat facade all return
//! [`HarnessError`] so callers can branch on the failure kind. The CLI
//! boundary converts into `anyhow` for reporting.

use thiserror::Error;

/// Errors produced by the source-to-chat pipeline.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// A declared source could not produce any usable document.
    ///
    /// Raised for missing files, unreadable or empty content, failed HTTP
    /// fetches, and extraction that yields only whitespace. Terminal for
    /// the current rebuild attempt; there are no retries at this layer.
    #[error("source '{source_name}' unavailable: {reason}")]
    SourceUnavailable { source_name: String, reason: String },

    /// No persisted index exists under the requested name.
    #[error("no persisted index named '{0}'")]
    IndexNotFound(String),

    /// A persisted index was written by an incompatible schema version.
    #[error("index '{name}' has schema version {found}, expected {expected}")]
    SchemaMismatch {
        name: String,
        found: i64,
        expected: i64,
    },

    /// Two queryable handles were registered under the same name.
    #[error("duplicate index handle '{0}' during composition")]
    CompositionConflict(String),

    /// The completion backend failed to produce an answer.
    #[error("completion failed: {0}")]
    GenerationFailure(String),

    /// Underlying SQLite failure.
    #[error("storage error: {0}")]
    Store(#[from] sqlx::Error),

    /// Filesystem failure outside of source loading.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl HarnessError {
    /// Shorthand for [`HarnessError::SourceUnavailable`].
    pub fn unavailable(source: &str, reason: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            source_name: source.to_string(),
            reason: reason.into(),
        }
    }

    /// True for the failure kinds that a bootstrap load attempt recovers
    /// from by falling back to a rebuild.
    pub fn is_load_recoverable(&self) -> bool {
        matches!(
            self,
            Self::IndexNotFound(_) | Self::SchemaMismatch { .. } | Self::Store(_)
        )
    }
}

pub type Result<T, E = HarnessError> = std::result::Result<T, E>;

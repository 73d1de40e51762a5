//! Core data models used throughout resume-chat.
//!
//! These types represent the declared sources, loaded documents, chunks,
//! persisted indexes, and retrieved passages that flow through the
//! bootstrap and chat pipeline.

use chrono::{DateTime, Utc};

/// How a declared source's raw bytes are obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchKind {
    /// Read from a local file. PDF is text-extracted; markdown and plain
    /// text are read as UTF-8.
    LocalFile { path: std::path::PathBuf },
    /// HTTP GET against a fixed URL. HTML is flattened to plain text.
    RemoteFetch { url: String },
}

/// Retrieval behavior of an index built from a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalMode {
    /// Keyword match over FTS5, hybrid-merged with cosine similarity when
    /// embeddings are enabled. Returns the top-k scoring chunks.
    TopKSimilarity,
    /// Returns every chunk in document order. Used for short corpora where
    /// the whole text fits in the model context.
    FullSummary,
}

impl RetrievalMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "top_k" => Some(Self::TopKSimilarity),
            "full_summary" => Some(Self::FullSummary),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TopKSimilarity => "top_k",
            Self::FullSummary => "full_summary",
        }
    }
}

/// A declared document source. Immutable once loaded from configuration.
#[derive(Debug, Clone)]
pub struct Source {
    /// Unique name; also the name of the index built from this source.
    pub name: String,
    pub fetch: FetchKind,
    /// Routing text shown to the model alongside retrieved passages,
    /// e.g. "Gabriel's work history".
    pub description: String,
    /// When true, a fetch failure during rebuild aborts the bootstrap.
    /// When false, the source is skipped with a warning.
    pub required: bool,
    /// Which indexes to build from this source. A `FullSummary` entry
    /// produces a second index named `<name>_summary`.
    pub modes: Vec<RetrievalMode>,
}

impl Source {
    /// Name of the index built from this source in the given mode.
    pub fn index_name(&self, mode: RetrievalMode) -> String {
        match mode {
            RetrievalMode::TopKSimilarity => self.name.clone(),
            RetrievalMode::FullSummary => format!("{}_summary", self.name),
        }
    }
}

/// A document produced by a loader, consumed by exactly one index build.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub source: String,
    /// Stable identifier within the source (file path or URL).
    pub source_id: String,
    pub title: Option<String>,
    pub content_type: String,
    pub fetched_at: DateTime<Utc>,
    pub body: String,
    pub metadata_json: String,
}

/// A chunk of a document's body text.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub text: String,
    pub hash: String,
}

/// Metadata describing one persisted per-source index.
///
/// Read back by `reconstruct` without scanning documents or chunks.
#[derive(Debug, Clone)]
pub struct SourceIndex {
    pub name: String,
    pub source: String,
    pub mode: RetrievalMode,
    pub schema_version: i64,
    pub document_count: i64,
    pub chunk_count: i64,
    /// True when embedding vectors were stored at build time.
    pub embedded: bool,
    pub built_at: DateTime<Utc>,
}

/// A retrieved passage, labelled with the index it came from.
#[derive(Debug, Clone)]
pub struct Passage {
    pub index_id: String,
    /// Routing description of the originating source.
    pub description: String,
    pub text: String,
    pub score: f64,
}

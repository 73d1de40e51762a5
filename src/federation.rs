//! Federation of per-source indexes under one queryable identity.
//!
//! Each persisted index is wrapped in a [`QueryHandle`] carrying the
//! routing description of its source. [`compose`] registers handles under
//! their index names; retrieval fans out to every handle and labels each
//! returned passage with its origin.

use sqlx::SqlitePool;
use std::collections::BTreeMap;

use crate::config::Config;
use crate::error::{HarnessError, Result};
use crate::index;
use crate::models::{Passage, SourceIndex};

/// Identity of the composed index.
pub const FEDERATED_INDEX_ID: &str = "main";

/// One queryable member of the federation.
#[derive(Debug, Clone)]
pub struct QueryHandle {
    pub index: SourceIndex,
    /// Routing text carried into every passage this handle returns.
    pub description: String,
}

impl QueryHandle {
    pub fn new(index: SourceIndex, description: impl Into<String>) -> Self {
        Self {
            index,
            description: description.into(),
        }
    }

    /// Name this handle registers under; always the index name.
    pub fn index_id(&self) -> &str {
        &self.index.name
    }
}

/// The composed index. Handles are keyed by index id; iteration order is
/// the sorted id order, which keeps fan-out deterministic.
#[derive(Debug, Clone)]
pub struct FederatedIndex {
    pub id: String,
    handles: BTreeMap<String, QueryHandle>,
}

/// Register `handles` into one [`FederatedIndex`].
///
/// A duplicate index id aborts composition with
/// [`HarnessError::CompositionConflict`]; nothing is silently overwritten.
/// Composing the same handles twice yields an identical federation.
pub fn compose(handles: Vec<QueryHandle>) -> Result<FederatedIndex> {
    let mut registered = BTreeMap::new();

    for handle in handles {
        let id = handle.index_id().to_string();
        if registered.contains_key(&id) {
            return Err(HarnessError::CompositionConflict(id));
        }
        registered.insert(id, handle);
    }

    Ok(FederatedIndex {
        id: FEDERATED_INDEX_ID.to_string(),
        handles: registered,
    })
}

impl FederatedIndex {
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn handle(&self, index_id: &str) -> Option<&QueryHandle> {
        self.handles.get(index_id)
    }

    pub fn handles(&self) -> impl Iterator<Item = &QueryHandle> {
        self.handles.values()
    }

    /// Fan out `query_text` to every registered handle.
    ///
    /// Each handle is queried according to its index's retrieval mode and
    /// its passages are labelled with the handle's id and description.
    /// Coverage is total: no registered handle is skipped.
    pub async fn retrieve(
        &self,
        pool: &SqlitePool,
        config: &Config,
        query_text: &str,
    ) -> Result<Vec<Passage>> {
        let mut passages = Vec::new();

        for handle in self.handles.values() {
            let retrieved = index::query(pool, config, &handle.index, query_text).await?;
            passages.extend(retrieved.into_iter().map(|r| Passage {
                index_id: handle.index.name.clone(),
                description: handle.description.clone(),
                text: r.text,
                score: r.score,
            }));
        }

        Ok(passages)
    }
}

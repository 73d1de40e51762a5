//! Bootstrap resolver: load persisted indexes or rebuild from sources.
//!
//! Resolution runs once per process, before any query is answered:
//!
//! 1. **Attempt load** — reconstruct every declared index from storage.
//!    All present and version-compatible → compose and finish. No source
//!    is fetched on this path.
//! 2. **Rebuild** — on any load failure (or an explicit `--rebuild`),
//!    discard partial results, fetch every declared source, and build all
//!    of its indexes with persistence on.
//!
//! A required source that cannot be fetched aborts the rebuild; an
//! optional source is skipped with a warning.

use sqlx::SqlitePool;

use crate::config::Config;
use crate::error::{HarnessError, Result};
use crate::federation::{compose, FederatedIndex, QueryHandle};
use crate::index;
use crate::migrate;
use crate::models::Source;
use crate::sources::DocumentLoader;

/// Resolve the federated index for this process.
pub async fn resolve(
    pool: &SqlitePool,
    config: &Config,
    loader: &dyn DocumentLoader,
    force_rebuild: bool,
) -> Result<FederatedIndex> {
    let sources = config.declared_sources();

    if force_rebuild {
        println!("bootstrap: rebuild requested");
    } else {
        match attempt_load(pool, &sources).await {
            Ok(handles) => {
                let federated = compose(handles)?;
                println!(
                    "bootstrap: loaded {} persisted indexes as '{}'",
                    federated.len(),
                    federated.id
                );
                return Ok(federated);
            }
            Err(e) if e.is_load_recoverable() => {
                println!("bootstrap: load failed ({}), rebuilding", e);
            }
            Err(e) => return Err(e),
        }
    }

    rebuild(pool, config, loader, &sources).await
}

/// Reconstruct every declared index. Any failure discards the partial
/// handle list and falls back to a rebuild in the caller.
async fn attempt_load(pool: &SqlitePool, sources: &[Source]) -> Result<Vec<QueryHandle>> {
    let mut handles = Vec::new();

    for source in sources {
        for mode in &source.modes {
            let name = source.index_name(*mode);
            let idx = index::reconstruct(pool, &name).await?;
            if idx.mode != *mode {
                // Declared mode changed since this index was built; the
                // persisted shape no longer matches the declaration.
                return Err(HarnessError::IndexNotFound(name));
            }
            handles.push(QueryHandle::new(idx, source.description.clone()));
        }
    }

    Ok(handles)
}

/// Fetch every declared source and build all of its indexes.
async fn rebuild(
    pool: &SqlitePool,
    config: &Config,
    loader: &dyn DocumentLoader,
    sources: &[Source],
) -> Result<FederatedIndex> {
    migrate::run_migrations(pool).await?;

    let mut handles = Vec::new();

    for source in sources {
        let docs = match loader.fetch(source).await {
            Ok(docs) => docs,
            Err(e @ HarnessError::SourceUnavailable { .. }) => {
                if source.required {
                    return Err(e);
                }
                println!(
                    "  warning: skipping optional source '{}': {}",
                    source.name, e
                );
                continue;
            }
            Err(e) => return Err(e),
        };

        println!("  fetched '{}': {} document(s)", source.name, docs.len());

        for mode in &source.modes {
            let name = source.index_name(*mode);
            let idx = index::build(pool, config, &name, source, *mode, &docs).await?;
            println!(
                "  built '{}' ({}): {} chunks",
                name,
                mode.as_str(),
                idx.chunk_count
            );
            handles.push(QueryHandle::new(idx, source.description.clone()));
        }
    }

    let federated = compose(handles)?;
    println!(
        "bootstrap: ready ({} indexes federated as '{}')",
        federated.len(),
        federated.id
    );

    Ok(federated)
}

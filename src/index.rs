//! Per-source index build, reconstruction, and querying.
//!
//! Coordinates the flow for one index: documents → chunking → optional
//! embedding → storage. An index is never mutated after build; a rebuild
//! wholesale-replaces every row scoped to the index name inside one
//! transaction. Loading back (`reconstruct`) reads only the metadata row
//! and verifies the schema version.

use chrono::Utc;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;

use crate::chunk::chunk_text;
use crate::config::Config;
use crate::embedding;
use crate::error::{HarnessError, Result};
use crate::models::{Document, RetrievalMode, Source, SourceIndex};

/// Version stamped into every `indexes` metadata row. A persisted index
/// written under a different version fails `reconstruct` with
/// [`HarnessError::SchemaMismatch`] and is rebuilt from its source.
pub const SCHEMA_VERSION: i64 = 2;

/// A chunk returned by [`query`], before federation labels it.
#[derive(Debug, Clone)]
pub struct Retrieved {
    pub chunk_id: String,
    pub text: String,
    pub score: f64,
}

/// Build and persist the index `name` from `docs`.
///
/// Replaces all rows for `name` (documents, chunks, FTS rows, vectors,
/// metadata) in one transaction. Embedding failures are non-fatal: the
/// index is stored without vectors and retrieval stays keyword-only.
pub async fn build(
    pool: &SqlitePool,
    config: &Config,
    name: &str,
    source: &Source,
    mode: RetrievalMode,
    docs: &[Document],
) -> Result<SourceIndex> {
    // Embed before opening the transaction so a slow provider does not
    // hold the write lock.
    let mut chunked: Vec<(Document, Vec<crate::models::Chunk>)> = Vec::new();
    for doc in docs {
        let chunks = chunk_text(&doc.id, &doc.body, config.chunking.max_tokens);
        chunked.push((doc.clone(), chunks));
    }

    let mut vectors: HashMap<String, Vec<u8>> = HashMap::new();
    let mut embedded = false;
    if config.embedding.is_enabled() && mode == RetrievalMode::TopKSimilarity {
        match embed_all(config, &chunked).await {
            Ok(v) => {
                vectors = v;
                embedded = true;
            }
            Err(e) => {
                println!(
                    "  warning: embedding failed for '{}', continuing keyword-only: {}",
                    name, e
                );
            }
        }
    }

    let built_at = Utc::now();
    let mut document_count: i64 = 0;
    let mut chunk_count: i64 = 0;

    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM chunk_vectors WHERE index_name = ?")
        .bind(name)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM chunks_fts WHERE index_name = ?")
        .bind(name)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM chunks WHERE index_name = ?")
        .bind(name)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM documents WHERE index_name = ?")
        .bind(name)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM indexes WHERE name = ?")
        .bind(name)
        .execute(&mut *tx)
        .await?;

    for (doc, chunks) in &chunked {
        sqlx::query(
            r#"
            INSERT INTO documents (id, index_name, source, source_id, title, content_type, fetched_at, body, metadata_json)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&doc.id)
        .bind(name)
        .bind(&doc.source)
        .bind(&doc.source_id)
        .bind(&doc.title)
        .bind(&doc.content_type)
        .bind(doc.fetched_at.timestamp())
        .bind(&doc.body)
        .bind(&doc.metadata_json)
        .execute(&mut *tx)
        .await?;
        document_count += 1;

        for chunk in chunks {
            sqlx::query(
                "INSERT INTO chunks (id, index_name, document_id, chunk_index, text, hash) VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&chunk.id)
            .bind(name)
            .bind(&chunk.document_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.text)
            .bind(&chunk.hash)
            .execute(&mut *tx)
            .await?;

            sqlx::query("INSERT INTO chunks_fts (chunk_id, index_name, text) VALUES (?, ?, ?)")
                .bind(&chunk.id)
                .bind(name)
                .bind(&chunk.text)
                .execute(&mut *tx)
                .await?;

            if let Some(blob) = vectors.get(&chunk.id) {
                sqlx::query(
                    "INSERT INTO chunk_vectors (chunk_id, index_name, model, embedding) VALUES (?, ?, ?, ?)",
                )
                .bind(&chunk.id)
                .bind(name)
                .bind(config.embedding.model.as_deref().unwrap_or("disabled"))
                .bind(blob)
                .execute(&mut *tx)
                .await?;
            }

            chunk_count += 1;
        }
    }

    sqlx::query(
        r#"
        INSERT INTO indexes (name, source, mode, schema_version, document_count, chunk_count, embedded, built_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(name)
    .bind(&source.name)
    .bind(mode.as_str())
    .bind(SCHEMA_VERSION)
    .bind(document_count)
    .bind(chunk_count)
    .bind(embedded as i64)
    .bind(built_at.timestamp())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(SourceIndex {
        name: name.to_string(),
        source: source.name.clone(),
        mode,
        schema_version: SCHEMA_VERSION,
        document_count,
        chunk_count,
        embedded,
        built_at,
    })
}

async fn embed_all(
    config: &Config,
    chunked: &[(Document, Vec<crate::models::Chunk>)],
) -> anyhow::Result<HashMap<String, Vec<u8>>> {
    let provider = embedding::create_provider(&config.embedding)?;
    let mut out = HashMap::new();

    let all: Vec<&crate::models::Chunk> = chunked.iter().flat_map(|(_, cs)| cs.iter()).collect();
    for batch in all.chunks(config.embedding.batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let vecs = embedding::embed_texts(provider.as_ref(), &config.embedding, &texts).await?;
        for (chunk, vec) in batch.iter().zip(vecs.iter()) {
            out.insert(chunk.id.clone(), embedding::vec_to_blob(vec));
        }
    }

    Ok(out)
}

/// Load the persisted index `name` from its metadata row.
///
/// No document or chunk rows are scanned. Returns
/// [`HarnessError::IndexNotFound`] when the row is absent and
/// [`HarnessError::SchemaMismatch`] when the stored version differs from
/// [`SCHEMA_VERSION`].
pub async fn reconstruct(pool: &SqlitePool, name: &str) -> Result<SourceIndex> {
    let row = sqlx::query(
        "SELECT name, source, mode, schema_version, document_count, chunk_count, embedded, built_at FROM indexes WHERE name = ?",
    )
    .bind(name)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| HarnessError::IndexNotFound(name.to_string()))?;

    let found: i64 = row.get("schema_version");
    if found != SCHEMA_VERSION {
        return Err(HarnessError::SchemaMismatch {
            name: name.to_string(),
            found,
            expected: SCHEMA_VERSION,
        });
    }

    let mode_str: String = row.get("mode");
    let mode = RetrievalMode::parse(&mode_str).ok_or_else(|| HarnessError::SchemaMismatch {
        name: name.to_string(),
        found,
        expected: SCHEMA_VERSION,
    })?;

    let built_ts: i64 = row.get("built_at");
    let embedded: i64 = row.get("embedded");

    Ok(SourceIndex {
        name: row.get("name"),
        source: row.get("source"),
        mode,
        schema_version: found,
        document_count: row.get("document_count"),
        chunk_count: row.get("chunk_count"),
        embedded: embedded != 0,
        built_at: chrono::DateTime::from_timestamp(built_ts, 0).unwrap_or_else(Utc::now),
    })
}

/// Query one index, dispatching on its retrieval mode.
///
/// `TopKSimilarity` ranks FTS5 keyword candidates, hybrid-merged with
/// cosine-over-embeddings candidates when vectors were stored at build
/// time. `FullSummary` returns every chunk in document order.
pub async fn query(
    pool: &SqlitePool,
    config: &Config,
    index: &SourceIndex,
    query_text: &str,
) -> Result<Vec<Retrieved>> {
    match index.mode {
        RetrievalMode::TopKSimilarity => query_top_k(pool, config, index, query_text).await,
        RetrievalMode::FullSummary => query_full_summary(pool, index).await,
    }
}

async fn query_top_k(
    pool: &SqlitePool,
    config: &Config,
    index: &SourceIndex,
    query_text: &str,
) -> Result<Vec<Retrieved>> {
    let use_vectors = index.embedded && config.embedding.is_enabled();

    let keyword_candidates = fetch_keyword_candidates(
        pool,
        &index.name,
        query_text,
        config.retrieval.candidate_k_keyword,
    )
    .await?;

    let vector_candidates = if use_vectors {
        fetch_vector_candidates(
            pool,
            config,
            &index.name,
            query_text,
            config.retrieval.candidate_k_vector,
        )
        .await?
    } else {
        Vec::new()
    };

    if keyword_candidates.is_empty() && vector_candidates.is_empty() {
        return Ok(Vec::new());
    }

    // Min-max normalize each channel, then alpha-merge
    let kw_map: HashMap<String, f64> = normalize_scores(&keyword_candidates)
        .into_iter()
        .map(|(c, s)| (c.chunk_id.clone(), s))
        .collect();
    let vec_map: HashMap<String, f64> = normalize_scores(&vector_candidates)
        .into_iter()
        .map(|(c, s)| (c.chunk_id.clone(), s))
        .collect();

    let effective_alpha = if use_vectors {
        config.retrieval.hybrid_alpha
    } else {
        0.0
    };

    let mut all: HashMap<&str, &Retrieved> = HashMap::new();
    for c in keyword_candidates.iter().chain(vector_candidates.iter()) {
        all.entry(c.chunk_id.as_str()).or_insert(c);
    }

    let mut merged: Vec<Retrieved> = all
        .into_values()
        .map(|c| {
            let k = kw_map.get(&c.chunk_id).copied().unwrap_or(0.0);
            let v = vec_map.get(&c.chunk_id).copied().unwrap_or(0.0);
            Retrieved {
                chunk_id: c.chunk_id.clone(),
                text: c.text.clone(),
                score: (1.0 - effective_alpha) * k + effective_alpha * v,
            }
        })
        .collect();

    // Sort: score desc, chunk_id asc (deterministic)
    merged.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
    merged.truncate(config.retrieval.top_k as usize);

    Ok(merged)
}

async fn query_full_summary(pool: &SqlitePool, index: &SourceIndex) -> Result<Vec<Retrieved>> {
    let rows = sqlx::query(
        r#"
        SELECT c.id AS chunk_id, c.text AS text
        FROM chunks c
        JOIN documents d ON d.id = c.document_id
        WHERE c.index_name = ?
        ORDER BY d.source_id, c.chunk_index
        "#,
    )
    .bind(&index.name)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| Retrieved {
            chunk_id: row.get("chunk_id"),
            text: row.get("text"),
            score: 1.0,
        })
        .collect())
}

// ============ Keyword search ============

async fn fetch_keyword_candidates(
    pool: &SqlitePool,
    index_name: &str,
    query: &str,
    candidate_k: i64,
) -> Result<Vec<Retrieved>> {
    let Some(match_expr) = fts_match_expr(query) else {
        return Ok(Vec::new());
    };

    let rows = sqlx::query(
        r#"
        SELECT chunks_fts.chunk_id AS chunk_id, chunks_fts.rank AS rank, c.text AS text
        FROM chunks_fts
        JOIN chunks c ON c.id = chunks_fts.chunk_id
        WHERE chunks_fts MATCH ? AND chunks_fts.index_name = ?
        ORDER BY rank
        LIMIT ?
        "#,
    )
    .bind(&match_expr)
    .bind(index_name)
    .bind(candidate_k)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| {
            let rank: f64 = row.get("rank");
            Retrieved {
                chunk_id: row.get("chunk_id"),
                text: row.get("text"),
                score: -rank, // negate so higher = better
            }
        })
        .collect())
}

/// Build an FTS5 MATCH expression from free-form user text.
///
/// Raw question text is not valid FTS5 syntax ("?" and other punctuation
/// break MATCH), so the query is reduced to quoted alphanumeric terms
/// joined with OR. Returns None when no terms remain.
fn fts_match_expr(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{}\"", t))
        .collect();

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}

// ============ Vector search ============

async fn fetch_vector_candidates(
    pool: &SqlitePool,
    config: &Config,
    index_name: &str,
    query: &str,
    candidate_k: i64,
) -> Result<Vec<Retrieved>> {
    let provider = embedding::create_provider(&config.embedding)
        .map_err(|e| HarnessError::GenerationFailure(e.to_string()))?;
    let query_vec = embedding::embed_query(provider.as_ref(), &config.embedding, query)
        .await
        .map_err(|e| HarnessError::GenerationFailure(e.to_string()))?;

    // Small fixed corpus: fetch all vectors and score in Rust
    let rows = sqlx::query(
        r#"
        SELECT cv.chunk_id AS chunk_id, cv.embedding AS embedding, c.text AS text
        FROM chunk_vectors cv
        JOIN chunks c ON c.id = cv.chunk_id
        WHERE cv.index_name = ?
        "#,
    )
    .bind(index_name)
    .fetch_all(pool)
    .await?;

    let mut candidates: Vec<Retrieved> = rows
        .iter()
        .map(|row| {
            let blob: Vec<u8> = row.get("embedding");
            let vec = embedding::blob_to_vec(&blob);
            Retrieved {
                chunk_id: row.get("chunk_id"),
                text: row.get("text"),
                score: embedding::cosine_similarity(&query_vec, &vec) as f64,
            }
        })
        .collect();

    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    candidates.truncate(candidate_k as usize);

    Ok(candidates)
}

// ============ Score normalization ============

/// Min-max normalize scores to [0, 1].
fn normalize_scores(candidates: &[Retrieved]) -> Vec<(&Retrieved, f64)> {
    if candidates.is_empty() {
        return Vec::new();
    }

    let s_min = candidates
        .iter()
        .map(|c| c.score)
        .fold(f64::INFINITY, f64::min);
    let s_max = candidates
        .iter()
        .map(|c| c.score)
        .fold(f64::NEG_INFINITY, f64::max);

    candidates
        .iter()
        .map(|c| {
            let norm = if (s_max - s_min).abs() < f64::EPSILON {
                1.0
            } else {
                (c.score - s_min) / (s_max - s_min)
            };
            (c, norm)
        })
        .collect()
}

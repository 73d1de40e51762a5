//! Integration tests for bootstrap resolution, federated retrieval, and
//! chat session bookkeeping, using in-memory loader and backend probes.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;
use uuid::Uuid;

use resume_chat::bootstrap;
use resume_chat::chat::{self, ChatSession, ChatTurn};
use resume_chat::config::{
    ChatConfig, ChunkingConfig, Config, DbConfig, EmbeddingConfig, FetchConfig, ModelConfig,
    PersonaConfig, RetrievalConfig, ServerConfig, SourceConfig,
};
use resume_chat::error::{HarnessError, Result};
use resume_chat::index;
use resume_chat::model::CompletionBackend;
use resume_chat::models::{Document, Source};
use resume_chat::sources::DocumentLoader;
use resume_chat::store;

fn source_entry(name: &str, description: &str, required: bool, modes: &[&str]) -> SourceConfig {
    SourceConfig {
        name: name.to_string(),
        kind: "file".to_string(),
        path: Some(PathBuf::from(format!("./{}.md", name))),
        url: None,
        description: description.to_string(),
        required,
        modes: modes.iter().map(|m| m.to_string()).collect(),
    }
}

fn test_config(db_path: PathBuf, sources: Vec<SourceConfig>) -> Config {
    Config {
        db: DbConfig { path: db_path },
        chunking: ChunkingConfig { max_tokens: 120 },
        retrieval: RetrievalConfig::default(),
        embedding: EmbeddingConfig::default(),
        model: ModelConfig::default(),
        persona: PersonaConfig {
            name: "Gabriel".to_string(),
            title: "software developer".to_string(),
            greeting: None,
        },
        chat: ChatConfig::default(),
        fetch: FetchConfig::default(),
        server: ServerConfig::default(),
        sources,
    }
}

fn make_doc(source: &str, body: &str) -> Document {
    Document {
        id: Uuid::new_v4().to_string(),
        source: source.to_string(),
        source_id: format!("mem://{}", source),
        title: Some(source.to_string()),
        content_type: "text/markdown".to_string(),
        fetched_at: Utc::now(),
        body: body.to_string(),
        metadata_json: "{}".to_string(),
    }
}

/// Loader serving staged in-memory documents and counting fetch calls,
/// so tests can assert that the load path never touches sources.
struct ProbeLoader {
    docs: HashMap<String, Vec<Document>>,
    fetches: AtomicUsize,
}

impl ProbeLoader {
    fn new(docs: HashMap<String, Vec<Document>>) -> Self {
        Self {
            docs,
            fetches: AtomicUsize::new(0),
        }
    }

    fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentLoader for ProbeLoader {
    async fn fetch(&self, source: &Source) -> Result<Vec<Document>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.docs
            .get(&source.name)
            .cloned()
            .ok_or_else(|| HarnessError::unavailable(&source.name, "no documents staged"))
    }
}

async fn setup(sources: Vec<SourceConfig>) -> (TempDir, SqlitePool, Config) {
    let tmp = TempDir::new().unwrap();
    let db_path = tmp.path().join("data").join("rchat.db");
    let pool = store::connect(&db_path).await.unwrap();
    let config = test_config(db_path, sources);
    (tmp, pool, config)
}

fn resume_docs() -> HashMap<String, Vec<Document>> {
    let mut docs = HashMap::new();
    docs.insert(
        "resume".to_string(),
        vec![make_doc(
            "resume",
            "# Resume\n\nSoftware Engineer, Acme Corp, 2019-2021.\n\nBuilt billing pipelines in Rust.",
        )],
    );
    docs.insert(
        "github".to_string(),
        vec![make_doc(
            "github",
            "Repositories: 42. Mostly Rust tooling and parsers.",
        )],
    );
    docs
}

fn both_sources() -> Vec<SourceConfig> {
    vec![
        source_entry(
            "resume",
            "Gabriel's resume: roles and dates",
            true,
            &["top_k", "full_summary"],
        ),
        source_entry("github", "GitHub profile page", false, &["top_k"]),
    ]
}

#[tokio::test]
async fn rebuild_then_load_without_fetching() {
    let (_tmp, pool, config) = setup(both_sources()).await;
    let loader = ProbeLoader::new(resume_docs());

    let federated = bootstrap::resolve(&pool, &config, &loader, false)
        .await
        .unwrap();
    assert_eq!(federated.id, "main");
    assert_eq!(federated.len(), 3);
    assert!(federated.handle("resume").is_some());
    assert!(federated.handle("resume_summary").is_some());
    assert!(federated.handle("github").is_some());
    assert_eq!(loader.fetch_count(), 2, "one fetch per declared source");

    // Second resolution finds everything persisted and fetches nothing.
    let reloaded = bootstrap::resolve(&pool, &config, &loader, false)
        .await
        .unwrap();
    assert_eq!(reloaded.len(), 3);
    assert_eq!(loader.fetch_count(), 2, "load path must not fetch");
}

#[tokio::test]
async fn force_rebuild_fetches_again() {
    let (_tmp, pool, config) = setup(both_sources()).await;
    let loader = ProbeLoader::new(resume_docs());

    bootstrap::resolve(&pool, &config, &loader, false)
        .await
        .unwrap();
    bootstrap::resolve(&pool, &config, &loader, true)
        .await
        .unwrap();
    assert_eq!(loader.fetch_count(), 4);
}

#[tokio::test]
async fn required_source_failure_aborts_rebuild() {
    let sources = vec![source_entry(
        "resume",
        "Gabriel's resume",
        true,
        &["top_k"],
    )];
    let (_tmp, pool, config) = setup(sources).await;
    let loader = ProbeLoader::new(HashMap::new());

    let err = bootstrap::resolve(&pool, &config, &loader, false)
        .await
        .unwrap_err();
    match err {
        HarnessError::SourceUnavailable { source_name: source, .. } => assert_eq!(source, "resume"),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn optional_source_failure_is_skipped() {
    let (_tmp, pool, config) = setup(both_sources()).await;
    let mut docs = resume_docs();
    docs.remove("github");
    let loader = ProbeLoader::new(docs);

    let federated = bootstrap::resolve(&pool, &config, &loader, false)
        .await
        .unwrap();
    assert_eq!(federated.len(), 2);
    assert!(federated.handle("github").is_none());
    assert!(federated.handle("resume").is_some());
}

#[tokio::test]
async fn schema_mismatch_triggers_rebuild() {
    let (_tmp, pool, config) = setup(both_sources()).await;
    let loader = ProbeLoader::new(resume_docs());

    bootstrap::resolve(&pool, &config, &loader, false)
        .await
        .unwrap();
    assert_eq!(loader.fetch_count(), 2);

    sqlx::query("UPDATE indexes SET schema_version = 1 WHERE name = 'resume'")
        .execute(&pool)
        .await
        .unwrap();

    let federated = bootstrap::resolve(&pool, &config, &loader, false)
        .await
        .unwrap();
    assert_eq!(federated.len(), 3);
    assert_eq!(loader.fetch_count(), 4, "stale schema must force a rebuild");

    let idx = index::reconstruct(&pool, "resume").await.unwrap();
    assert_eq!(idx.schema_version, index::SCHEMA_VERSION);
}

#[tokio::test]
async fn retrieval_surfaces_the_matching_passage() {
    let (_tmp, pool, config) = setup(both_sources()).await;
    let loader = ProbeLoader::new(resume_docs());
    let federated = bootstrap::resolve(&pool, &config, &loader, false)
        .await
        .unwrap();

    let passages = federated
        .retrieve(&pool, &config, "Where did he work at Acme?")
        .await
        .unwrap();

    let hit = passages
        .iter()
        .find(|p| p.index_id == "resume" && p.text.contains("Acme Corp"))
        .expect("expected an Acme Corp passage from the resume index");
    assert_eq!(hit.description, "Gabriel's resume: roles and dates");
}

#[tokio::test]
async fn full_summary_index_returns_every_chunk() {
    let (_tmp, pool, config) = setup(both_sources()).await;
    let loader = ProbeLoader::new(resume_docs());
    bootstrap::resolve(&pool, &config, &loader, false)
        .await
        .unwrap();

    let idx = index::reconstruct(&pool, "resume_summary").await.unwrap();
    let retrieved = index::query(&pool, &config, &idx, "anything").await.unwrap();
    assert_eq!(retrieved.len() as i64, idx.chunk_count);
    assert!(retrieved.iter().all(|r| (r.score - 1.0).abs() < 1e-9));
}

// ============ Chat bookkeeping ============

/// Backend that fails its first call and answers afterwards.
struct FlakyBackend {
    calls: AtomicUsize,
}

#[async_trait]
impl CompletionBackend for FlakyBackend {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn complete(
        &self,
        _system: &str,
        _history: &[ChatTurn],
        _context: &str,
    ) -> Result<String> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            Err(HarnessError::GenerationFailure("upstream 503".to_string()))
        } else {
            Ok("I worked at Acme Corp as a Software Engineer.".to_string())
        }
    }
}

/// Backend that records the context it was handed.
struct CapturingBackend {
    seen: std::sync::Mutex<Option<String>>,
}

#[async_trait]
impl CompletionBackend for CapturingBackend {
    fn name(&self) -> &str {
        "capturing"
    }

    async fn complete(
        &self,
        _system: &str,
        _history: &[ChatTurn],
        context: &str,
    ) -> Result<String> {
        *self.seen.lock().unwrap() = Some(context.to_string());
        Ok("ok".to_string())
    }
}

#[tokio::test]
async fn failed_ask_leaves_one_turn_and_is_retryable() {
    let (_tmp, pool, config) = setup(both_sources()).await;
    let loader = ProbeLoader::new(resume_docs());
    let federated = bootstrap::resolve(&pool, &config, &loader, false)
        .await
        .unwrap();

    let backend = FlakyBackend {
        calls: AtomicUsize::new(0),
    };
    let mut session = ChatSession::new(config.persona.greeting_text(), 20);
    assert_eq!(session.len(), 1);

    let err = chat::ask(
        &mut session,
        &federated,
        &pool,
        &config,
        &backend,
        "Where did you work?",
    )
    .await
    .unwrap_err();
    assert!(matches!(err, HarnessError::GenerationFailure(_)));
    assert_eq!(session.len(), 2, "failure keeps the user turn only");

    let answer = chat::ask(
        &mut session,
        &federated,
        &pool,
        &config,
        &backend,
        "Where did you work?",
    )
    .await
    .unwrap();
    assert!(answer.contains("Acme Corp"));
    assert_eq!(session.len(), 4, "success adds user and assistant turns");
}

#[tokio::test]
async fn ask_hands_labelled_context_to_the_backend() {
    let (_tmp, pool, config) = setup(both_sources()).await;
    let loader = ProbeLoader::new(resume_docs());
    let federated = bootstrap::resolve(&pool, &config, &loader, false)
        .await
        .unwrap();

    let backend = CapturingBackend {
        seen: std::sync::Mutex::new(None),
    };
    let mut session = ChatSession::new(config.persona.greeting_text(), 20);
    chat::ask(
        &mut session,
        &federated,
        &pool,
        &config,
        &backend,
        "Tell me about Acme",
    )
    .await
    .unwrap();

    let context = backend.seen.lock().unwrap().clone().unwrap();
    assert!(context.contains("[resume]"));
    assert!(context.contains("Acme Corp"));
}

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::models::{FetchKind, RetrievalMode, Source};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub model: ModelConfig,
    pub persona: PersonaConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    pub max_tokens: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_hybrid_alpha")]
    pub hybrid_alpha: f64,
    #[serde(default = "default_candidate_k")]
    pub candidate_k_keyword: i64,
    #[serde(default = "default_candidate_k")]
    pub candidate_k_vector: i64,
    #[serde(default = "default_top_k")]
    pub top_k: i64,
    /// Upper bound on the total characters of retrieved context sent to
    /// the completion backend per turn.
    #[serde(default = "default_context_char_budget")]
    pub context_char_budget: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            hybrid_alpha: default_hybrid_alpha(),
            candidate_k_keyword: default_candidate_k(),
            candidate_k_vector: default_candidate_k(),
            top_k: default_top_k(),
            context_char_budget: default_context_char_budget(),
        }
    }
}

fn default_hybrid_alpha() -> f64 {
    0.6
}
fn default_candidate_k() -> i64 {
    40
}
fn default_top_k() -> i64 {
    3
}
fn default_context_char_budget() -> usize {
    8000
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: None,
            dims: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default = "default_chat_model")]
    pub model: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: default_chat_model(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_disabled() -> String {
    "disabled".to_string()
}
fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

/// Identity the assistant answers as. The system prompt and the seeded
/// greeting are built from these fields.
#[derive(Debug, Deserialize, Clone)]
pub struct PersonaConfig {
    pub name: String,
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default)]
    pub greeting: Option<String>,
}

fn default_title() -> String {
    "software developer".to_string()
}

impl PersonaConfig {
    pub fn greeting_text(&self) -> String {
        self.greeting.clone().unwrap_or_else(|| {
            format!(
                "Hi, I'm {}. Ask me a question about my work experience!",
                self.name
            )
        })
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    /// Maximum number of prior turns sent to the model with each request.
    #[serde(default = "default_max_history_turns")]
    pub max_history_turns: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_history_turns: default_max_history_turns(),
        }
    }
}

fn default_max_history_turns() -> usize {
    20
}

#[derive(Debug, Deserialize, Clone)]
pub struct FetchConfig {
    /// Timeout for remote source fetches.
    #[serde(default = "default_fetch_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_fetch_timeout_secs(),
        }
    }
}

fn default_fetch_timeout_secs() -> u64 {
    20
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

/// One `[[sources]]` entry. `kind` selects which of `path`/`url` is read.
#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub url: Option<String>,
    pub description: String,
    #[serde(default = "default_required")]
    pub required: bool,
    #[serde(default = "default_modes")]
    pub modes: Vec<String>,
}

fn default_required() -> bool {
    true
}
fn default_modes() -> Vec<String> {
    vec!["top_k".to_string()]
}

impl Config {
    /// Converts the validated `[[sources]]` entries into [`Source`] values.
    pub fn declared_sources(&self) -> Vec<Source> {
        self.sources
            .iter()
            .map(|sc| {
                let fetch = match sc.kind.as_str() {
                    "file" => FetchKind::LocalFile {
                        path: sc.path.clone().unwrap_or_default(),
                    },
                    _ => FetchKind::RemoteFetch {
                        url: sc.url.clone().unwrap_or_default(),
                    },
                };
                let modes = sc
                    .modes
                    .iter()
                    .filter_map(|m| RetrievalMode::parse(m))
                    .collect();
                Source {
                    name: sc.name.clone(),
                    fetch,
                    description: sc.description.clone(),
                    required: sc.required,
                    modes,
                }
            })
            .collect()
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate chunking
    if config.chunking.max_tokens == 0 {
        anyhow::bail!("chunking.max_tokens must be > 0");
    }

    // Validate retrieval
    if config.retrieval.top_k < 1 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }

    if !(0.0..=1.0).contains(&config.retrieval.hybrid_alpha) {
        anyhow::bail!("retrieval.hybrid_alpha must be in [0.0, 1.0]");
    }

    // Validate embedding
    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    match config.model.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown model provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    // Validate persona
    if config.persona.name.trim().is_empty() {
        anyhow::bail!("persona.name must not be empty");
    }

    // Validate sources
    if config.sources.is_empty() {
        anyhow::bail!("At least one [[sources]] entry is required");
    }

    let mut seen = std::collections::HashSet::new();
    for sc in &config.sources {
        if sc.name.trim().is_empty() {
            anyhow::bail!("sources.name must not be empty");
        }
        if !seen.insert(sc.name.clone()) {
            anyhow::bail!("Duplicate source name: '{}'", sc.name);
        }
        match sc.kind.as_str() {
            "file" => {
                if sc.path.is_none() {
                    anyhow::bail!("source '{}' has kind 'file' but no path", sc.name);
                }
            }
            "url" => {
                if sc.url.is_none() {
                    anyhow::bail!("source '{}' has kind 'url' but no url", sc.name);
                }
            }
            other => anyhow::bail!(
                "source '{}' has unknown kind '{}'. Must be file or url.",
                sc.name,
                other
            ),
        }
        for mode in &sc.modes {
            if RetrievalMode::parse(mode).is_none() {
                anyhow::bail!(
                    "source '{}' has unknown mode '{}'. Must be top_k or full_summary.",
                    sc.name,
                    mode
                );
            }
        }
        if sc.modes.is_empty() {
            anyhow::bail!("source '{}' must declare at least one mode", sc.name);
        }
    }

    Ok(config)
}

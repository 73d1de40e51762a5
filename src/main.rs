//! # Resume Chat CLI (`rchat`)
//!
//! The `rchat` binary is the primary interface for Resume Chat. It provides
//! commands for database initialization, source inspection, index
//! bootstrapping, one-shot questions, an interactive terminal chat, and the
//! HTTP chat server.
//!
//! ## Usage
//!
//! ```bash
//! rchat --config ./config/rchat.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rchat init` | Create the SQLite database and run schema migrations |
//! | `rchat sources` | List declared sources with kind, policy, and target |
//! | `rchat bootstrap` | Load persisted indexes or rebuild them from sources |
//! | `rchat ask "<question>"` | Answer a single question and exit |
//! | `rchat chat` | Interactive terminal chat session |
//! | `rchat serve` | Start the HTTP chat server |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the database
//! rchat init --config ./config/rchat.toml
//!
//! # Inspect the declared sources
//! rchat sources --config ./config/rchat.toml
//!
//! # Build (or load) all declared indexes
//! rchat bootstrap --config ./config/rchat.toml
//!
//! # Force a rebuild even if persisted indexes are loadable
//! rchat bootstrap --rebuild --config ./config/rchat.toml
//!
//! # One-shot question
//! rchat ask "Where did you work in 2020?" --config ./config/rchat.toml
//!
//! # Interactive session / HTTP server
//! rchat chat --config ./config/rchat.toml
//! rchat serve --config ./config/rchat.toml
//! ```

mod bootstrap;
mod chat;
mod chunk;
mod config;
mod embedding;
mod error;
mod extract;
mod federation;
mod index;
mod migrate;
mod model;
mod models;
mod server;
mod source_file;
mod source_remote;
mod sources;
mod store;

use clap::{Parser, Subcommand};
use std::io::{BufRead, Write};
use std::path::PathBuf;

use crate::chat::ChatSession;
use crate::sources::FetchLoader;

/// Resume Chat CLI — a persona chat harness over federated document
/// indexes.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/rchat.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "rchat",
    about = "Resume Chat — a persona chat harness over federated document indexes",
    version,
    long_about = "Resume Chat fetches declared document sources (local files, remote URLs), \
    chunks and indexes them in SQLite with FTS5 and optional embeddings, federates the \
    per-source indexes under one queryable identity, and answers questions about the \
    indexed material in the configured persona's voice via a CLI or HTTP chat server."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/rchat.toml`. All source, database, retrieval,
    /// persona, and server settings are read from this file.
    #[arg(long, global = true, default_value = "./config/rchat.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables
    /// (documents, chunks, chunks_fts, chunk_vectors, indexes).
    /// This command is idempotent — running it multiple times is safe.
    Init,

    /// List declared sources and their status.
    ///
    /// Shows each source's kind, required policy, retrieval modes, and
    /// target, and warns when a required local file is missing. Useful
    /// for verifying configuration before a bootstrap.
    Sources,

    /// Resolve the federated index.
    ///
    /// Attempts to load every declared index from storage; on any load
    /// failure, fetches all declared sources and rebuilds every index
    /// from scratch. No source is fetched when the load succeeds.
    Bootstrap {
        /// Skip the load attempt and rebuild all indexes from sources.
        #[arg(long)]
        rebuild: bool,
    },

    /// Answer a single question and exit.
    ///
    /// Bootstraps the federated index, retrieves context for the
    /// question, and prints the persona's answer. Requires a completion
    /// provider to be configured.
    Ask {
        /// The question to answer.
        question: String,
    },

    /// Interactive terminal chat session.
    ///
    /// Prints the persona greeting, then reads questions from stdin
    /// until `exit` or end of input. Conversation history is kept for
    /// the lifetime of the session.
    Chat,

    /// Start the HTTP chat server.
    ///
    /// Binds to `[server].bind` and exposes `POST /chat` and
    /// `GET /healthz` over a single shared session.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = store::connect(&cfg.db.path).await?;
            migrate::run_migrations(&pool).await?;
            println!("Database initialized successfully.");
        }
        Commands::Sources => {
            sources::list_sources(&cfg)?;
        }
        Commands::Bootstrap { rebuild } => {
            let pool = store::connect(&cfg.db.path).await?;
            let loader = FetchLoader::new(cfg.fetch.timeout_secs);
            bootstrap::resolve(&pool, &cfg, &loader, rebuild).await?;
        }
        Commands::Ask { question } => {
            let pool = store::connect(&cfg.db.path).await?;
            let loader = FetchLoader::new(cfg.fetch.timeout_secs);
            let federated = bootstrap::resolve(&pool, &cfg, &loader, false).await?;
            let backend = model::create_backend(&cfg.model)?;

            let mut session =
                ChatSession::new(cfg.persona.greeting_text(), cfg.chat.max_history_turns);
            let answer = chat::ask(
                &mut session,
                &federated,
                &pool,
                &cfg,
                backend.as_ref(),
                &question,
            )
            .await?;
            println!("{}", answer);
        }
        Commands::Chat => {
            let pool = store::connect(&cfg.db.path).await?;
            let loader = FetchLoader::new(cfg.fetch.timeout_secs);
            let federated = bootstrap::resolve(&pool, &cfg, &loader, false).await?;
            let backend = model::create_backend(&cfg.model)?;

            let mut session =
                ChatSession::new(cfg.persona.greeting_text(), cfg.chat.max_history_turns);
            println!("{}", cfg.persona.greeting_text());
            println!("(type 'exit' to quit)");

            let stdin = std::io::stdin();
            loop {
                print!("> ");
                std::io::stdout().flush()?;

                let mut line = String::new();
                if stdin.lock().read_line(&mut line)? == 0 {
                    break;
                }
                let question = line.trim();
                if question.is_empty() {
                    continue;
                }
                if question == "exit" {
                    break;
                }

                match chat::ask(
                    &mut session,
                    &federated,
                    &pool,
                    &cfg,
                    backend.as_ref(),
                    question,
                )
                .await
                {
                    Ok(answer) => println!("{}", answer),
                    Err(e) => println!("error: {}", e),
                }
            }
        }
        Commands::Serve => {
            let pool = store::connect(&cfg.db.path).await?;
            let loader = FetchLoader::new(cfg.fetch.timeout_secs);
            let federated = bootstrap::resolve(&pool, &cfg, &loader, false).await?;
            let backend = model::create_backend(&cfg.model)?;
            server::run_server(&cfg, pool, federated, backend).await?;
        }
    }

    Ok(())
}

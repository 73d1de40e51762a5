//! HTTP chat server.
//!
//! Exposes the ask pipeline over a small JSON API so browser clients can
//! drive the same session the terminal chat uses.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/chat` | Ask a question, receive the assistant answer |
//! | `GET`  | `/healthz` | Health check (returns version) |
//!
//! # Error Contract
//!
//! All error responses share one JSON shape:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "question must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `generation_failed` (502),
//! `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! clients.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};

use crate::chat::{self, ChatSession};
use crate::config::Config;
use crate::error::HarnessError;
use crate::federation::FederatedIndex;
use crate::model::CompletionBackend;

/// Shared application state passed to all route handlers via Axum's
/// `State` extractor. The session is behind a mutex so questions are
/// answered one at a time and the transcript stays ordered.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    pool: SqlitePool,
    federated: Arc<FederatedIndex>,
    backend: Arc<dyn CompletionBackend>,
    session: Arc<Mutex<ChatSession>>,
}

/// Starts the chat server.
///
/// Binds to the address configured in `[server].bind` and serves a single
/// shared session until the process is terminated. The federated index
/// must already be resolved by the bootstrap step.
pub async fn run_server(
    config: &Config,
    pool: SqlitePool,
    federated: FederatedIndex,
    backend: Box<dyn CompletionBackend>,
) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let session = ChatSession::new(config.persona.greeting_text(), config.chat.max_history_turns);

    let state = AppState {
        config: Arc::new(config.clone()),
        pool,
        federated: Arc::new(federated),
        backend: Arc::from(backend),
        session: Arc::new(Mutex::new(session)),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/chat", post(handle_chat))
        .route("/healthz", get(handle_health))
        .layer(cors)
        .with_state(state);

    println!("chat server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"bad_request"`).
    code: String,
    /// Human-readable error message.
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

/// Maps ask-pipeline failures onto the HTTP error contract. Completion
/// failures are the upstream provider's fault (502); anything else from
/// retrieval or storage is internal (500).
fn classify_ask_error(err: HarnessError) -> AppError {
    match err {
        HarnessError::GenerationFailure(msg) => AppError {
            status: StatusCode::BAD_GATEWAY,
            code: "generation_failed".to_string(),
            message: msg,
        },
        other => AppError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "internal".to_string(),
            message: other.to_string(),
        },
    }
}

// ============ GET /healthz ============

/// JSON response body for `GET /healthz`.
#[derive(Serialize)]
struct HealthResponse {
    /// Always `"ok"` when the server is running.
    status: String,
    /// The crate version from `Cargo.toml`.
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /chat ============

/// JSON request body for `POST /chat`.
#[derive(Deserialize)]
struct ChatRequest {
    question: String,
}

/// JSON response body for `POST /chat`.
#[derive(Serialize)]
struct ChatResponse {
    /// The assistant's answer.
    answer: String,
    /// Total turns in the session transcript, greeting included.
    turns: usize,
}

/// Handler for `POST /chat`.
///
/// Runs the full ask pipeline against the shared session. A failed
/// question leaves the user turn in the transcript so the client can
/// retry.
async fn handle_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let question = req.question.trim();
    if question.is_empty() {
        return Err(bad_request("question must not be empty"));
    }

    let mut session = state.session.lock().await;
    let answer = chat::ask(
        &mut session,
        &state.federated,
        &state.pool,
        &state.config,
        state.backend.as_ref(),
        question,
    )
    .await
    .map_err(classify_ask_error)?;

    Ok(Json(ChatResponse {
        answer,
        turns: session.len(),
    }))
}

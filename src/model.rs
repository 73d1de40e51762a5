//! Completion backend abstraction and implementations.
//!
//! The chat facade talks to the model through [`CompletionBackend`]:
//! - **[`DisabledBackend`]** — always fails; used when no provider is configured.
//! - **[`OpenAiBackend`]** — calls the OpenAI chat completions API with
//!   retry and backoff (same strategy as the embedding client: 429/5xx
//!   and network errors retry, other 4xx fail immediately).

use async_trait::async_trait;
use std::time::Duration;

use crate::chat::{ChatRole, ChatTurn};
use crate::config::ModelConfig;
use crate::error::{HarnessError, Result};

/// Generates an assistant answer from the persona prompt, the bounded
/// conversation history, and the retrieved context.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Provider identifier (e.g. `"openai"`).
    fn name(&self) -> &str;

    async fn complete(
        &self,
        system_prompt: &str,
        history: &[ChatTurn],
        context: &str,
    ) -> Result<String>;
}

/// Create the appropriate [`CompletionBackend`] based on configuration.
pub fn create_backend(config: &ModelConfig) -> anyhow::Result<Box<dyn CompletionBackend>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledBackend)),
        "openai" => Ok(Box::new(OpenAiBackend::new(config)?)),
        other => anyhow::bail!("Unknown model provider: {}", other),
    }
}

// ============ Disabled Backend ============

/// A backend that always fails. Lets the rest of the pipeline (bootstrap,
/// retrieval, session bookkeeping) run without an API key.
pub struct DisabledBackend;

#[async_trait]
impl CompletionBackend for DisabledBackend {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn complete(&self, _system: &str, _history: &[ChatTurn], _context: &str) -> Result<String> {
        Err(HarnessError::GenerationFailure(
            "model provider is disabled; set [model] provider in config".to_string(),
        ))
    }
}

// ============ OpenAI Backend ============

/// Completion backend using the OpenAI chat completions API.
///
/// Requires the `OPENAI_API_KEY` environment variable to be set.
pub struct OpenAiBackend {
    model: String,
    timeout_secs: u64,
    max_retries: u32,
}

impl OpenAiBackend {
    pub fn new(config: &ModelConfig) -> anyhow::Result<Self> {
        if std::env::var("OPENAI_API_KEY").is_err() {
            anyhow::bail!("OPENAI_API_KEY environment variable not set");
        }

        Ok(Self {
            model: config.model.clone(),
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries,
        })
    }

    fn build_messages(
        &self,
        system_prompt: &str,
        history: &[ChatTurn],
        context: &str,
    ) -> Vec<serde_json::Value> {
        let mut messages = vec![serde_json::json!({
            "role": "system",
            "content": system_prompt,
        })];

        if !context.trim().is_empty() {
            messages.push(serde_json::json!({
                "role": "system",
                "content": format!(
                    "Passages retrieved from the indexed documents:\n\n{}",
                    context
                ),
            }));
        }

        for turn in history {
            let role = match turn.role {
                ChatRole::User => "user",
                ChatRole::Assistant => "assistant",
            };
            messages.push(serde_json::json!({
                "role": role,
                "content": turn.content,
            }));
        }

        messages
    }
}

#[async_trait]
impl CompletionBackend for OpenAiBackend {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(
        &self,
        system_prompt: &str,
        history: &[ChatTurn],
        context: &str,
    ) -> Result<String> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| HarnessError::GenerationFailure("OPENAI_API_KEY not set".to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()
            .map_err(|e| HarnessError::GenerationFailure(e.to_string()))?;

        let body = serde_json::json!({
            "model": self.model,
            "messages": self.build_messages(system_prompt, history, context),
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = client
                .post("https://api.openai.com/v1/chat/completions")
                .header("Authorization", format!("Bearer {}", api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response
                            .json()
                            .await
                            .map_err(|e| HarnessError::GenerationFailure(e.to_string()))?;
                        return parse_completion_response(&json);
                    }

                    // Rate limited or server error — retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(format!("OpenAI API error {}: {}", status, body_text));
                        continue;
                    }

                    // Client error (not 429) — don't retry
                    let body_text = response.text().await.unwrap_or_default();
                    return Err(HarnessError::GenerationFailure(format!(
                        "OpenAI API error {}: {}",
                        status, body_text
                    )));
                }
                Err(e) => {
                    last_err = Some(e.to_string());
                    continue;
                }
            }
        }

        Err(HarnessError::GenerationFailure(
            last_err.unwrap_or_else(|| "completion failed after retries".to_string()),
        ))
    }
}

fn parse_completion_response(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| {
            HarnessError::GenerationFailure(
                "invalid completion response: missing choices[0].message.content".to_string(),
            )
        })
}

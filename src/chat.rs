//! Chat session bookkeeping and the retrieval-augmented ask pipeline.
//!
//! A [`ChatSession`] holds the conversation transcript, seeded with the
//! persona greeting. [`ask`] is the single entry point for answering a
//! question: it appends the user turn, fans the question out to the
//! federated index, clips the retrieved context to the configured budget,
//! and calls the completion backend. The assistant turn is appended only
//! on success, so a failed attempt leaves the transcript one turn longer
//! and the question can be retried.

use sqlx::SqlitePool;

use crate::config::{Config, PersonaConfig};
use crate::error::Result;
use crate::federation::FederatedIndex;
use crate::model::CompletionBackend;
use crate::models::Passage;

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    User,
    Assistant,
}

/// One transcript entry.
#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

/// The conversation transcript plus the history window bound.
///
/// The full transcript is kept for display; only the most recent
/// `max_history_turns` turns are handed to the model.
#[derive(Debug)]
pub struct ChatSession {
    turns: Vec<ChatTurn>,
    max_history_turns: usize,
}

impl ChatSession {
    /// Start a session seeded with the persona greeting as the first
    /// assistant turn.
    pub fn new(greeting: impl Into<String>, max_history_turns: usize) -> Self {
        Self {
            turns: vec![ChatTurn {
                role: ChatRole::Assistant,
                content: greeting.into(),
            }],
            max_history_turns,
        }
    }

    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// The most recent turns, bounded by the history window.
    pub fn bounded_history(&self) -> &[ChatTurn] {
        let start = self.turns.len().saturating_sub(self.max_history_turns);
        &self.turns[start..]
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.turns.push(ChatTurn {
            role: ChatRole::User,
            content: content.into(),
        });
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.turns.push(ChatTurn {
            role: ChatRole::Assistant,
            content: content.into(),
        });
    }
}

/// Render the persona into the system prompt.
pub fn build_system_prompt(persona: &PersonaConfig) -> String {
    format!(
        "You are {name}, a {title}. You are answering questions about your own \
         background, projects, and work experience in the first person. Base your \
         answers on the retrieved passages when they are relevant. Only answer \
         questions about your professional background; politely decline anything \
         else. If the passages do not contain the answer, say you don't know \
         rather than inventing details.",
        name = persona.name,
        title = persona.title,
    )
}

/// Format retrieved passages into the context block, clipped to
/// `char_budget` characters.
///
/// Each passage is labelled with its index id and routing description so
/// the model can tell which source it came from. Passages are taken in
/// order until the budget is exhausted; a passage that does not fit whole
/// is dropped rather than truncated mid-sentence.
pub fn format_context(passages: &[Passage], char_budget: usize) -> String {
    let mut out = String::new();

    for passage in passages {
        let entry = format!(
            "[{}] {}\n{}\n\n",
            passage.index_id, passage.description, passage.text
        );
        if out.len() + entry.len() > char_budget {
            break;
        }
        out.push_str(&entry);
    }

    out.trim_end().to_string()
}

/// Answer `question` against the federated index.
///
/// The user turn is recorded before anything that can fail, so on error
/// the transcript grows by exactly one turn and on success by two.
pub async fn ask(
    session: &mut ChatSession,
    federated: &FederatedIndex,
    pool: &SqlitePool,
    config: &Config,
    backend: &dyn CompletionBackend,
    question: &str,
) -> Result<String> {
    session.push_user(question);

    let passages = federated.retrieve(pool, config, question).await?;
    let context = format_context(&passages, config.retrieval.context_char_budget);

    let system_prompt = build_system_prompt(&config.persona);
    let answer = backend
        .complete(&system_prompt, session.bounded_history(), &context)
        .await?;

    session.push_assistant(answer.clone());
    Ok(answer)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passage(index_id: &str, text: &str) -> Passage {
        Passage {
            index_id: index_id.to_string(),
            description: "work history".to_string(),
            text: text.to_string(),
            score: 1.0,
        }
    }

    #[test]
    fn session_starts_with_greeting() {
        let session = ChatSession::new("Hi, I'm Gabriel.", 20);
        assert_eq!(session.len(), 1);
        assert_eq!(session.turns()[0].role, ChatRole::Assistant);
        assert_eq!(session.turns()[0].content, "Hi, I'm Gabriel.");
    }

    #[test]
    fn bounded_history_keeps_most_recent_turns() {
        let mut session = ChatSession::new("hello", 3);
        session.push_user("q1");
        session.push_assistant("a1");
        session.push_user("q2");
        session.push_assistant("a2");

        assert_eq!(session.len(), 5);
        let window = session.bounded_history();
        assert_eq!(window.len(), 3);
        assert_eq!(window[0].content, "a1");
        assert_eq!(window[2].content, "a2");
    }

    #[test]
    fn bounded_history_of_short_session_is_whole_transcript() {
        let mut session = ChatSession::new("hello", 20);
        session.push_user("q1");
        assert_eq!(session.bounded_history().len(), 2);
    }

    #[test]
    fn format_context_labels_passages_with_origin() {
        let context = format_context(
            &[passage("resume", "Software Engineer, Acme Corp, 2019-2021")],
            1000,
        );
        assert!(context.starts_with("[resume] work history"));
        assert!(context.contains("Acme Corp"));
    }

    #[test]
    fn format_context_respects_char_budget() {
        let passages = vec![
            passage("resume", &"a".repeat(100)),
            passage("github", &"b".repeat(100)),
        ];
        let context = format_context(&passages, 150);
        assert!(context.contains("aaa"));
        assert!(!context.contains("bbb"));
        assert!(context.len() <= 150);
    }

    #[test]
    fn format_context_of_no_passages_is_empty() {
        assert_eq!(format_context(&[], 1000), "");
    }

    #[test]
    fn system_prompt_speaks_as_the_persona() {
        let persona = PersonaConfig {
            name: "Gabriel".to_string(),
            title: "software developer".to_string(),
            greeting: None,
        };
        let prompt = build_system_prompt(&persona);
        assert!(prompt.contains("You are Gabriel"));
        assert!(prompt.contains("software developer"));
        assert!(prompt.contains("first person"));
    }
}

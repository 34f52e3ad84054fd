//! Text generation behind a trait so the responder can be driven by a fake.

use crate::conversation::ConversationEntry;
use cb_llm::{ChatMessage, LlmClient, LlmError};
use thiserror::Error;

/// Everything one generator call sees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub persona: String,
    /// Earlier exchanges with the same viewer, oldest first.
    pub history: Vec<ConversationEntry>,
    pub input: String,
}

#[derive(Debug, Error)]
pub enum GenerationFailure {
    #[error("generator backend failed: {0}")]
    Backend(String),

    #[error("generator returned an empty reply")]
    EmptyReply,
}

impl From<LlmError> for GenerationFailure {
    fn from(e: LlmError) -> Self {
        Self::Backend(e.to_string())
    }
}

#[async_trait::async_trait]
pub trait Generator: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &Prompt) -> Result<String, GenerationFailure>;
}

/// Chat-completions backed generator.
pub struct LlmGenerator {
    client: LlmClient,
}

impl LlmGenerator {
    pub fn new(client: LlmClient) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl Generator for LlmGenerator {
    fn name(&self) -> &str {
        self.client.model()
    }

    async fn generate(&self, prompt: &Prompt) -> Result<String, GenerationFailure> {
        let messages = prompt_messages(prompt);
        let response = self.client.chat(&messages).await?;
        tracing::debug!(
            model = %self.client.model(),
            prompt_tokens = response.usage.prompt_tokens,
            completion_tokens = response.usage.completion_tokens,
            finish_reason = %response.finish_reason,
            "generation completed"
        );
        Ok(response.message.content)
    }
}

/// Persona as the system message, each cached exchange as a user/assistant
/// pair, then the new input.
fn prompt_messages(prompt: &Prompt) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(prompt.history.len() * 2 + 2);
    messages.push(ChatMessage::system(&prompt.persona));
    for entry in &prompt.history {
        messages.push(ChatMessage::user(&entry.input));
        messages.push(ChatMessage::assistant(&entry.output));
    }
    messages.push(ChatMessage::user(&prompt.input));
    messages
}

//! Turns inbound chat messages into generated replies.
//!
//! The responder is the single consumer of the inbound queue and the only
//! owner of the conversation cache.

use crate::conversation::{ConversationCache, ConversationEntry};
use crate::generator::{GenerationFailure, Generator, Prompt};
use cb_irc::{ChatMessage, SendRequest};
use std::sync::Arc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// No alias in the text.
    Ignored,
    /// A reply was cached and queued for sending.
    Replied(SendRequest),
    /// The generator gave nothing usable; cache untouched, nothing sent.
    Failed,
}

pub struct Responder {
    generator: Arc<dyn Generator>,
    aliases: Vec<String>,
    persona_template: String,
    cache: ConversationCache,
    outbound_tx: UnboundedSender<SendRequest>,
}

impl Responder {
    pub fn new(
        generator: Arc<dyn Generator>,
        aliases: &[String],
        persona_template: impl Into<String>,
        cache_capacity: usize,
        outbound_tx: UnboundedSender<SendRequest>,
    ) -> Self {
        Self {
            generator,
            aliases: aliases
                .iter()
                .map(|a| a.trim().to_lowercase())
                .filter(|a| !a.is_empty())
                .collect(),
            persona_template: persona_template.into(),
            cache: ConversationCache::new(cache_capacity),
            outbound_tx,
        }
    }

    #[cfg(test)]
    fn cache(&self) -> &ConversationCache {
        &self.cache
    }

    /// Consume inbound messages in order until shutdown or until every sender
    /// is gone. A turn that has started runs to completion.
    #[tracing::instrument(level = "info", skip_all, fields(generator = %self.generator.name()))]
    pub async fn run(
        mut self,
        mut inbound_rx: UnboundedReceiver<ChatMessage>,
        shutdown: CancellationToken,
    ) {
        tracing::info!(
            aliases = ?self.aliases,
            cache_capacity = self.cache.capacity(),
            "responder started"
        );
        loop {
            let message = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    tracing::info!("responder stopped by shutdown");
                    return;
                }
                message = inbound_rx.recv() => message,
            };
            let Some(message) = message else {
                tracing::info!("inbound queue closed; responder exiting");
                return;
            };
            self.handle(message).await;
        }
    }

    #[tracing::instrument(
        level = "info",
        skip_all,
        fields(
            turn_id = %uuid::Uuid::new_v4(),
            username = %message.username,
            channel = %message.channel
        )
    )]
    pub async fn handle(&mut self, message: ChatMessage) -> TurnOutcome {
        let Some(input) = self.triggered_input(&message.text) else {
            tracing::trace!("no alias mentioned; ignoring");
            return TurnOutcome::Ignored;
        };

        let prompt = self.build_prompt(&message.username, input);
        tracing::info!(
            prior_exchanges = prompt.history.len(),
            input_chars = prompt.input.len(),
            "generation requested"
        );
        let output = match self.generate(&prompt).await {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!(error = %e, "turn dropped");
                return TurnOutcome::Failed;
            }
        };

        let reply = SendRequest::new(
            message.channel.as_str(),
            format!("@{} {}", message.username, output),
        );
        self.cache.record(
            &message.username,
            ConversationEntry {
                input: prompt.input,
                output,
            },
        );
        if self.outbound_tx.send(reply.clone()).is_err() {
            tracing::warn!("outbound queue closed; reply dropped");
        } else {
            tracing::info!(reply_chars = reply.text.len(), "reply queued");
        }
        TurnOutcome::Replied(reply)
    }

    /// Lower-cased, `@`-free input when any alias occurs in `text`.
    fn triggered_input(&self, text: &str) -> Option<String> {
        let lowered = text.to_lowercase();
        if !self.aliases.iter().any(|alias| lowered.contains(alias.as_str())) {
            return None;
        }
        Some(lowered.replace('@', ""))
    }

    fn build_prompt(&self, username: &str, input: String) -> Prompt {
        Prompt {
            persona: self.persona_template.replace("{username}", username),
            history: self.cache.history(username).cloned().collect(),
            input,
        }
    }

    async fn generate(&self, prompt: &Prompt) -> Result<String, GenerationFailure> {
        let output = self.generator.generate(prompt).await?;
        let output = output.trim();
        if output.is_empty() {
            return Err(GenerationFailure::EmptyReply);
        }
        Ok(output.to_string())
    }
}

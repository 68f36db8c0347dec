//! Bridges rig's `CompletionModel` trait to our `LlmProvider` trait.
//!
//! Rig models a conversation as a preamble plus a message history ending in
//! a prompt, so the adapter splits our flat message list along those lines.

use async_trait::async_trait;
use rig::completion::CompletionModel;
use rig::message::{AssistantContent, Message};

use crate::error::LlmError;
use crate::llm::provider::{
    ChatRole, CompletionRequest, CompletionResponse, FinishReason, LlmProvider,
};

/// Adapter wrapping a rig completion model.
pub struct RigAdapter<M: CompletionModel> {
    model: M,
    model_name: String,
}

impl<M: CompletionModel> RigAdapter<M> {
    pub fn new(model: M, model_name: &str) -> Self {
        Self {
            model,
            model_name: model_name.to_string(),
        }
    }
}

#[async_trait]
impl<M: CompletionModel> LlmProvider for RigAdapter<M> {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let mut preamble_parts: Vec<String> = Vec::new();
        let mut history: Vec<Message> = Vec::new();
        for message in request.messages {
            match message.role {
                ChatRole::System => preamble_parts.push(message.content),
                ChatRole::User => history.push(Message::user(message.content)),
                ChatRole::Assistant => history.push(Message::assistant(message.content)),
            }
        }
        // The final message becomes the prompt, the rest stay as history.
        let prompt = history.pop().unwrap_or_else(|| Message::user(String::new()));

        let mut builder = self.model.completion_request(prompt);
        if !preamble_parts.is_empty() {
            builder = builder.preamble(preamble_parts.join("\n\n"));
        }
        if !history.is_empty() {
            builder = builder.messages(history);
        }
        if let Some(temperature) = request.temperature {
            builder = builder.temperature(f64::from(temperature));
        }
        if let Some(max_tokens) = request.max_tokens {
            builder = builder.max_tokens(u64::from(max_tokens));
        }

        let response = builder.send().await.map_err(|e| LlmError::RequestFailed {
            provider: self.model_name.clone(),
            reason: format!("Completion request failed: {}", e),
        })?;

        let content: String = response
            .choice
            .iter()
            .filter_map(|part| match part {
                AssistantContent::Text(text) => Some(text.text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("");

        if content.is_empty() {
            return Err(LlmError::InvalidResponse {
                provider: self.model_name.clone(),
                reason: "Completion contained no text content".to_string(),
            });
        }

        Ok(CompletionResponse {
            content,
            input_tokens: response.usage.input_tokens as u32,
            output_tokens: response.usage.output_tokens as u32,
            finish_reason: FinishReason::Stop,
            response_id: None,
        })
    }
}

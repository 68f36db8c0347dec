//! Digest summarization: turns kept blocks into a readable summary.
//!
//! Sends the relevant block contents to the configured LLM with a fixed
//! instruction prompt. An empty kept set never reaches the provider.

use std::sync::Arc;

use tracing::info;

use crate::error::LlmError;
use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider};
use crate::scoring::ScoredBlock;

/// Max tokens for the summary completion.
const SUMMARY_MAX_TOKENS: u32 = 1000;

/// Temperature for the summary completion.
const SUMMARY_TEMPERATURE: f32 = 0.2;

/// Instruction sent as the user turn of every summary request.
const SUMMARY_USER_PROMPT: &str =
    "Summarize the findings into a straightforward and easy to read format.";

/// Summarizes scored newsletter blocks with an LLM.
pub struct Summarizer {
    llm: Arc<dyn LlmProvider>,
}

impl Summarizer {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    /// Generate a digest summary for the kept blocks.
    ///
    /// Returns `Ok(None)` when `blocks` is empty, without calling the
    /// provider. There is nothing worth emailing in that case.
    pub async fn summarize(&self, blocks: &[ScoredBlock]) -> Result<Option<String>, LlmError> {
        if blocks.is_empty() {
            info!("No blocks to summarize, skipping LLM call");
            return Ok(None);
        }

        let request = CompletionRequest::new(vec![
            ChatMessage::system(build_summary_system_prompt(blocks)),
            ChatMessage::user(SUMMARY_USER_PROMPT),
        ])
        .with_temperature(SUMMARY_TEMPERATURE)
        .with_max_tokens(SUMMARY_MAX_TOKENS);

        let response = self.llm.complete(request).await?;

        info!(
            model = self.llm.model_name(),
            blocks = blocks.len(),
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            "Summary generated"
        );

        Ok(Some(response.content))
    }
}

/// Build the system prompt embedding the kept block contents.
fn build_summary_system_prompt(blocks: &[ScoredBlock]) -> String {
    let contents = blocks
        .iter()
        .map(|scored| scored.block.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "You are a helpful newsletter summariser. This is content that is \
         related to the user's interests:\n<{}>\nYou are educational and you \
         do not add any additional information.",
        contents
    )
}

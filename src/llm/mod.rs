//! LLM integration for the digest pipeline.
//!
//! Supports Anthropic and OpenAI through rig-core, which handles the HTTP
//! transport; `RigAdapter` bridges rig's `CompletionModel` trait to our
//! `LlmProvider` trait so the summarizer stays backend-agnostic.

pub mod provider;
mod rig_adapter;

pub use provider::*;
pub use rig_adapter::RigAdapter;

use std::sync::Arc;

use rig::client::CompletionClient;
use secrecy::ExposeSecret;

use crate::error::LlmError;

/// Supported LLM backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    Anthropic,
    OpenAi,
}

impl LlmBackend {
    /// Lowercase provider label, used in logs and error reasons.
    pub fn label(self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
        }
    }
}

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub api_key: secrecy::SecretString,
    pub model: String,
}

/// Create the summarization provider for the configured backend.
///
/// Construction never touches the network; a bad API key surfaces on the
/// first completion request instead.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    match config.backend {
        LlmBackend::Anthropic => {
            use rig::providers::anthropic;

            let client: rig::client::Client<anthropic::client::AnthropicExt> =
                anthropic::Client::new(config.api_key.expose_secret())
                    .map_err(|e| client_error(config.backend, e))?;
            let model = client.completion_model(&config.model);
            tracing::info!(model = %config.model, "Using Anthropic for summaries");
            Ok(Arc::new(RigAdapter::new(model, &config.model)))
        }
        LlmBackend::OpenAi => {
            use rig::providers::openai;

            let client: rig::client::Client<openai::client::OpenAIResponsesExt> =
                openai::Client::new(config.api_key.expose_secret())
                    .map_err(|e| client_error(config.backend, e))?;
            let model = client.completion_model(&config.model);
            tracing::info!(model = %config.model, "Using OpenAI for summaries");
            Ok(Arc::new(RigAdapter::new(model, &config.model)))
        }
    }
}

fn client_error(backend: LlmBackend, e: impl std::fmt::Display) -> LlmError {
    LlmError::RequestFailed {
        provider: backend.label().to_string(),
        reason: format!("Client construction failed: {e}"),
    }
}

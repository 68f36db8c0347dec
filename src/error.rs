//! Error types for the digest pipeline.

/// Top-level error type for a digest run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Mailbox error: {0}")]
    Mailbox(#[from] MailboxError),

    #[error("Extraction error: {0}")]
    Extract(#[from] ExtractError),

    #[error("Scoring error: {0}")]
    Scoring(#[from] ScoringError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Mailbox access errors (IMAP connection and protocol).
#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    #[error("Failed to connect to {host}: {reason}")]
    ConnectFailed { host: String, reason: String },

    #[error("Mailbox authentication failed for {user}: {reason}")]
    AuthFailed { user: String, reason: String },

    #[error("Unexpected response to {command}: {response}")]
    UnexpectedResponse { command: String, response: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Extraction errors (sanitizer/segmenter setup).
///
/// Sanitization and segmentation themselves are infallible: malformed input
/// degrades to a best-effort (possibly empty) result instead of erroring.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("Invalid selector {selector:?}: {reason}")]
    InvalidSelector { selector: String, reason: String },
}

/// Relevance scoring errors.
#[derive(Debug, thiserror::Error)]
pub enum ScoringError {
    #[error("Interest list is empty after trimming whitespace")]
    EmptyInterests,

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),
}

/// Embedding backend errors.
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("Invalid embedding backend configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("Embedding request to {endpoint} failed: {reason}")]
    RequestFailed { endpoint: String, reason: String },

    #[error("Invalid embedding response: {reason}")]
    InvalidResponse { reason: String },
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

/// Outbound email errors.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Failed to send mail via {host}: {reason}")]
    SendFailed { host: String, reason: String },
}

/// Result type alias for the digest pipeline.
pub type Result<T> = std::result::Result<T, Error>;

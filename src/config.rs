//! Run configuration, read from environment variables.
//!
//! Every knob of a digest run lives here: newsletter sources, the recency
//! window, interest labels, the relevance threshold, and the credentials
//! for the mailbox, the embedding backend, the LLM and SMTP delivery.

use secrecy::SecretString;

use crate::delivery::SmtpConfig;
use crate::error::{ConfigError, Result};
use crate::llm::{LlmBackend, LlmConfig};
use crate::mailbox::{ImapConfig, NewsletterSource};
use crate::scoring::{DEFAULT_SCORE_THRESHOLD, HttpEmbedderConfig};

/// Full configuration for one digest run.
#[derive(Debug, Clone)]
pub struct DigestConfig {
    pub newsletters: Vec<NewsletterSource>,
    /// Recency window for the mailbox search, e.g. `7d`.
    pub newer_than: String,
    pub interests: Vec<String>,
    /// Blocks scoring below this against every interest are dropped.
    pub threshold: f32,
    pub imap: ImapConfig,
    pub smtp: SmtpConfig,
    /// Recipient of the digest email.
    pub to_address: String,
    pub embedding: HttpEmbedderConfig,
    pub llm: LlmConfig,
}

impl DigestConfig {
    /// Read the full run configuration from `DIGEST_*` environment
    /// variables (LLM API keys keep their conventional names).
    pub fn from_env() -> Result<Self> {
        let newsletters = parse_newsletters(&require(
            "DIGEST_NEWSLETTERS",
            "e.g. 'TLDR AI <dan@tldrnewsletter.com>, news@lennysnewsletter.com'",
        )?)?;
        let newer_than = require("DIGEST_NEWER_THAN", "e.g. '7d' for the last week")?
            .trim()
            .to_string();
        let interests = parse_interests(&require(
            "DIGEST_INTERESTS",
            "comma-separated labels, e.g. 'LangGraph, vector databases'",
        )?)?;
        let threshold = match optional("DIGEST_THRESHOLD") {
            Some(raw) => parse_threshold(&raw)?,
            None => DEFAULT_SCORE_THRESHOLD,
        };

        let imap_host = require("DIGEST_IMAP_HOST", "e.g. 'imap.gmail.com'")?;
        let imap = ImapConfig {
            host: imap_host.clone(),
            port: parse_port(optional("DIGEST_IMAP_PORT"), 993, "DIGEST_IMAP_PORT")?,
            username: require("DIGEST_IMAP_USER", "the mailbox login")?,
            password: SecretString::from(require(
                "DIGEST_IMAP_PASSWORD",
                "the mailbox password or app password",
            )?),
        };

        let smtp_username = optional("DIGEST_SMTP_USER").unwrap_or_else(|| imap.username.clone());
        let smtp_password = optional("DIGEST_SMTP_PASSWORD")
            .map(SecretString::from)
            .unwrap_or_else(|| imap.password.clone());
        let from_address = optional("DIGEST_EMAIL_FROM").unwrap_or_else(|| smtp_username.clone());
        let smtp = SmtpConfig {
            host: optional("DIGEST_SMTP_HOST")
                .unwrap_or_else(|| imap_host.replace("imap", "smtp")),
            port: parse_port(optional("DIGEST_SMTP_PORT"), 587, "DIGEST_SMTP_PORT")?,
            username: smtp_username,
            password: smtp_password,
            from_address,
        };
        let to_address = require("DIGEST_EMAIL_TO", "where the digest is delivered")?;

        let mut embedding = HttpEmbedderConfig::default();
        if let Some(endpoint) = optional("DIGEST_EMBED_ENDPOINT") {
            embedding.endpoint = endpoint;
        }
        if let Some(model) = optional("DIGEST_EMBED_MODEL") {
            embedding.model = model;
        }
        if let Some(raw) = optional("DIGEST_EMBED_DIMENSIONS") {
            embedding.dimensions = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: "DIGEST_EMBED_DIMENSIONS".to_string(),
                message: format!("cannot parse {raw:?} as a dimension count"),
            })?;
        }
        embedding.api_key = optional("DIGEST_EMBED_API_KEY").map(SecretString::from);

        let backend = match optional("DIGEST_LLM_BACKEND") {
            Some(raw) => parse_backend(&raw)?,
            None => LlmBackend::Anthropic,
        };
        let (key_var, default_model) = match backend {
            LlmBackend::Anthropic => ("ANTHROPIC_API_KEY", "claude-sonnet-4-20250514"),
            LlmBackend::OpenAi => ("OPENAI_API_KEY", "gpt-4o"),
        };
        let llm = LlmConfig {
            backend,
            api_key: SecretString::from(require(key_var, "the LLM API key")?),
            model: optional("DIGEST_LLM_MODEL").unwrap_or_else(|| default_model.to_string()),
        };

        Ok(Self {
            newsletters,
            newer_than,
            interests,
            threshold,
            imap,
            smtp,
            to_address,
            embedding,
            llm,
        })
    }
}

// ── Parsing helpers ─────────────────────────────────────────────────

fn require(key: &str, hint: &str) -> std::result::Result<String, ConfigError> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::MissingRequired {
            key: key.to_string(),
            hint: hint.to_string(),
        }),
    }
}

fn optional(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Parse a comma-separated list of `Name <addr@host>` or bare address
/// entries into newsletter sources.
fn parse_newsletters(value: &str) -> std::result::Result<Vec<NewsletterSource>, ConfigError> {
    let mut sources = Vec::new();
    for entry in value.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let source = parse_newsletter_entry(entry).ok_or_else(|| ConfigError::InvalidValue {
            key: "DIGEST_NEWSLETTERS".to_string(),
            message: format!("cannot parse newsletter entry {entry:?}"),
        })?;
        sources.push(source);
    }
    if sources.is_empty() {
        return Err(ConfigError::InvalidValue {
            key: "DIGEST_NEWSLETTERS".to_string(),
            message: "no newsletter sources configured".to_string(),
        });
    }
    Ok(sources)
}

fn parse_newsletter_entry(entry: &str) -> Option<NewsletterSource> {
    if let Some(open) = entry.find('<') {
        let close = entry.rfind('>')?;
        if close < open {
            return None;
        }
        let name = entry[..open].trim().to_string();
        let email = entry[open + 1..close].trim().to_string();
        if !email.contains('@') {
            return None;
        }
        return Some(NewsletterSource { name, email });
    }
    if entry.contains('@') && !entry.contains(char::is_whitespace) {
        return Some(NewsletterSource {
            name: String::new(),
            email: entry.to_string(),
        });
    }
    None
}

fn parse_interests(value: &str) -> std::result::Result<Vec<String>, ConfigError> {
    let interests: Vec<String> = value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    if interests.is_empty() {
        return Err(ConfigError::InvalidValue {
            key: "DIGEST_INTERESTS".to_string(),
            message: "no interest labels configured".to_string(),
        });
    }
    Ok(interests)
}

fn parse_threshold(raw: &str) -> std::result::Result<f32, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: "DIGEST_THRESHOLD".to_string(),
        message: format!("cannot parse {raw:?} as a number"),
    })
}

fn parse_port(
    value: Option<String>,
    default: u16,
    key: &str,
) -> std::result::Result<u16, ConfigError> {
    match value {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("cannot parse {raw:?} as a port"),
        }),
        None => Ok(default),
    }
}

fn parse_backend(value: &str) -> std::result::Result<LlmBackend, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "anthropic" => Ok(LlmBackend::Anthropic),
        "openai" => Ok(LlmBackend::OpenAi),
        other => Err(ConfigError::InvalidValue {
            key: "DIGEST_LLM_BACKEND".to_string(),
            message: format!("unknown backend {other:?}, expected 'anthropic' or 'openai'"),
        }),
    }
}

// ── Tests ───────────────────────────────────────────────────────────

use std::sync::Arc;

use maildigest::config::DigestConfig;
use maildigest::delivery::EmailSender;
use maildigest::extract::{Segmenter, sanitize};
use maildigest::llm::create_provider;
use maildigest::mailbox::MailboxReader;
use maildigest::scoring::{HttpEmbedder, RelevanceScorer, filter_scored};
use maildigest::summary::Summarizer;

/// Subject line of the outbound digest email.
const DIGEST_SUBJECT: &str = "Weekly Newsletter Summary";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = match DigestConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    eprintln!("📬 Maildigest v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   IMAP: {}", config.imap.host);
    eprintln!("   Newsletters: {}", config.newsletters.len());
    eprintln!("   Interests: {}", config.interests.join(", "));
    eprintln!("   Window: {}", config.newer_than);
    eprintln!("   Threshold: {}", config.threshold);
    eprintln!("   Model: {}\n", config.llm.model);

    // Step 1: fetch newsletter messages over IMAP
    let reader = MailboxReader::new(config.imap.clone());
    let sources = config.newsletters.clone();
    let newer_than = config.newer_than.clone();
    let messages = tokio::task::spawn_blocking(move || reader.fetch(&sources, &newer_than))
        .await
        .map_err(|e| format!("Mailbox task panicked: {e}"))??;

    // Step 2: sanitize and segment each message into content blocks
    let segmenter = Segmenter::new();
    let mut blocks = Vec::new();
    for message in &messages {
        let Some(html) = message.html.as_deref() else {
            tracing::warn!(
                uid = message.uid,
                sender = %message.sender,
                "Message has no HTML part, skipping"
            );
            continue;
        };
        let cleaned = sanitize(html);
        let message_blocks = segmenter.segment(&cleaned, &message.subject, &message.sender);
        tracing::info!(
            uid = message.uid,
            sender = %message.sender,
            blocks = message_blocks.len(),
            "Segmented message"
        );
        blocks.extend(message_blocks);
    }

    // Step 3: score the blocks against the configured interests
    let embedder = Arc::new(HttpEmbedder::new(config.embedding.clone())?);
    let scorer = RelevanceScorer::new(embedder);
    let scored = scorer.score(&blocks, &config.interests).await?;

    // Step 4: keep only blocks at or above the relevance threshold
    let kept = filter_scored(scored, config.threshold);
    tracing::info!(
        kept = kept.len(),
        total = blocks.len(),
        threshold = config.threshold,
        "Filtered blocks"
    );

    // Step 5: summarize the kept blocks with the LLM
    let llm = create_provider(&config.llm)?;
    let summarizer = Summarizer::new(llm);
    let Some(summary) = summarizer.summarize(&kept).await? else {
        tracing::info!("Nothing relevant this run, no digest sent");
        return Ok(());
    };

    // Step 6: email the digest
    let sender = EmailSender::new(config.smtp.clone());
    let message_id = sender.send(&config.to_address, DIGEST_SUBJECT, &summary)?;
    tracing::info!(to = %config.to_address, message_id = %message_id, "Digest delivered");

    Ok(())
}

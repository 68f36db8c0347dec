//! Maildigest: interest-ranked newsletter digests from your inbox.

pub mod config;
pub mod delivery;
pub mod error;
pub mod extract;
pub mod llm;
pub mod mailbox;
pub mod scoring;
pub mod summary;

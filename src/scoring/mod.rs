//! Relevance scoring: embeds blocks and interests into one vector space,
//! annotates each block with its best-matching interest, and filters by a
//! similarity threshold.

pub mod embedder;
pub mod scorer;

pub use embedder::{Embedder, HttpEmbedder, HttpEmbedderConfig};
pub use scorer::{filter_scored, RelevanceScorer, ScoredBlock, DEFAULT_SCORE_THRESHOLD};

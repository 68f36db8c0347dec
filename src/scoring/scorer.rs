//! Scores content blocks against user interests and filters by threshold.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ScoringError;
use crate::extract::ContentBlock;
use crate::scoring::Embedder;

/// Blocks whose best score falls below this are dropped by default.
pub const DEFAULT_SCORE_THRESHOLD: f32 = 0.38;

// ── Data model ──────────────────────────────────────────────────────

/// A [`ContentBlock`] annotated with its similarity to every interest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredBlock {
    /// The underlying content block.
    pub block: ContentBlock,
    /// Cosine similarity per interest label, rounded to 4 decimals.
    pub scores: HashMap<String, f32>,
    /// Interest with the highest similarity. Ties go to the interest
    /// declared first.
    pub best_interest: String,
    /// The highest similarity, rounded to 4 decimals.
    pub best_score: f32,
}

// ── Scorer ──────────────────────────────────────────────────────────

/// Embeds blocks and interests into one vector space and annotates each
/// block with its best-matching interest.
///
/// Owns a shared [`Embedder`] handle so the model is constructed once per
/// run, not per call.
pub struct RelevanceScorer {
    embedder: Arc<dyn Embedder>,
    include_heading: bool,
}

impl RelevanceScorer {
    /// Builds a scorer over a shared embedding backend. The block heading
    /// is excluded from the scoring text by default.
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            include_heading: false,
        }
    }

    /// Prefixes each block's heading onto its scoring text.
    pub fn with_heading(mut self, include_heading: bool) -> Self {
        self.include_heading = include_heading;
        self
    }

    /// Scores every block against every interest.
    ///
    /// Interests are trimmed and empties discarded first; an interest list
    /// that is empty after cleaning fails the whole run with
    /// [`ScoringError::EmptyInterests`]. Embeddings are unit-norm, so
    /// cosine similarity is the plain dot product. The per-interest scores
    /// are rounded to 4 decimals; the best interest is picked over the
    /// unrounded values, lowest index winning ties.
    pub async fn score(
        &self,
        blocks: &[ContentBlock],
        interests: &[String],
    ) -> Result<Vec<ScoredBlock>, ScoringError> {
        let interests = clean_interests(interests);
        if interests.is_empty() {
            return Err(ScoringError::EmptyInterests);
        }
        if blocks.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<String> = blocks.iter().map(|b| self.scoring_text(b)).collect();
        let block_embeddings = self.embedder.embed_batch(&texts).await?;
        let interest_embeddings = self.embedder.embed_batch(&interests).await?;

        let mut scored = Vec::with_capacity(blocks.len());
        for (block, embedding) in blocks.iter().zip(&block_embeddings) {
            let sims: Vec<f32> = interest_embeddings
                .iter()
                .map(|interest| dot(embedding, interest))
                .collect();

            let mut best = 0;
            for (j, sim) in sims.iter().enumerate() {
                if *sim > sims[best] {
                    best = j;
                }
            }

            let scores = interests
                .iter()
                .cloned()
                .zip(sims.iter().map(|s| round4(*s)))
                .collect();

            scored.push(ScoredBlock {
                block: block.clone(),
                scores,
                best_interest: interests[best].clone(),
                best_score: round4(sims[best]),
            });
        }
        Ok(scored)
    }

    fn scoring_text(&self, block: &ContentBlock) -> String {
        let mut parts: Vec<&str> = Vec::new();
        if self.include_heading {
            if let Some(heading) = block.heading.as_deref() {
                if !heading.is_empty() {
                    parts.push(heading);
                }
            }
        }
        if !block.content.is_empty() {
            parts.push(&block.content);
        }
        parts.join(" ")
    }
}

// ── Selector ────────────────────────────────────────────────────────

/// Keeps exactly the blocks whose `best_score` meets the threshold,
/// preserving input order. A score equal to the threshold is kept.
pub fn filter_scored(scored: Vec<ScoredBlock>, threshold: f32) -> Vec<ScoredBlock> {
    scored
        .into_iter()
        .filter(|s| s.best_score >= threshold)
        .collect()
}

// ── Helpers ─────────────────────────────────────────────────────────

fn clean_interests(interests: &[String]) -> Vec<String> {
    interests
        .iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn round4(value: f32) -> f32 {
    (value * 10_000.0).round() / 10_000.0
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::error::EmbeddingError;

    // ── Test embedders ──────────────────────────────────────────────

    /// Keyword-axis embedder: one dimension per vocabulary word, set when
    /// the text mentions it. Deterministic, so similarity is meaningful
    /// without a real model.
    struct KeywordEmbedder {
        vocab: Vec<&'static str>,
        /// Texts per simulated request; must not affect results.
        batch_size: usize,
    }

    impl KeywordEmbedder {
        fn new(vocab: Vec<&'static str>) -> Self {
            Self {
                vocab,
                batch_size: 64,
            }
        }

        fn embed_one(&self, text: &str) -> Vec<f32> {
            let lower = text.to_lowercase();
            let raw: Vec<f32> = self
                .vocab
                .iter()
                .map(|word| if lower.contains(word) { 1.0 } else { 0.0 })
                .collect();
            let norm: f32 = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm > 0.0 {
                raw.into_iter().map(|x| x / norm).collect()
            } else {
                raw
            }
        }
    }

    #[async_trait]
    impl Embedder for KeywordEmbedder {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            let mut out = Vec::with_capacity(texts.len());
            for chunk in texts.chunks(self.batch_size.max(1)) {
                out.extend(chunk.iter().map(|t| self.embed_one(t)));
            }
            Ok(out)
        }

        fn dimensions(&self) -> usize {
            self.vocab.len()
        }

        fn model_name(&self) -> &str {
            "keyword-axis"
        }
    }

    /// Maps exact strings to fixed vectors; anything unknown is the zero
    /// vector.
    struct FixedEmbedder {
        table: Vec<(&'static str, Vec<f32>)>,
    }

    #[async_trait]
    impl Embedder for FixedEmbedder {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Ok(texts
                .iter()
                .map(|t| {
                    self.table
                        .iter()
                        .find(|(key, _)| key == t)
                        .map(|(_, v)| v.clone())
                        .unwrap_or_else(|| vec![0.0, 0.0])
                })
                .collect())
        }

        fn dimensions(&self) -> usize {
            2
        }

        fn model_name(&self) -> &str {
            "fixed"
        }
    }

    fn block(content: &str) -> ContentBlock {
        ContentBlock {
            sender: "news@example.com".to_string(),
            subject: "Issue 1".to_string(),
            heading: Some("Heading".to_string()),
            content: content.to_string(),
            links: Vec::new(),
        }
    }

    fn interests(labels: &[&str]) -> Vec<String> {
        labels.iter().map(|s| s.to_string()).collect()
    }

    // ── Scoring tests ───────────────────────────────────────────────

    #[tokio::test]
    async fn scores_blocks_against_each_interest() {
        let embedder = Arc::new(KeywordEmbedder::new(vec!["langgraph", "cooking"]));
        let scorer = RelevanceScorer::new(embedder);
        let blocks = vec![block("LangGraph agent orchestration in production")];

        let scored = scorer
            .score(&blocks, &interests(&["LangGraph", "cooking"]))
            .await
            .unwrap();

        assert_eq!(scored.len(), 1);
        assert_eq!(scored[0].best_interest, "LangGraph");
        assert!((scored[0].best_score - 1.0).abs() < 1e-4);
        assert_eq!(scored[0].scores.len(), 2);
        assert_eq!(scored[0].scores["cooking"], 0.0);
    }

    #[tokio::test]
    async fn empty_interest_list_is_fatal() {
        let embedder = Arc::new(KeywordEmbedder::new(vec!["x"]));
        let scorer = RelevanceScorer::new(embedder);
        let blocks = vec![block("anything")];

        let err = scorer.score(&blocks, &[]).await.unwrap_err();
        assert!(matches!(err, ScoringError::EmptyInterests));

        let embedder = Arc::new(KeywordEmbedder::new(vec!["x"]));
        let scorer = RelevanceScorer::new(embedder);
        let err = scorer
            .score(&blocks, &interests(&["  ", "\t"]))
            .await
            .unwrap_err();
        assert!(matches!(err, ScoringError::EmptyInterests));
    }

    #[tokio::test]
    async fn interests_are_trimmed_before_scoring() {
        let embedder = Arc::new(KeywordEmbedder::new(vec!["rust"]));
        let scorer = RelevanceScorer::new(embedder);
        let blocks = vec![block("rust release notes")];

        let scored = scorer
            .score(&blocks, &interests(&["  rust  ", ""]))
            .await
            .unwrap();
        assert_eq!(scored[0].best_interest, "rust");
        assert!(scored[0].scores.contains_key("rust"));
    }

    #[tokio::test]
    async fn ties_resolve_to_first_declared_interest() {
        // Both interests contain the same keyword, so every similarity
        // is identical.
        let embedder = Arc::new(KeywordEmbedder::new(vec!["news"]));
        let scorer = RelevanceScorer::new(embedder);
        let blocks = vec![block("news roundup")];

        let scored = scorer
            .score(&blocks, &interests(&["news first", "news second"]))
            .await
            .unwrap();
        assert_eq!(scored[0].best_interest, "news first");
    }

    #[tokio::test]
    async fn scores_are_rounded_to_four_decimals() {
        let embedder = Arc::new(FixedEmbedder {
            table: vec![
                ("diagonal text", vec![0.70710678, 0.70710678]),
                ("topic", vec![1.0, 0.0]),
            ],
        });
        let scorer = RelevanceScorer::new(embedder);
        let blocks = vec![block("diagonal text")];

        let scored = scorer.score(&blocks, &interests(&["topic"])).await.unwrap();
        assert_eq!(scored[0].best_score, 0.7071);
        assert_eq!(scored[0].scores["topic"], 0.7071);
    }

    #[tokio::test]
    async fn batch_size_does_not_change_results() {
        let blocks: Vec<ContentBlock> = (0..10)
            .map(|i| block(&format!("rust item number {i}")))
            .collect();
        let labels = interests(&["rust", "go"]);

        let mut results = Vec::new();
        for batch_size in [1, 3, 64] {
            let embedder = Arc::new(KeywordEmbedder {
                vocab: vec!["rust", "go"],
                batch_size,
            });
            let scorer = RelevanceScorer::new(embedder);
            results.push(scorer.score(&blocks, &labels).await.unwrap());
        }
        assert_eq!(results[0], results[1]);
        assert_eq!(results[1], results[2]);
    }

    #[tokio::test]
    async fn heading_prefix_is_opt_in() {
        let embedder = Arc::new(KeywordEmbedder::new(vec!["heading"]));
        let scorer = RelevanceScorer::new(embedder.clone());
        let blocks = vec![block("content only")];

        // Heading excluded: the block never mentions the keyword.
        let scored = scorer.score(&blocks, &interests(&["heading"])).await.unwrap();
        assert_eq!(scored[0].best_score, 0.0);

        let scorer = RelevanceScorer::new(embedder).with_heading(true);
        let scored = scorer.score(&blocks, &interests(&["heading"])).await.unwrap();
        assert!(scored[0].best_score > 0.9);
    }

    #[tokio::test]
    async fn no_blocks_yields_no_scores() {
        let embedder = Arc::new(KeywordEmbedder::new(vec!["x"]));
        let scorer = RelevanceScorer::new(embedder);
        let scored = scorer.score(&[], &interests(&["x"])).await.unwrap();
        assert!(scored.is_empty());
    }

    // ── Selector tests ──────────────────────────────────────────────

    #[tokio::test]
    async fn filter_keeps_scores_at_or_above_threshold() {
        let embedder = Arc::new(FixedEmbedder {
            table: vec![
                ("at threshold", vec![0.5, 0.8660254]),
                ("below threshold", vec![0.25, 0.9682458]),
                ("well above", vec![1.0, 0.0]),
                ("topic", vec![1.0, 0.0]),
            ],
        });
        let scorer = RelevanceScorer::new(embedder);
        let blocks = vec![
            block("at threshold"),
            block("below threshold"),
            block("well above"),
        ];

        let scored = scorer.score(&blocks, &interests(&["topic"])).await.unwrap();
        let kept = filter_scored(scored, 0.5);

        let contents: Vec<&str> = kept.iter().map(|s| s.block.content.as_str()).collect();
        assert_eq!(contents, vec!["at threshold", "well above"]);
    }

    #[tokio::test]
    async fn filter_preserves_input_order() {
        let embedder = Arc::new(KeywordEmbedder::new(vec!["rust"]));
        let scorer = RelevanceScorer::new(embedder);
        let blocks = vec![
            block("rust alpha"),
            block("nothing relevant"),
            block("rust beta"),
        ];

        let scored = scorer.score(&blocks, &interests(&["rust"])).await.unwrap();
        let kept = filter_scored(scored, DEFAULT_SCORE_THRESHOLD);

        let contents: Vec<&str> = kept.iter().map(|s| s.block.content.as_str()).collect();
        assert_eq!(contents, vec!["rust alpha", "rust beta"]);
    }
}

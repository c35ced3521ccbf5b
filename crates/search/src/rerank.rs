use crate::intent::{Intent, IntentTable};
use crate::types::{RerankedCandidate, ScoredCandidate};
use reelqa_vector_store::{cosine_similarity, Embedder, Result};
use std::cmp::Ordering;
use std::collections::HashSet;

/// Intent-weighted semantic reranker.
///
/// Re-embeds the rewritten query and every candidate text, so the scores differ from
/// the index similarity even for the same chunk.
#[derive(Debug, Clone)]
pub struct Reranker {
    weights: IntentTable<f32>,
}

impl Reranker {
    #[must_use]
    pub const fn new(weights: IntentTable<f32>) -> Self {
        Self { weights }
    }

    #[must_use]
    pub fn weight(&self, intent: Intent) -> f32 {
        *self.weights.get(intent)
    }

    /// Score, drop below `min_score`, sort descending, keep the best chunk per
    /// document and truncate to `top_k`.
    pub async fn rerank(
        &self,
        embedder: &dyn Embedder,
        rewritten_query: &str,
        candidates: Vec<ScoredCandidate>,
        intent: Intent,
        top_k: usize,
        min_score: f32,
    ) -> Result<Vec<RerankedCandidate>> {
        if candidates.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let query_embedding = embedder.embed(rewritten_query).await?;
        let texts: Vec<&str> = candidates.iter().map(|c| c.chunk.text.as_str()).collect();
        let chunk_embeddings = embedder.embed_batch(&texts).await?;

        let importance = self.weight(intent);
        let mut reranked: Vec<RerankedCandidate> = candidates
            .into_iter()
            .zip(chunk_embeddings)
            .filter_map(|(candidate, embedding)| {
                let base_similarity = cosine_similarity(&query_embedding, &embedding);
                let rerank_score = base_similarity * importance;
                (rerank_score >= min_score).then_some(RerankedCandidate {
                    candidate,
                    rerank_score,
                    base_similarity,
                    importance,
                    query_type: intent,
                })
            })
            .collect();

        reranked.sort_by(|a, b| {
            b.rerank_score
                .partial_cmp(&a.rerank_score)
                .unwrap_or(Ordering::Equal)
        });

        let mut seen = HashSet::new();
        reranked.retain(|c| seen.insert(c.doc_id().to_string()));
        reranked.truncate(top_k);

        log::debug!(
            "Reranked to {} candidates (intent {intent}, weight {importance})",
            reranked.len()
        );
        Ok(reranked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{scored, FixedEmbedder};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::Ordering as AtomicOrdering;

    fn weights() -> IntentTable<f32> {
        IntentTable {
            fact: 1.25,
            director: 1.25,
            plot: 1.15,
            ending: 1.2,
            character: 1.15,
            explanation: 1.1,
            summary: 1.15,
            general: 1.0,
        }
    }

    fn embedder() -> FixedEmbedder {
        FixedEmbedder::new(
            &[
                ("query", &[1.0, 0.0]),
                ("exact", &[1.0, 0.0]),
                ("close", &[0.8, 0.6]),
                ("far", &[0.1, 0.995]),
                ("opposite", &[-1.0, 0.0]),
            ],
            &[0.0, 1.0],
        )
    }

    #[tokio::test]
    async fn weights_filters_and_sorts() {
        let candidates = vec![
            scored(0, "D0", "close", 0.9),
            scored(1, "D1", "exact", 0.5),
            scored(2, "D2", "far", 0.8),
            scored(3, "D3", "opposite", 0.7),
        ];
        let out = Reranker::new(weights())
            .rerank(&embedder(), "query", candidates, Intent::Fact, 9, 0.15)
            .await
            .unwrap();

        let docs: Vec<&str> = out.iter().map(RerankedCandidate::doc_id).collect();
        assert_eq!(docs, vec!["D1", "D0"]);
        assert!((out[0].rerank_score - 1.25).abs() < 1e-6);
        assert!((out[1].base_similarity - 0.8).abs() < 1e-6);
        assert!((out[1].importance - 1.25).abs() < 1e-6);
        assert_eq!(out[0].query_type, Intent::Fact);
    }

    #[tokio::test]
    async fn keeps_best_chunk_per_document() {
        let candidates = vec![
            scored(0, "D0", "close", 0.9),
            scored(1, "D0", "exact", 0.5),
            scored(2, "D1", "close", 0.4),
        ];
        let out = Reranker::new(weights())
            .rerank(&embedder(), "query", candidates, Intent::General, 9, 0.0)
            .await
            .unwrap();

        let ids: Vec<i64> = out.iter().map(|c| c.chunk().vector_id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn truncates_to_top_k() {
        let candidates = (0..5)
            .map(|i| scored(i, &format!("D{i}"), "close", 0.5))
            .collect();
        let out = Reranker::new(weights())
            .rerank(&embedder(), "query", candidates, Intent::Plot, 3, 0.15)
            .await
            .unwrap();
        assert_eq!(out.len(), 3);
    }

    #[tokio::test]
    async fn empty_input_skips_embedding() {
        let embedder = embedder();
        let out = Reranker::new(weights())
            .rerank(&embedder, "query", vec![], Intent::Plot, 9, 0.15)
            .await
            .unwrap();
        assert!(out.is_empty());
        assert_eq!(embedder.calls.load(AtomicOrdering::Relaxed), 0);
    }
}

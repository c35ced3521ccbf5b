use crate::intent::{Intent, IntentTable};
use crate::types::RerankedCandidate;

/// Variable-length evidence window: `base_k` items always, then more while they stay
/// within `score_drop_threshold` of the top score, up to `max_k`.
///
/// `reranked` must already be sorted by `rerank_score` descending.
#[must_use]
pub fn select_evidence(
    mut reranked: Vec<RerankedCandidate>,
    base_k: usize,
    max_k: usize,
    score_drop_threshold: f32,
) -> Vec<RerankedCandidate> {
    if reranked.len() <= base_k {
        return reranked;
    }

    let top_score = reranked[0].rerank_score;
    let mut take = base_k;
    while take < max_k && take < reranked.len() {
        if top_score - reranked[take].rerank_score > score_drop_threshold {
            break;
        }
        take += 1;
    }
    reranked.truncate(take);
    reranked
}

#[derive(Debug, Clone)]
pub struct EvidenceSelector {
    base_k: IntentTable<usize>,
    max_k: usize,
    score_drop_threshold: f32,
}

impl EvidenceSelector {
    #[must_use]
    pub const fn new(base_k: IntentTable<usize>, max_k: usize, score_drop_threshold: f32) -> Self {
        Self {
            base_k,
            max_k,
            score_drop_threshold,
        }
    }

    #[must_use]
    pub fn base_k(&self, intent: Intent) -> usize {
        *self.base_k.get(intent)
    }

    #[must_use]
    pub const fn max_k(&self) -> usize {
        self.max_k
    }

    /// Select for the intent recorded on the first candidate (`general` when empty).
    #[must_use]
    pub fn select(&self, reranked: Vec<RerankedCandidate>) -> Vec<RerankedCandidate> {
        let intent = reranked.first().map_or(Intent::General, |c| c.query_type);
        let selected = select_evidence(
            reranked,
            self.base_k(intent),
            self.max_k,
            self.score_drop_threshold,
        );
        log::debug!("Selected {} evidence chunks for intent {intent}", selected.len());
        selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::reranked;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn batch(scores: &[f32]) -> Vec<RerankedCandidate> {
        scores
            .iter()
            .enumerate()
            .map(|(i, s)| reranked(&format!("D{i}"), *s, Intent::Fact))
            .collect()
    }

    fn scores(selected: &[RerankedCandidate]) -> Vec<f32> {
        selected.iter().map(|c| c.rerank_score).collect()
    }

    #[test]
    fn short_lists_are_returned_whole() {
        assert_eq!(scores(&select_evidence(batch(&[0.9, 0.1]), 5, 8, 0.25)), vec![0.9, 0.1]);
    }

    #[test]
    fn extends_until_first_large_drop() {
        let selected = select_evidence(batch(&[0.9, 0.85, 0.7, 0.6, 0.7, 0.65]), 2, 8, 0.25);
        assert_eq!(scores(&selected), vec![0.9, 0.85, 0.7]);
    }

    #[test]
    fn caps_at_max_k() {
        let selected = select_evidence(batch(&[0.9; 12]), 2, 8, 0.25);
        assert_eq!(selected.len(), 8);
    }

    #[test]
    fn selector_uses_intent_base_k() {
        let selector = EvidenceSelector::new(
            IntentTable {
                fact: 2,
                director: 2,
                plot: 6,
                ending: 5,
                character: 5,
                explanation: 5,
                summary: 6,
                general: 5,
            },
            8,
            0.25,
        );
        // 0.9 - 0.6 exceeds the drop bound, so nothing past base_k survives
        let selected = selector.select(batch(&[0.9, 0.8, 0.6, 0.6]));
        assert_eq!(selected.len(), 2);
        assert!(selector.select(vec![]).is_empty());
    }

    proptest! {
        #[test]
        fn size_is_bounded(
            mut raw in prop::collection::vec(0.0f32..2.0, 0..20),
            max_k in 1usize..10,
            base_seed in 1usize..10,
            drop in 0.0f32..1.0,
        ) {
            raw.sort_by(|a, b| b.partial_cmp(a).unwrap());
            let base_k = base_seed.min(max_k);
            let n = raw.len();
            let selected = select_evidence(batch(&raw), base_k, max_k, drop);

            prop_assert!(selected.len() <= max_k);
            prop_assert!(selected.len() >= base_k.min(n));
            for pair in selected.windows(2) {
                prop_assert!(pair[0].rerank_score >= pair[1].rerank_score);
            }
        }
    }
}

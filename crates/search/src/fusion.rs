use crate::types::{round_to, FusedCandidate, RerankedCandidate};
use std::cmp::Ordering;

/// Linear blend of min-max normalized rerank and vector scores.
///
/// Normalization is relative to the batch passed to [`ScoreFusion::fuse`], so fused
/// scores from different batches are not comparable.
#[derive(Debug, Clone, Copy)]
pub struct ScoreFusion {
    /// Weight of the rerank signal
    alpha: f32,
}

impl ScoreFusion {
    #[must_use]
    pub const fn new(alpha: f32) -> Self {
        Self { alpha }
    }

    #[must_use]
    pub const fn alpha(&self) -> f32 {
        self.alpha
    }

    /// `final = alpha * rerank_norm + (1 - alpha) * vector_norm`, rounded to 3 decimals,
    /// sorted descending.
    #[must_use]
    pub fn fuse(&self, batch: &[RerankedCandidate]) -> Vec<FusedCandidate> {
        if batch.is_empty() {
            return Vec::new();
        }

        let vector_scores: Vec<f32> = batch.iter().map(|c| c.candidate.vector_score).collect();
        let rerank_scores: Vec<f32> = batch.iter().map(|c| c.rerank_score).collect();
        let vector_norm = min_max_normalize(&vector_scores);
        let rerank_norm = min_max_normalize(&rerank_scores);

        let mut fused: Vec<FusedCandidate> = batch
            .iter()
            .zip(vector_norm.iter().zip(&rerank_norm))
            .map(|(candidate, (vector, rerank))| {
                let blended = self.alpha.mul_add(*rerank, (1.0 - self.alpha) * vector);
                FusedCandidate {
                    reranked: candidate.clone(),
                    final_score: round_to(blended.clamp(0.0, 1.0), 3),
                }
            })
            .collect();

        fused.sort_by(|a, b| {
            b.final_score
                .partial_cmp(&a.final_score)
                .unwrap_or(Ordering::Equal)
        });
        fused
    }
}

impl Default for ScoreFusion {
    fn default() -> Self {
        Self::new(0.6)
    }
}

/// Scale into `[0, 1]`. A constant array maps to all `1.0`; non-finite inputs map to `0.0`.
#[must_use]
pub fn min_max_normalize(values: &[f32]) -> Vec<f32> {
    let finite = values.iter().copied().filter(|v| v.is_finite());
    let (min, max) = finite.fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    let range = max - min;

    values
        .iter()
        .map(|v| {
            if !v.is_finite() {
                0.0
            } else if range <= 0.0 {
                1.0
            } else {
                (v - min) / range
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::Intent;
    use crate::test_support::reranked;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn candidate(doc_id: &str, vector_score: f32, rerank_score: f32) -> RerankedCandidate {
        let mut c = reranked(doc_id, rerank_score, Intent::Plot);
        c.candidate.vector_score = vector_score;
        c
    }

    #[test]
    fn constant_array_normalizes_to_ones() {
        assert_eq!(min_max_normalize(&[0.4, 0.4, 0.4]), vec![1.0, 1.0, 1.0]);
        assert_eq!(min_max_normalize(&[2.0, 0.0, 1.0]), vec![1.0, 0.0, 0.5]);
        assert!(min_max_normalize(&[]).is_empty());
    }

    #[test]
    fn blends_with_alpha() {
        let batch = vec![
            candidate("A", 0.9, 0.2),
            candidate("B", 0.1, 0.8),
            candidate("C", 0.5, 0.5),
        ];
        let fused = ScoreFusion::default().fuse(&batch);

        let order: Vec<(&str, f32)> = fused
            .iter()
            .map(|f| (f.reranked.doc_id(), f.final_score))
            .collect();
        // B: 0.6*1 + 0.4*0 ; C: 0.6*0.5 + 0.4*0.5 ; A: 0.6*0 + 0.4*1
        assert_eq!(order, vec![("B", 0.6), ("C", 0.5), ("A", 0.4)]);
    }

    #[test]
    fn single_candidate_scores_one() {
        let fused = ScoreFusion::default().fuse(&[candidate("A", -0.3, 0.2)]);
        assert_eq!(fused[0].final_score, 1.0);
    }

    proptest! {
        #[test]
        fn fused_scores_are_bounded_and_sorted(
            scores in prop::collection::vec((-1.0f32..1.0, 0.0f32..1.5), 1..20),
            alpha in 0.0f32..=1.0,
        ) {
            let batch: Vec<RerankedCandidate> = scores
                .iter()
                .enumerate()
                .map(|(i, (v, r))| candidate(&format!("D{i}"), *v, *r))
                .collect();
            let fused = ScoreFusion::new(alpha).fuse(&batch);

            prop_assert_eq!(fused.len(), batch.len());
            for f in &fused {
                prop_assert!((0.0..=1.0).contains(&f.final_score));
            }
            for pair in fused.windows(2) {
                prop_assert!(pair[0].final_score >= pair[1].final_score);
            }
        }
    }
}

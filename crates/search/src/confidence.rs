use crate::types::{round_to, RerankedCandidate};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

const EVIDENCE_WEIGHTS: [f32; 3] = [0.5, 0.3, 0.2];

/// Per-item evidence strength signal.
pub trait EvidenceStrength {
    fn rerank_score(&self) -> Option<f32>;

    fn base_similarity(&self) -> Option<f32>;

    /// `rerank_score`, else `base_similarity`, else `0.0`.
    fn strength(&self) -> f32 {
        self.rerank_score()
            .or_else(|| self.base_similarity())
            .unwrap_or(0.0)
    }
}

impl EvidenceStrength for RerankedCandidate {
    fn rerank_score(&self) -> Option<f32> {
        Some(self.rerank_score)
    }

    fn base_similarity(&self) -> Option<f32> {
        Some(self.base_similarity)
    }
}

/// Evidence scores supplied by a caller outside the pipeline; either may be absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreHint {
    #[serde(default)]
    pub rerank_score: Option<f32>,
    #[serde(default)]
    pub base_similarity: Option<f32>,
}

impl EvidenceStrength for ScoreHint {
    fn rerank_score(&self) -> Option<f32> {
        self.rerank_score
    }

    fn base_similarity(&self) -> Option<f32> {
        self.base_similarity
    }
}

/// Weighted top-3 evidence strength times the grounding score, clamped to `[0, 1]`
/// and rounded to 3 decimals.
#[must_use]
pub fn compute_confidence<E: EvidenceStrength>(evidence: &[E], grounding_score: f32) -> f32 {
    if evidence.is_empty() {
        return 0.0;
    }

    let mut strengths: Vec<f32> = evidence.iter().map(EvidenceStrength::strength).collect();
    strengths.sort_by(|a, b| b.partial_cmp(a).unwrap_or(Ordering::Equal));

    let evidence_score: f32 = strengths
        .iter()
        .zip(EVIDENCE_WEIGHTS)
        .map(|(strength, weight)| strength * weight)
        .sum();

    let confidence = evidence_score * grounding_score;
    if !confidence.is_finite() {
        return 0.0;
    }
    round_to(confidence.clamp(0.0, 1.0), 3)
}

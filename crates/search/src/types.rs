use crate::intent::Intent;
use reelqa_corpus::Chunk;
use serde::{Deserialize, Serialize};

/// A chunk returned by vector retrieval with its index similarity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub chunk: Chunk,
    pub vector_score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RerankedCandidate {
    pub candidate: ScoredCandidate,
    /// `base_similarity * importance`
    pub rerank_score: f32,
    /// Unweighted cosine between the rewritten query and the chunk text
    pub base_similarity: f32,
    /// Intent weight applied
    pub importance: f32,
    pub query_type: Intent,
}

impl RerankedCandidate {
    #[must_use]
    pub const fn chunk(&self) -> &Chunk {
        &self.candidate.chunk
    }

    #[must_use]
    pub fn doc_id(&self) -> &str {
        &self.candidate.chunk.doc_id
    }
}

/// Batch-relative blend of the normalized vector and rerank scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedCandidate {
    pub reranked: RerankedCandidate,
    pub final_score: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroundingResult {
    pub score: f32,
    pub is_hallucinated: bool,
}

impl GroundingResult {
    #[must_use]
    pub const fn grounded() -> Self {
        Self {
            score: 1.0,
            is_hallucinated: false,
        }
    }

    #[must_use]
    pub const fn ungrounded() -> Self {
        Self {
            score: 0.0,
            is_hallucinated: true,
        }
    }
}

pub(crate) fn round_to(value: f32, decimals: i32) -> f32 {
    let factor = 10f32.powi(decimals);
    (value * factor).round() / factor
}

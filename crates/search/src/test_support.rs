use crate::intent::Intent;
use crate::types::{RerankedCandidate, ScoredCandidate};
use async_trait::async_trait;
use reelqa_corpus::Chunk;
use reelqa_vector_store::{Embedder, Judge, Result as VectorResult, VectorStoreError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

pub fn chunk(vector_id: i64, doc_id: &str, title: &str, section: &str, text: &str) -> Chunk {
    Chunk {
        doc_id: doc_id.to_string(),
        chunk_id: format!("{doc_id}_c{vector_id}"),
        vector_id,
        title: title.to_string(),
        text: text.to_string(),
        source: "wiki".to_string(),
        section: section.to_string(),
        start_char: 0,
        end_char: text.len().max(1),
    }
}

pub fn scored(vector_id: i64, doc_id: &str, text: &str, vector_score: f32) -> ScoredCandidate {
    ScoredCandidate {
        chunk: chunk(vector_id, doc_id, "Heat", "plot_setup", text),
        vector_score,
    }
}

pub fn reranked(doc_id: &str, rerank_score: f32, intent: Intent) -> RerankedCandidate {
    RerankedCandidate {
        candidate: scored(0, doc_id, &format!("text of {doc_id}"), rerank_score),
        rerank_score,
        base_similarity: rerank_score,
        importance: 1.0,
        query_type: intent,
    }
}

/// Embedder returning canned vectors; unknown texts map to `fallback`.
pub struct FixedEmbedder {
    pub vectors: HashMap<String, Vec<f32>>,
    pub fallback: Vec<f32>,
    pub calls: AtomicUsize,
}

impl FixedEmbedder {
    pub fn new(entries: &[(&str, &[f32])], fallback: &[f32]) -> Self {
        Self {
            vectors: entries
                .iter()
                .map(|(text, vector)| ((*text).to_string(), vector.to_vec()))
                .collect(),
            fallback: fallback.to_vec(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Embedder for FixedEmbedder {
    fn model_id(&self) -> &str {
        "fixed"
    }

    fn dimension(&self) -> usize {
        self.fallback.len()
    }

    async fn embed_batch(&self, texts: &[&str]) -> VectorResult<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Ok(texts
            .iter()
            .map(|text| {
                self.vectors
                    .get(*text)
                    .cloned()
                    .unwrap_or_else(|| self.fallback.clone())
            })
            .collect())
    }
}

/// Judge returning a constant score, or failing on every call.
pub struct ConstJudge {
    pub score: Option<f32>,
    pub calls: AtomicUsize,
}

impl ConstJudge {
    pub fn new(score: f32) -> Self {
        Self {
            score: Some(score),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            score: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Judge for ConstJudge {
    fn model_id(&self) -> &str {
        "const"
    }

    async fn predict(&self, pairs: &[(&str, &str)]) -> VectorResult<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        match self.score {
            Some(score) => Ok(vec![score; pairs.len()]),
            None => Err(VectorStoreError::JudgeError("judge offline".to_string())),
        }
    }
}

use crate::error::Result;
use crate::types::ScoredCandidate;
use reelqa_corpus::{Chunk, MetadataStore};
use reelqa_vector_store::{normalize, VectorIndex, NO_RESULT_ID};
use std::collections::HashMap;

/// Joins index hits against both metadata surfaces.
pub struct RetrievalGateway<'a> {
    index: &'a dyn VectorIndex,
    store: &'a dyn MetadataStore,
}

impl<'a> RetrievalGateway<'a> {
    #[must_use]
    pub fn new(index: &'a dyn VectorIndex, store: &'a dyn MetadataStore) -> Self {
        Self { index, store }
    }

    /// Top-`k` candidates in index score order. Hits that cannot be joined, or whose
    /// document has an empty character span, are dropped.
    pub fn retrieve(&self, embedding: &[f32], k: usize) -> Result<Vec<ScoredCandidate>> {
        if k == 0 {
            return Ok(vec![]);
        }
        let mut query = embedding.to_vec();
        normalize(&mut query);

        let hits: Vec<(i64, f32)> = self
            .index
            .search(&query, k)?
            .into_iter()
            .filter(|(id, _)| *id != NO_RESULT_ID)
            .collect();
        if hits.is_empty() {
            return Ok(vec![]);
        }

        let vector_ids: Vec<i64> = hits.iter().map(|(id, _)| *id).collect();
        let refs: HashMap<i64, _> = self
            .store
            .fetch_by_vector_ids(&vector_ids)?
            .into_iter()
            .map(|r| (r.vector_id, r))
            .collect();

        let mut doc_ids: Vec<String> = refs.values().map(|r| r.doc_id.clone()).collect();
        doc_ids.sort();
        doc_ids.dedup();
        let documents: HashMap<String, _> = self
            .store
            .fetch_documents(&doc_ids)?
            .into_iter()
            .map(|d| (d.doc_id.clone(), d))
            .collect();

        let mut candidates = Vec::with_capacity(hits.len());
        for (vector_id, score) in hits {
            let Some(chunk_ref) = refs.get(&vector_id) else {
                log::debug!("Dropping vector {vector_id}: no chunk row");
                continue;
            };
            let Some(record) = documents.get(&chunk_ref.doc_id) else {
                log::debug!(
                    "Dropping vector {vector_id}: document {} not found",
                    chunk_ref.doc_id
                );
                continue;
            };
            let chunk = Chunk::from_parts(chunk_ref, record);
            if !chunk.is_valid() {
                log::debug!("Dropping vector {vector_id}: invalid offsets");
                continue;
            }
            candidates.push(ScoredCandidate {
                chunk,
                vector_score: score,
            });
        }

        log::debug!("Retrieved {} of {k} requested candidates", candidates.len());
        Ok(candidates)
    }
}

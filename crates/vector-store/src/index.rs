use crate::embeddings::normalize;
use crate::error::{Result, VectorStoreError};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Vector id reported for an index slot that holds no result.
pub const NO_RESULT_ID: i64 = -1;

/// Nearest-neighbour search over L2-normalized vectors.
pub trait VectorIndex: Send + Sync {
    fn dimension(&self) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Exactly `k` `(vector_id, score)` slots, best first; slots past the
    /// number of stored vectors carry [`NO_RESULT_ID`].
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(i64, f32)>>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexedVector {
    pub vector_id: i64,
    pub vector: Vec<f32>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct IndexSnapshot {
    dimension: usize,
    #[serde(default)]
    vectors: Vec<IndexedVector>,
}

/// Brute-force inner-product index. Vectors are normalized on insert, so scores are cosines.
#[derive(Debug)]
pub struct FlatIndex {
    dimension: usize,
    vectors: Vec<IndexedVector>,
    ids: HashSet<i64>,
    path: Option<PathBuf>,
}

impl FlatIndex {
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: Vec::new(),
            ids: HashSet::new(),
            path: None,
        }
    }

    pub fn add(&mut self, vector_id: i64, vector: &[f32]) -> Result<()> {
        if vector_id < 0 {
            return Err(VectorStoreError::IndexError(format!(
                "Vector id {vector_id} is reserved"
            )));
        }
        self.check_dimension(vector)?;
        if !self.ids.insert(vector_id) {
            return Err(VectorStoreError::IndexError(format!(
                "Duplicate vector id {vector_id}"
            )));
        }
        let mut vector = vector.to_vec();
        normalize(&mut vector);
        self.vectors.push(IndexedVector { vector_id, vector });
        Ok(())
    }

    const fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(VectorStoreError::InvalidDimension {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    /// Load index from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        log::info!("Loading vector index from {:?}", path.as_ref());
        let data = std::fs::read_to_string(&path)?;
        let snapshot: IndexSnapshot = serde_json::from_str(&data)?;

        let mut index = Self::new(snapshot.dimension);
        for entry in snapshot.vectors {
            index.add(entry.vector_id, &entry.vector)?;
        }
        index.path = Some(path.as_ref().to_path_buf());
        log::info!(
            "Loaded {} vectors (dim {})",
            index.vectors.len(),
            index.dimension
        );
        Ok(index)
    }

    /// Save index to disk
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let snapshot = IndexSnapshot {
            dimension: self.dimension,
            vectors: self.vectors.clone(),
        };
        std::fs::write(&path, serde_json::to_string(&snapshot)?)?;
        log::info!("Vector index saved to {:?}", path.as_ref());
        Ok(())
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl VectorIndex for FlatIndex {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn len(&self) -> usize {
        self.vectors.len()
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(i64, f32)>> {
        self.check_dimension(query)?;

        let mut scores: Vec<(i64, f32)> = self
            .vectors
            .iter()
            .map(|entry| {
                let score: f32 = query.iter().zip(&entry.vector).map(|(a, b)| a * b).sum();
                (entry.vector_id, score)
            })
            .collect();

        scores.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scores.truncate(k);
        scores.resize(k, (NO_RESULT_ID, f32::MIN));

        Ok(scores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn sample() -> FlatIndex {
        let mut index = FlatIndex::new(3);
        index.add(0, &[1.0, 0.0, 0.0]).unwrap();
        index.add(1, &[0.9, 0.1, 0.0]).unwrap();
        index.add(2, &[0.0, 1.0, 0.0]).unwrap();
        index
    }

    #[test]
    fn test_add_and_search() {
        let index = sample();
        assert_eq!(index.len(), 3);

        let results = index.search(&[1.0, 0.0, 0.0], 2).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, 0);
        assert!((results[0].1 - 1.0).abs() < 1e-6);
        assert_eq!(results[1].0, 1);
        assert!(results[1].1 > 0.9);
    }

    #[test]
    fn pads_with_no_result_ids() {
        let results = sample().search(&[0.0, 1.0, 0.0], 5).unwrap();
        let ids: Vec<i64> = results.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![2, 1, 0, NO_RESULT_ID, NO_RESULT_ID]);
    }

    #[test]
    fn test_dimension_mismatch() {
        let mut index = FlatIndex::new(3);
        assert!(index.add(0, &[1.0, 0.0]).is_err());

        index.add(0, &[1.0, 0.0, 0.0]).unwrap();
        assert!(index.search(&[1.0, 0.0], 1).is_err());
        assert!(index.add(0, &[0.0, 1.0, 0.0]).is_err());
        assert!(index.add(NO_RESULT_ID, &[0.0, 1.0, 0.0]).is_err());
    }

    #[test]
    fn save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("index.json");
        sample().save(&path).unwrap();

        let loaded = FlatIndex::load(&path).unwrap();
        assert_eq!(loaded.dimension(), 3);
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded.path(), Some(path.as_path()));
        assert_eq!(
            loaded.search(&[0.0, 1.0, 0.0], 1).unwrap()[0].0,
            2
        );
    }
}

use crate::error::{Result, VectorStoreError};
use crate::models::{model_dir, InferenceMode, ModelKind, ModelSpec};
use crate::onnx::OnnxSession;
use async_trait::async_trait;
use ndarray::{ArrayD, Axis, Ix2, Ix3};
use std::path::Path;
use std::sync::Arc;
use tokio::task::spawn_blocking;

/// Text → dense vector encoder.
///
/// Implementations are deterministic for a given input and model version.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn model_id(&self) -> &str;

    fn dimension(&self) -> usize;

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut embeddings = self.embed_batch(&[text]).await?;
        embeddings
            .pop()
            .ok_or_else(|| VectorStoreError::EmbeddingError("Empty embedding result".to_string()))
    }
}

/// Sentence embedding model running on ONNX Runtime, or a hash-based stub
pub struct EmbeddingModel {
    spec: ModelSpec,
    backend: EmbeddingBackend,
}

enum EmbeddingBackend {
    Ort(Arc<OnnxSession>),
    Stub,
}

impl EmbeddingModel {
    /// Build from `REELQA_EMBEDDING_MODE`, `REELQA_EMBEDDING_MODEL` and `REELQA_MODEL_DIR`.
    pub fn from_env() -> Result<Self> {
        let mode = InferenceMode::from_env(ModelKind::Embedding)?;
        let spec = ModelSpec::from_env(ModelKind::Embedding)?;
        Self::load(mode, spec, &model_dir())
    }

    pub fn load(mode: InferenceMode, spec: ModelSpec, model_dir: &Path) -> Result<Self> {
        let backend = match mode {
            InferenceMode::Stub => EmbeddingBackend::Stub,
            InferenceMode::Fast => {
                EmbeddingBackend::Ort(Arc::new(OnnxSession::load(&spec, model_dir)?))
            }
        };
        Ok(Self { spec, backend })
    }

    /// Deterministic stub of the given width; never touches the filesystem.
    #[must_use]
    pub fn stub(dimension: usize) -> Self {
        Self {
            spec: ModelSpec {
                id: "stub".to_string(),
                kind: ModelKind::Embedding,
                dimension,
                max_length: usize::MAX,
                max_batch: usize::MAX,
            },
            backend: EmbeddingBackend::Stub,
        }
    }

    #[must_use]
    pub const fn is_stub(&self) -> bool {
        matches!(self.backend, EmbeddingBackend::Stub)
    }
}

#[async_trait]
impl Embedder for EmbeddingModel {
    fn model_id(&self) -> &str {
        &self.spec.id
    }

    fn dimension(&self) -> usize {
        self.spec.dimension
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let owned: Vec<String> = texts.iter().map(ToString::to_string).collect();
        match &self.backend {
            EmbeddingBackend::Stub => Ok(owned
                .iter()
                .map(|text| stub_embed(text, self.spec.dimension))
                .collect()),
            EmbeddingBackend::Ort(session) => {
                let session = session.clone();
                let dimension = self.spec.dimension;
                spawn_blocking(move || embed_blocking(&session, &owned, dimension))
                    .await
                    .map_err(|e| VectorStoreError::EmbeddingError(format!("Join error: {e}")))?
            }
        }
    }
}

fn embed_blocking(
    session: &OnnxSession,
    texts: &[String],
    dimension: usize,
) -> Result<Vec<Vec<f32>>> {
    let mut results = Vec::with_capacity(texts.len());
    for batch in texts.chunks(session.max_batch.max(1)) {
        if let Some(output) = session.run(batch.to_vec())? {
            results.extend(embeddings_from_output(
                output.array,
                &output.mask_rows,
                dimension,
            )?);
        }
    }
    Ok(results)
}

const fn ensure_dimension(vec: &[f32], expected: usize) -> Result<()> {
    if vec.len() != expected {
        return Err(VectorStoreError::InvalidDimension {
            expected,
            actual: vec.len(),
        });
    }
    Ok(())
}

fn embeddings_from_output(
    array: ArrayD<f32>,
    mask_rows: &[Vec<i64>],
    expected_dimension: usize,
) -> Result<Vec<Vec<f32>>> {
    let mut out = Vec::new();
    match array.ndim() {
        2 => {
            let embeddings = array
                .into_dimensionality::<Ix2>()
                .map_err(|e| VectorStoreError::EmbeddingError(format!("Bad output shape: {e}")))?;
            for row in embeddings.outer_iter() {
                let mut emb = row.to_vec();
                ensure_dimension(&emb, expected_dimension)?;
                normalize(&mut emb);
                out.push(emb);
            }
        }
        3 => {
            let hidden = array
                .into_dimensionality::<Ix3>()
                .map_err(|e| VectorStoreError::EmbeddingError(format!("Bad output shape: {e}")))?;
            for (idx, sample) in hidden.outer_iter().enumerate() {
                let attn = mask_rows
                    .get(idx)
                    .cloned()
                    .unwrap_or_else(|| vec![1; sample.len_of(Axis(0))]);
                let mut emb = mean_pool(sample.view(), &attn);
                ensure_dimension(&emb, expected_dimension)?;
                normalize(&mut emb);
                out.push(emb);
            }
        }
        _ => {
            return Err(VectorStoreError::EmbeddingError(format!(
                "Unexpected ONNX output dims: {:?}",
                array.shape()
            )));
        }
    }
    Ok(out)
}

fn mean_pool(sample: ndarray::ArrayView2<'_, f32>, mask: &[i64]) -> Vec<f32> {
    if sample.is_empty() {
        return vec![];
    }

    let hidden = sample.len_of(Axis(1));
    let mut sum = vec![0.0f32; hidden];
    let mut count = 0.0f32;

    for (token_idx, token) in sample.outer_iter().enumerate() {
        if *mask.get(token_idx).unwrap_or(&0) == 0 {
            continue;
        }
        count += 1.0;
        for (dim, value) in token.iter().enumerate() {
            sum[dim] += value;
        }
    }

    if count > 0.0 {
        for value in &mut sum {
            *value /= count;
        }
    }
    sum
}

/// Scale `vec` to unit L2 norm in place; zero vectors are left untouched.
pub fn normalize(vec: &mut [f32]) {
    let norm = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 || !norm.is_finite() {
        return;
    }
    for value in vec {
        *value /= norm;
    }
}

/// Cosine similarity; `0.0` on length mismatch or a zero vector.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

fn stub_embed(text: &str, dimension: usize) -> Vec<f32> {
    let mut state =
        fnv1a_64(text.as_bytes()) ^ (dimension as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    let mut vec = Vec::with_capacity(dimension);
    for _ in 0..dimension {
        let bits = splitmix64(&mut state);
        let high = (bits >> 32) as u32;
        let mantissa = high >> 9;
        let unit = f32::from_bits(0x3f80_0000 | mantissa) - 1.0;
        vec.push(unit.mul_add(2.0, -1.0));
    }
    normalize(&mut vec);
    vec
}

fn fnv1a_64(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

const fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array;

    #[tokio::test]
    async fn stub_is_deterministic_and_normalized() {
        let model = EmbeddingModel::stub(384);
        let a = model.embed("who directed heat").await.unwrap();
        let b = model.embed("who directed heat").await.unwrap();
        let c = model.embed("who directed alien").await.unwrap();

        assert_eq!(a.len(), 384);
        assert_eq!(a, b);
        assert_ne!(a, c);
        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn empty_batch_is_empty() {
        let model = EmbeddingModel::stub(8);
        assert!(model.embed_batch(&[]).await.unwrap().is_empty());
    }

    #[test]
    fn cosine_handles_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 0.0], &[0.0, 2.0])).abs() < 1e-6);
    }

    #[test]
    fn mean_pool_respects_mask() {
        let sample = Array::from_shape_vec((3, 2), vec![1.0, 2.0, 3.0, 4.0, 100.0, 100.0]).unwrap();
        let pooled = mean_pool(sample.view(), &[1, 1, 0]);
        assert_eq!(pooled, vec![2.0, 3.0]);
    }

    #[test]
    fn output_dimension_is_checked() {
        let array = Array::from_shape_vec((1, 3), vec![1.0, 0.0, 0.0])
            .unwrap()
            .into_dyn();
        assert!(matches!(
            embeddings_from_output(array, &[], 4),
            Err(VectorStoreError::InvalidDimension { expected: 4, actual: 3 })
        ));
    }

    #[tokio::test]
    #[ignore = "requires ONNX model files under REELQA_MODEL_DIR"]
    async fn onnx_embedder_loads() {
        let model = EmbeddingModel::load(
            InferenceMode::Fast,
            ModelSpec::lookup(ModelKind::Embedding, "all-minilm-l6-v2").unwrap(),
            &model_dir(),
        )
        .unwrap();
        let embedding = model.embed("The Shawshank Redemption").await.unwrap();
        assert_eq!(embedding.len(), 384);
    }
}

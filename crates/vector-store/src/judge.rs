use crate::error::{Result, VectorStoreError};
use crate::models::{model_dir, InferenceMode, ModelKind, ModelSpec};
use crate::onnx::OnnxSession;
use async_trait::async_trait;
use ndarray::{ArrayD, Ix1, Ix2};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tokio::task::spawn_blocking;

/// Pairwise entailment scorer: higher means `text_a` is better supported by `text_b`.
#[async_trait]
pub trait Judge: Send + Sync {
    fn model_id(&self) -> &str;

    /// One score per `(text_a, text_b)` pair, in input order.
    async fn predict(&self, pairs: &[(&str, &str)]) -> Result<Vec<f32>>;
}

/// Cross-encoder judge. The ONNX backend applies a sigmoid to the single output logit;
/// the stub scores lexical coverage of `text_a` by `text_b`.
pub struct CrossEncoderJudge {
    spec: ModelSpec,
    backend: JudgeBackend,
}

enum JudgeBackend {
    Ort(Arc<OnnxSession>),
    Stub,
}

impl CrossEncoderJudge {
    /// Build from `REELQA_JUDGE_MODE`, `REELQA_JUDGE_MODEL` and `REELQA_MODEL_DIR`.
    pub fn from_env() -> Result<Self> {
        let mode = InferenceMode::from_env(ModelKind::Judge)?;
        let spec = ModelSpec::from_env(ModelKind::Judge)?;
        Self::load(mode, spec, &model_dir())
    }

    pub fn load(mode: InferenceMode, spec: ModelSpec, model_dir: &Path) -> Result<Self> {
        let backend = match mode {
            InferenceMode::Stub => JudgeBackend::Stub,
            InferenceMode::Fast => JudgeBackend::Ort(Arc::new(OnnxSession::load(&spec, model_dir)?)),
        };
        Ok(Self { spec, backend })
    }

    #[must_use]
    pub fn stub() -> Self {
        Self {
            spec: ModelSpec {
                id: "stub".to_string(),
                kind: ModelKind::Judge,
                dimension: 0,
                max_length: usize::MAX,
                max_batch: usize::MAX,
            },
            backend: JudgeBackend::Stub,
        }
    }
}

#[async_trait]
impl Judge for CrossEncoderJudge {
    fn model_id(&self) -> &str {
        &self.spec.id
    }

    async fn predict(&self, pairs: &[(&str, &str)]) -> Result<Vec<f32>> {
        if pairs.is_empty() {
            return Ok(vec![]);
        }
        match &self.backend {
            JudgeBackend::Stub => Ok(pairs.iter().map(|(a, b)| lexical_support(a, b)).collect()),
            JudgeBackend::Ort(session) => {
                let session = session.clone();
                let owned: Vec<(String, String)> = pairs
                    .iter()
                    .map(|(a, b)| ((*a).to_string(), (*b).to_string()))
                    .collect();
                spawn_blocking(move || predict_blocking(&session, &owned))
                    .await
                    .map_err(|e| VectorStoreError::JudgeError(format!("Join error: {e}")))?
            }
        }
    }
}

fn predict_blocking(session: &OnnxSession, pairs: &[(String, String)]) -> Result<Vec<f32>> {
    let mut scores = Vec::with_capacity(pairs.len());
    for batch in pairs.chunks(session.max_batch.max(1)) {
        if let Some(output) = session.run(batch.to_vec())? {
            scores.extend(logits_to_scores(output.array)?);
        }
    }
    if scores.len() != pairs.len() {
        return Err(VectorStoreError::JudgeError(format!(
            "Expected {} scores, got {}",
            pairs.len(),
            scores.len()
        )));
    }
    Ok(scores)
}

fn logits_to_scores(array: ArrayD<f32>) -> Result<Vec<f32>> {
    let logits: Vec<f32> = match array.ndim() {
        1 => array
            .into_dimensionality::<Ix1>()
            .map_err(|e| VectorStoreError::JudgeError(format!("Bad output shape: {e}")))?
            .to_vec(),
        2 if array.shape()[1] == 1 => array
            .into_dimensionality::<Ix2>()
            .map_err(|e| VectorStoreError::JudgeError(format!("Bad output shape: {e}")))?
            .column(0)
            .to_vec(),
        _ => {
            return Err(VectorStoreError::JudgeError(format!(
                "Expected one logit per pair, got output dims {:?}",
                array.shape()
            )));
        }
    };
    Ok(logits.into_iter().map(sigmoid).collect())
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

fn content_tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 3)
        .map(str::to_lowercase)
}

/// Share of `text_a`'s content words that also occur in `text_b`.
fn lexical_support(text_a: &str, text_b: &str) -> f32 {
    let vocabulary: HashSet<String> = content_tokens(text_b).collect();
    let (total, hits) = content_tokens(text_a).fold((0usize, 0usize), |(total, hits), token| {
        (total + 1, hits + usize::from(vocabulary.contains(&token)))
    });
    if total == 0 {
        return 0.0;
    }
    hits as f32 / total as f32
}

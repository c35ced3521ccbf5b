use crate::error::{Result, VectorStoreError};
use std::env;
use std::fmt::Display;
use std::path::{Path, PathBuf};

pub const DEFAULT_EMBEDDING_MODEL: &str = "all-minilm-l6-v2";
pub const DEFAULT_JUDGE_MODEL: &str = "ms-marco-minilm-l6-v2";

const MODEL_DIR_ENV: &str = "REELQA_MODEL_DIR";
const CACHE_DIR_NAME: &str = "reelqa";

/// Which of the two ONNX model families a session serves.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ModelKind {
    Embedding,
    Judge,
}

impl ModelKind {
    const fn mode_env(self) -> &'static str {
        match self {
            Self::Embedding => "REELQA_EMBEDDING_MODE",
            Self::Judge => "REELQA_JUDGE_MODE",
        }
    }

    const fn model_env(self) -> &'static str {
        match self {
            Self::Embedding => "REELQA_EMBEDDING_MODEL",
            Self::Judge => "REELQA_JUDGE_MODEL",
        }
    }

    pub(crate) fn error(self, message: impl Into<String>) -> VectorStoreError {
        match self {
            Self::Embedding => VectorStoreError::EmbeddingError(message.into()),
            Self::Judge => VectorStoreError::JudgeError(message.into()),
        }
    }
}

/// Inference backend selection: real ONNX sessions or deterministic stubs.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InferenceMode {
    Fast,
    Stub,
}

impl InferenceMode {
    pub fn from_env(kind: ModelKind) -> Result<Self> {
        let var = kind.mode_env();
        let raw = env::var(var)
            .unwrap_or_else(|_| "fast".to_string())
            .to_ascii_lowercase();
        Self::parse(&raw).ok_or_else(|| {
            kind.error(format!(
                "Unsupported {var} '{raw}' (expected 'fast' or 'stub')"
            ))
        })
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "fast" => Some(Self::Fast),
            "stub" => Some(Self::Stub),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fast => "fast",
            Self::Stub => "stub",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelSpec {
    pub id: String,
    pub kind: ModelKind,
    /// Embedding width; zero for judges, which emit one logit per pair
    pub dimension: usize,
    pub max_length: usize,
    pub max_batch: usize,
}

impl ModelSpec {
    /// Look up a known model by (case/underscore-insensitive) id.
    pub fn lookup(kind: ModelKind, raw: &str) -> Result<Self> {
        let id = normalize_id(raw);
        let (dimension, max_length, max_batch) = match (kind, id.as_str()) {
            (ModelKind::Embedding, "all-minilm-l6-v2") => (384, 256, 32),
            (ModelKind::Embedding, "bge-small") => (384, 512, 32),
            (ModelKind::Judge, "ms-marco-minilm-l6-v2") => (0, 512, 16),
            (ModelKind::Judge, "ms-marco-minilm-l12-v2") => (0, 512, 8),
            _ => return Err(VectorStoreError::UnknownModel(raw.to_string())),
        };
        Ok(Self {
            id,
            kind,
            dimension,
            max_length,
            max_batch,
        })
    }

    /// Model id from `REELQA_EMBEDDING_MODEL` / `REELQA_JUDGE_MODEL`, else the default.
    pub fn from_env(kind: ModelKind) -> Result<Self> {
        let default = match kind {
            ModelKind::Embedding => DEFAULT_EMBEDDING_MODEL,
            ModelKind::Judge => DEFAULT_JUDGE_MODEL,
        };
        let raw = env::var(kind.model_env()).unwrap_or_else(|_| default.to_string());
        Self::lookup(kind, &raw)
    }

    #[must_use]
    pub fn assets_in(&self, model_dir: &Path) -> ModelAssets {
        let dir = model_dir.join(&self.id);
        ModelAssets {
            model_path: dir.join("model.onnx"),
            tokenizer_path: dir.join("tokenizer.json"),
        }
    }
}

impl Display for ModelSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.id)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelAssets {
    pub model_path: PathBuf,
    pub tokenizer_path: PathBuf,
}

fn normalize_id(raw: &str) -> String {
    raw.trim().to_ascii_lowercase().replace('_', "-")
}

/// Resolve the directory holding `<model-id>/model.onnx` folders.
pub fn model_dir() -> PathBuf {
    if let Ok(path) = env::var(MODEL_DIR_ENV) {
        return PathBuf::from(path);
    }

    // A `models/` folder next to the executable or any of its parents wins over the cache.
    if let Ok(exe) = env::current_exe() {
        if let Some(found) = exe.parent().and_then(find_models_upwards) {
            return found;
        }
    }
    if let Ok(cwd) = env::current_dir() {
        if let Some(found) = find_models_upwards(&cwd) {
            return found;
        }
    }

    let base = env::var("XDG_CACHE_HOME").map_or_else(
        |_| {
            env::var("HOME")
                .map_or_else(|_| PathBuf::from("."), PathBuf::from)
                .join(".cache")
        },
        PathBuf::from,
    );
    base.join(CACHE_DIR_NAME).join("models")
}

fn find_models_upwards(start: &Path) -> Option<PathBuf> {
    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join("models");
        if candidate.is_dir() {
            return Some(candidate);
        }
        if !dir.pop() {
            return None;
        }
    }
}

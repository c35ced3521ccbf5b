//! # ReelQA Vector Store
//!
//! Model-backed collaborators for the retrieval pipeline.
//!
//! ## Features
//!
//! - **Sentence embeddings** on ONNX Runtime (`all-minilm-l6-v2`, 384 dims)
//! - **Cross-encoder judge** scoring `(answer, context)` entailment
//! - **Flat inner-product index** persisted as JSON
//! - **Stub backends** (`REELQA_EMBEDDING_MODE=stub`, `REELQA_JUDGE_MODE=stub`) for tests
//!   and model-less environments
//!
//! ## Architecture
//!
//! ```text
//! query text
//!     │
//!     ├──> Embedder (ORT | stub)
//!     │      └─> Vector[384], L2-normalized
//!     │
//!     └──> VectorIndex::search(vector, k)
//!            └─> [(vector_id, score); k]   (-1 pads missing slots)
//!
//! (answer, context) ──> Judge::predict ──> sigmoid(logit) ∈ [0, 1]
//! ```

mod embeddings;
mod error;
mod index;
mod judge;
mod models;
mod onnx;

pub use embeddings::{cosine_similarity, normalize, Embedder, EmbeddingModel};
pub use error::{Result, VectorStoreError};
pub use index::{FlatIndex, IndexedVector, VectorIndex, NO_RESULT_ID};
pub use judge::{CrossEncoderJudge, Judge};
pub use models::{
    model_dir, InferenceMode, ModelAssets, ModelKind, ModelSpec, DEFAULT_EMBEDDING_MODEL,
    DEFAULT_JUDGE_MODEL,
};

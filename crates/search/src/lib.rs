//! # ReelQA Search
//!
//! The question-answering core: intent classification, query rewriting, vector
//! retrieval, section filtering, reranking, score fusion, adaptive evidence selection,
//! grounding and confidence.
//!
//! ```text
//! query ─> IntentClassifier ─> QueryRewriter
//!   │                              │
//!   └─> embed ─> RetrievalGateway ─┴─> SectionFilter ─> Reranker ─┬─> ScoreFusion (diagnostic)
//!                                                                 └─> EvidenceSelector
//!                                                                        │
//!                    Generator <─ build_prompt <──────────────────────────┘
//!                        │
//!                        └─> GroundingScorer ─> compute_confidence
//! ```

mod citations;
mod confidence;
mod error;
mod eval;
mod fusion;
mod generation;
mod grounding;
mod intent;
mod pipeline;
mod profile;
mod rerank;
mod retrieval;
mod rewrite;
mod section_filter;
mod selection;
mod service;
#[cfg(test)]
mod test_support;
mod types;

pub use citations::build_citations;
pub use confidence::{compute_confidence, EvidenceStrength, ScoreHint};
pub use error::{Result, SearchError};
pub use eval::{
    exact_match, precision_at_k, precision_threshold, recall_at_k, CaseReport, EvalCase,
    EvalSummary, ExactMatch, DEFAULT_EVAL_K, EXACT_MATCH_THRESHOLD, PRECISION_THRESHOLD,
};
pub use fusion::{min_max_normalize, ScoreFusion};
pub use generation::{
    build_prompt, movie_of, postprocess_answer, GenerationOptions, Generator, UNKNOWN_MOVIE,
};
pub use grounding::{is_abstention, GroundingScorer, ABSTENTION_ANSWER};
pub use intent::{Intent, IntentClassifier, IntentTable};
pub use pipeline::{AnswerOutcome, Assessment, Pipeline, RetrievalTrace};
pub use profile::{
    FusionConfig, GenerationConfig, GroundingConfig, PipelineProfile, RerankConfig,
    RetrievalConfig, SelectionConfig,
};
pub use rerank::Reranker;
pub use retrieval::RetrievalGateway;
pub use rewrite::QueryRewriter;
pub use section_filter::{SectionFilter, SectionSet};
pub use selection::{select_evidence, EvidenceSelector};
pub use service::{ServiceContext, ServiceContextBuilder};
pub use types::{FusedCandidate, GroundingResult, RerankedCandidate, ScoredCandidate};

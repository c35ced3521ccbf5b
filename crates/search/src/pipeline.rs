use crate::citations::build_citations;
use crate::confidence::compute_confidence;
use crate::error::{Result, SearchError};
use crate::eval::{
    exact_match, precision_at_k, recall_at_k, CaseReport, EvalCase, DEFAULT_EVAL_K,
    EXACT_MATCH_THRESHOLD, PRECISION_THRESHOLD,
};
use crate::fusion::ScoreFusion;
use crate::generation::{build_prompt, movie_of, postprocess_answer, GenerationOptions, Generator};
use crate::grounding::{is_abstention, GroundingScorer, ABSTENTION_ANSWER};
use crate::intent::{Intent, IntentClassifier};
use crate::retrieval::RetrievalGateway;
use crate::rerank::Reranker;
use crate::rewrite::QueryRewriter;
use crate::section_filter::SectionFilter;
use crate::selection::EvidenceSelector;
use crate::service::ServiceContext;
use crate::types::{FusedCandidate, GroundingResult, RerankedCandidate, ScoredCandidate};
use reelqa_protocol::QueryResponse;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Every intermediate stage of one retrieval, for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalTrace {
    pub query: String,
    pub intent: Intent,
    pub rewritten_query: String,
    pub candidates: Vec<ScoredCandidate>,
    pub filtered: Vec<ScoredCandidate>,
    pub reranked: Vec<RerankedCandidate>,
    pub fused: Vec<FusedCandidate>,
    pub evidence: Vec<RerankedCandidate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerOutcome {
    pub answer: String,
    pub intent: Intent,
    pub movie: String,
    pub evidence: Vec<RerankedCandidate>,
    pub grounding: GroundingResult,
    pub confidence: f32,
    pub latency_ms: f64,
}

impl AnswerOutcome {
    #[must_use]
    pub fn to_response(&self) -> QueryResponse {
        QueryResponse {
            answer: self.answer.clone(),
            sources: if is_abstention(&self.answer) {
                Vec::new()
            } else {
                build_citations(&self.evidence)
            },
            hallucination_score: self.grounding.score,
            latency_ms: self.latency_ms,
            confidence: self.confidence,
            is_hallucinated: self.grounding.is_hallucinated,
            intent: Some(self.intent.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub grounding: GroundingResult,
    pub confidence: f32,
}

/// The question-answering pipeline over a shared [`ServiceContext`].
#[derive(Debug, Clone, Copy)]
pub struct Pipeline<'a> {
    context: &'a ServiceContext,
}

struct Drafted {
    answer: String,
    intent: Intent,
    movie: String,
    evidence: Vec<RerankedCandidate>,
    abstained: bool,
}

impl<'a> Pipeline<'a> {
    #[must_use]
    pub const fn new(context: &'a ServiceContext) -> Self {
        Self { context }
    }

    /// Classify, rewrite, retrieve, filter, rerank, fuse and select.
    ///
    /// Fails with [`SearchError::EmptyRetrieval`] when the index returns no resolvable
    /// candidate. Later stages never fail for lack of results.
    pub async fn retrieve(&self, query: &str) -> Result<RetrievalTrace> {
        let query = query.trim();
        if query.is_empty() {
            return Err(SearchError::EmptyQuery);
        }
        let profile = self.context.profile();

        let intent = IntentClassifier::classify(query);
        let rewritten_query = QueryRewriter::rewrite(query, intent);
        log::debug!("Query intent {intent}, rewritten to {rewritten_query:?}");

        let embedder = self.context.embedder()?;
        let index = self.context.index()?;
        let store = self.context.store()?;

        let filter = SectionFilter::new(&profile.sections);
        let k = profile.retrieval.candidate_count(filter.has_filter(intent));

        let embedding = embedder.embed(query).await?;
        let candidates = RetrievalGateway::new(index.as_ref(), store.as_ref()).retrieve(&embedding, k)?;
        if candidates.is_empty() {
            return Err(SearchError::EmptyRetrieval);
        }

        let filtered = filter.apply(candidates.clone(), intent);
        let reranked = Reranker::new(profile.rerank.intent_weights.clone())
            .rerank(
                embedder.as_ref(),
                &rewritten_query,
                filtered.clone(),
                intent,
                profile.rerank.top_k,
                profile.rerank.min_score,
            )
            .await?;
        let fused = ScoreFusion::new(profile.fusion.alpha).fuse(&reranked);
        let evidence = EvidenceSelector::new(
            profile.selection.base_k.clone(),
            profile.selection.max_k,
            profile.selection.score_drop_threshold,
        )
        .select(reranked.clone());

        log::debug!(
            "Retrieved {} candidates, {} after section filter, {} reranked, {} selected",
            candidates.len(),
            filtered.len(),
            reranked.len(),
            evidence.len()
        );

        Ok(RetrievalTrace {
            query: query.to_string(),
            intent,
            rewritten_query,
            candidates,
            filtered,
            reranked,
            fused,
            evidence,
        })
    }

    /// Answer `query` end to end.
    ///
    /// Retrieval through generation runs under the profile deadline; grounding and
    /// confidence are scored afterwards. When reranking leaves nothing the pipeline
    /// abstains without calling the generator. An abstaining answer is never judged
    /// and carries zero confidence.
    pub async fn process(&self, query: &str, generator: &dyn Generator) -> Result<AnswerOutcome> {
        let started = Instant::now();
        let deadline_ms = self.context.profile().generation.deadline_ms;

        let drafted = tokio::time::timeout(
            Duration::from_millis(deadline_ms),
            self.draft(query, generator),
        )
        .await
        .map_err(|_| SearchError::Timeout { deadline_ms })??;

        let assessment = if drafted.abstained || is_abstention(&drafted.answer) {
            Assessment {
                grounding: GroundingResult::grounded(),
                confidence: 0.0,
            }
        } else {
            self.assess(&drafted.answer, &drafted.evidence).await?
        };

        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
        log::info!(
            "Answered {:?} intent={} movie={:?} evidence={} grounding={:.3} confidence={:.3} in {latency_ms:.1} ms",
            query.trim(),
            drafted.intent,
            drafted.movie,
            drafted.evidence.len(),
            assessment.grounding.score,
            assessment.confidence
        );

        Ok(AnswerOutcome {
            answer: drafted.answer,
            intent: drafted.intent,
            movie: drafted.movie,
            evidence: drafted.evidence,
            grounding: assessment.grounding,
            confidence: assessment.confidence,
            latency_ms,
        })
    }

    async fn draft(&self, query: &str, generator: &dyn Generator) -> Result<Drafted> {
        let trace = self.retrieve(query).await?;
        if trace.reranked.is_empty() {
            log::debug!("Nothing survived reranking; abstaining");
            return Ok(Drafted {
                answer: ABSTENTION_ANSWER.to_string(),
                intent: trace.intent,
                movie: movie_of(&trace.reranked),
                evidence: Vec::new(),
                abstained: true,
            });
        }

        let movie = movie_of(&trace.reranked);
        let prompt = build_prompt(&trace.query, &trace.evidence, trace.intent, &movie);
        let generation = &self.context.profile().generation;
        let options = GenerationOptions {
            max_tokens: generation.max_tokens,
            temperature: generation.temperature,
        };
        let raw = generator
            .generate(&prompt, &options)
            .await
            .map_err(|err| SearchError::Generation(format!("{err:#}")))?;

        Ok(Drafted {
            answer: postprocess_answer(&raw),
            intent: trace.intent,
            movie,
            evidence: trace.evidence,
            abstained: false,
        })
    }

    /// Score an externally produced answer against `evidence`.
    pub async fn assess(&self, answer: &str, evidence: &[RerankedCandidate]) -> Result<Assessment> {
        let judge = self.context.judge()?;
        let grounding = self.context.profile().grounding;
        let grounding = GroundingScorer::new(grounding.threshold, grounding.context_max_chars)
            .score(answer, evidence, judge.as_ref())
            .await;
        Ok(Assessment {
            grounding,
            confidence: compute_confidence(evidence, grounding.score),
        })
    }

    /// Run one labelled case and score answer and evidence.
    pub async fn evaluate(&self, case: &EvalCase, generator: &dyn Generator) -> Result<CaseReport> {
        let outcome = self.process(&case.query, generator).await?;
        let judge = self.context.judge()?;

        let precision = precision_at_k(
            &case.query,
            &outcome.evidence,
            judge.as_ref(),
            DEFAULT_EVAL_K,
            PRECISION_THRESHOLD,
        )
        .await?;
        let recall = recall_at_k(&outcome.evidence, &case.relevant, DEFAULT_EVAL_K, 1);
        let exact = exact_match(
            &outcome.answer,
            &case.ground_truth,
            judge.as_ref(),
            EXACT_MATCH_THRESHOLD,
        )
        .await?;

        Ok(CaseReport {
            query: case.query.clone(),
            answer: outcome.answer,
            movie: outcome.movie,
            intent: outcome.intent,
            precision_at_k: precision,
            recall_at_k: recall,
            hallucination_score: outcome.grounding.score,
            is_hallucinated: outcome.grounding.is_hallucinated,
            exact_match: exact,
        })
    }
}

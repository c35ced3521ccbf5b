//! Offline answer and retrieval metrics.
//!
//! All metrics reuse the grounding [`Judge`] as a relevance model; none of them touch
//! the request path.

use crate::error::Result;
use crate::intent::Intent;
use crate::types::RerankedCandidate;
use reelqa_vector_store::Judge;
use serde::{Deserialize, Serialize};

pub const EXACT_MATCH_THRESHOLD: f32 = 0.8;
pub const DEFAULT_EVAL_K: usize = 5;
pub const PRECISION_THRESHOLD: f32 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExactMatch {
    pub score: f32,
    pub exact_match: bool,
}

/// Judge `generated` against `truth`; either side empty scores zero.
pub async fn exact_match(
    generated: &str,
    truth: &str,
    judge: &dyn Judge,
    threshold: f32,
) -> Result<ExactMatch> {
    if generated.trim().is_empty() || truth.trim().is_empty() {
        return Ok(ExactMatch {
            score: 0.0,
            exact_match: false,
        });
    }
    let score = judge
        .predict(&[(generated, truth)])
        .await?
        .first()
        .copied()
        .unwrap_or(0.0);
    Ok(ExactMatch {
        score,
        exact_match: score >= threshold,
    })
}

/// Relevance cut-off for precision, scaled by the intent of the first passage.
#[must_use]
pub fn precision_threshold(base: f32, intent: Intent) -> f32 {
    match intent {
        Intent::Ending | Intent::Explanation => base * 0.85,
        Intent::Fact | Intent::Director => base * 1.1,
        _ => base,
    }
}

/// Share of the first `k` passages the judge rates relevant to `query`.
pub async fn precision_at_k(
    query: &str,
    passages: &[RerankedCandidate],
    judge: &dyn Judge,
    k: usize,
    threshold: f32,
) -> Result<f32> {
    let top = &passages[..passages.len().min(k)];
    let Some(first) = top.first() else {
        return Ok(0.0);
    };

    let threshold = precision_threshold(threshold, first.query_type);
    let pairs: Vec<(&str, &str)> = top
        .iter()
        .map(|c| (query, c.chunk().text.as_str()))
        .collect();
    let scores = judge.predict(&pairs).await?;
    let relevant = scores.iter().filter(|s| **s >= threshold).count();

    #[allow(clippy::cast_precision_loss)]
    let precision = relevant as f32 / top.len() as f32;
    Ok(precision)
}

/// `1.0` when at least `min_matches` of the first `k` passages contain one of the
/// `relevant` phrases (case-insensitive), else `0.0`.
#[must_use]
pub fn recall_at_k(
    passages: &[RerankedCandidate],
    relevant: &[String],
    k: usize,
    min_matches: usize,
) -> f32 {
    if passages.is_empty() || relevant.is_empty() {
        return 0.0;
    }
    let relevant: Vec<String> = relevant.iter().map(|r| r.to_lowercase()).collect();
    let matches = passages
        .iter()
        .take(k)
        .filter(|c| {
            let text = c.chunk().text.to_lowercase();
            relevant.iter().any(|r| text.contains(r.as_str()))
        })
        .count();

    if matches >= min_matches.max(1) {
        1.0
    } else {
        0.0
    }
}

/// One labelled question of an evaluation file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EvalCase {
    pub query: String,
    #[serde(default, alias = "relevant_chunks")]
    pub relevant: Vec<String>,
    pub ground_truth: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseReport {
    pub query: String,
    pub answer: String,
    pub movie: String,
    pub intent: Intent,
    pub precision_at_k: f32,
    pub recall_at_k: f32,
    pub hallucination_score: f32,
    pub is_hallucinated: bool,
    pub exact_match: ExactMatch,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EvalSummary {
    pub cases: usize,
    pub mean_precision_at_k: f32,
    pub mean_recall_at_k: f32,
    pub mean_hallucination_score: f32,
    pub exact_match_rate: f32,
}

impl EvalSummary {
    #[must_use]
    pub fn from_reports(reports: &[CaseReport]) -> Self {
        if reports.is_empty() {
            return Self::default();
        }
        Self {
            cases: reports.len(),
            mean_precision_at_k: mean(reports, |r| r.precision_at_k),
            mean_recall_at_k: mean(reports, |r| r.recall_at_k),
            mean_hallucination_score: mean(reports, |r| r.hallucination_score),
            exact_match_rate: mean(reports, |r| {
                if r.exact_match.exact_match {
                    1.0
                } else {
                    0.0
                }
            }),
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn mean(reports: &[CaseReport], metric: impl Fn(&CaseReport) -> f32) -> f32 {
    reports.iter().map(metric).sum::<f32>() / reports.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{reranked, ConstJudge};
    use pretty_assertions::assert_eq;

    fn passage(doc_id: &str, text: &str, intent: Intent) -> RerankedCandidate {
        let mut c = reranked(doc_id, 0.7, intent);
        c.candidate.chunk.text = text.to_string();
        c
    }

    #[tokio::test]
    async fn exact_match_uses_threshold() {
        let judge = ConstJudge::new(0.85);
        let hit = exact_match("Christopher Nolan", "Christopher Nolan", &judge, EXACT_MATCH_THRESHOLD)
            .await
            .unwrap();
        assert!(hit.exact_match);

        let empty = exact_match("  ", "Christopher Nolan", &judge, EXACT_MATCH_THRESHOLD)
            .await
            .unwrap();
        assert_eq!(empty, ExactMatch { score: 0.0, exact_match: false });
        assert_eq!(judge.calls(), 1);
    }

    #[test]
    fn precision_threshold_depends_on_intent() {
        assert!((precision_threshold(0.6, Intent::Ending) - 0.51).abs() < 1e-6);
        assert!((precision_threshold(0.6, Intent::Director) - 0.66).abs() < 1e-6);
        assert!((precision_threshold(0.6, Intent::Plot) - 0.6).abs() < 1e-6);
    }

    #[tokio::test]
    async fn precision_counts_only_first_k() {
        let passages: Vec<_> = (0..7)
            .map(|i| passage(&format!("DOC_{i}"), "text", Intent::Ending))
            .collect();
        // 0.55 clears the relaxed ending threshold (0.51) but not the plain one.
        let judge = ConstJudge::new(0.55);
        let p = precision_at_k("q", &passages, &judge, 5, PRECISION_THRESHOLD)
            .await
            .unwrap();
        assert!((p - 1.0).abs() < f32::EPSILON);

        let strict: Vec<_> = passages
            .into_iter()
            .map(|mut c| {
                c.query_type = Intent::Fact;
                c
            })
            .collect();
        let p = precision_at_k("q", &strict, &judge, 5, PRECISION_THRESHOLD)
            .await
            .unwrap();
        assert!(p.abs() < f32::EPSILON);
        assert!(precision_at_k("q", &[], &judge, 5, 0.6).await.unwrap().abs() < f32::EPSILON);
    }

    #[test]
    fn recall_matches_case_insensitively_within_k() {
        let passages = vec![
            passage("DOC_1", "Andy crawls through the sewer pipe.", Intent::Ending),
            passage("DOC_2", "Red meets Andy in Zihuatanejo.", Intent::Ending),
        ];
        let relevant = vec!["ZIHUATANEJO".to_string()];

        assert!((recall_at_k(&passages, &relevant, 5, 1) - 1.0).abs() < f32::EPSILON);
        assert!(recall_at_k(&passages, &relevant, 1, 1).abs() < f32::EPSILON);
        assert!(recall_at_k(&passages, &relevant, 5, 2).abs() < f32::EPSILON);
        assert!(recall_at_k(&[], &relevant, 5, 1).abs() < f32::EPSILON);
        assert!(recall_at_k(&passages, &[], 5, 1).abs() < f32::EPSILON);
    }

    #[test]
    fn summary_averages_reports() {
        let report = |p: f32, em: bool| CaseReport {
            query: "q".to_string(),
            answer: "a".to_string(),
            movie: "Heat".to_string(),
            intent: Intent::Fact,
            precision_at_k: p,
            recall_at_k: 1.0,
            hallucination_score: 0.5,
            is_hallucinated: false,
            exact_match: ExactMatch { score: 0.9, exact_match: em },
        };
        let summary = EvalSummary::from_reports(&[report(1.0, true), report(0.5, false)]);
        assert_eq!(summary.cases, 2);
        assert!((summary.mean_precision_at_k - 0.75).abs() < 1e-6);
        assert!((summary.exact_match_rate - 0.5).abs() < 1e-6);
        assert_eq!(EvalSummary::from_reports(&[]), EvalSummary::default());
    }
}

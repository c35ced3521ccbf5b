use crate::intent::Intent;
use crate::types::{round_to, GroundingResult, RerankedCandidate};
use reelqa_vector_store::Judge;

/// Canonical abstention sentence produced when the context cannot answer a question.
pub const ABSTENTION_ANSWER: &str = "I don't know based on the given context.";

const ABSTENTION_PHRASES: [&str; 3] = [
    "i don't know.",
    "i don't know based on the given context.",
    "not enough information in the context.",
];

/// Case-insensitive membership in the abstention set, ignoring surrounding and
/// repeated inner whitespace.
#[must_use]
pub fn is_abstention(answer: &str) -> bool {
    let normalized = answer
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    ABSTENTION_PHRASES.contains(&normalized.as_str())
}

/// Entailment-based grounding check of an answer against its evidence.
#[derive(Debug, Clone, Copy)]
pub struct GroundingScorer {
    threshold: f32,
    context_max_chars: usize,
}

impl GroundingScorer {
    #[must_use]
    pub const fn new(threshold: f32, context_max_chars: usize) -> Self {
        Self {
            threshold,
            context_max_chars,
        }
    }

    /// Base threshold scaled for intents whose answers paraphrase heavily.
    #[must_use]
    pub fn effective_threshold(&self, intent: Intent) -> f32 {
        match intent {
            Intent::Ending | Intent::Explanation => self.threshold * 0.6,
            Intent::General => self.threshold * 0.9,
            _ => self.threshold,
        }
    }

    /// Never fails: judge errors degrade to an ungrounded result.
    pub async fn score(
        &self,
        answer: &str,
        evidence: &[RerankedCandidate],
        judge: &dyn Judge,
    ) -> GroundingResult {
        if answer.trim().is_empty() {
            return GroundingResult::ungrounded();
        }
        if is_abstention(answer) {
            return GroundingResult::grounded();
        }
        let Some(first) = evidence.first() else {
            return GroundingResult::ungrounded();
        };

        let context = self.build_context(evidence);
        let raw = match judge.predict(&[(answer, context.as_str())]).await {
            Ok(scores) => scores.first().copied().unwrap_or(0.0),
            Err(err) => {
                log::warn!("Grounding judge failed, scoring answer as ungrounded: {err}");
                return GroundingResult::ungrounded();
            }
        };

        let score = if raw.is_finite() {
            raw.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let threshold = self.effective_threshold(first.query_type);
        GroundingResult {
            score: round_to(score, 4),
            is_hallucinated: score < threshold,
        }
    }

    fn build_context(&self, evidence: &[RerankedCandidate]) -> String {
        let joined = evidence
            .iter()
            .map(|c| c.chunk().text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        match joined.char_indices().nth(self.context_max_chars) {
            Some((cut, _)) => joined[..cut].to_string(),
            None => joined,
        }
    }
}

impl Default for GroundingScorer {
    fn default() -> Self {
        Self::new(0.55, 4000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{reranked, ConstJudge};
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn empty_answer_is_hallucinated() {
        let judge = ConstJudge::new(0.9);
        let evidence = vec![reranked("D0", 0.9, Intent::Fact)];
        let result = GroundingScorer::default().score("   ", &evidence, &judge).await;
        assert_eq!(result, GroundingResult { score: 0.0, is_hallucinated: true });
        assert_eq!(judge.calls(), 0);
    }

    #[tokio::test]
    async fn abstention_is_grounded_regardless_of_judge() {
        let judge = ConstJudge::new(0.0);
        let evidence = vec![reranked("D0", 0.9, Intent::Fact)];
        for answer in [
            "I don't know based on the given context.",
            "  i DON'T   know.  ",
            "Not enough information in the context.",
        ] {
            let result = GroundingScorer::default().score(answer, &evidence, &judge).await;
            assert_eq!(result, GroundingResult { score: 1.0, is_hallucinated: false });
        }
        assert_eq!(judge.calls(), 0);
    }

    #[tokio::test]
    async fn empty_evidence_is_hallucinated() {
        let judge = ConstJudge::new(0.9);
        let result = GroundingScorer::default().score("Michael Mann", &[], &judge).await;
        assert_eq!(result, GroundingResult::ungrounded());
    }

    #[tokio::test]
    async fn ending_threshold_is_relaxed() {
        let judge = ConstJudge::new(0.5);
        let evidence = vec![reranked("D0", 0.9, Intent::Ending)];
        let scorer = GroundingScorer::new(0.55, 4000);
        assert!((scorer.effective_threshold(Intent::Ending) - 0.33).abs() < 1e-6);

        let result = scorer.score("Andy escapes.", &evidence, &judge).await;
        assert_eq!(result, GroundingResult { score: 0.5, is_hallucinated: false });

        let fact = vec![reranked("D0", 0.9, Intent::Fact)];
        let result = scorer.score("Andy escapes.", &fact, &judge).await;
        assert!(result.is_hallucinated);
    }

    #[tokio::test]
    async fn judge_output_is_clamped_and_rounded() {
        let evidence = vec![reranked("D0", 0.9, Intent::General)];
        let scorer = GroundingScorer::default();

        let high = scorer.score("x", &evidence, &ConstJudge::new(3.2)).await;
        assert_eq!(high.score, 1.0);

        let nan = scorer.score("x", &evidence, &ConstJudge::new(f32::NAN)).await;
        assert_eq!(nan, GroundingResult::ungrounded());

        let precise = scorer.score("x", &evidence, &ConstJudge::new(0.512_345)).await;
        assert_eq!(precise.score, 0.5123);
        assert!(!precise.is_hallucinated);
    }

    #[tokio::test]
    async fn judge_failure_degrades() {
        let evidence = vec![reranked("D0", 0.9, Intent::Fact)];
        let result = GroundingScorer::default()
            .score("Michael Mann", &evidence, &ConstJudge::failing())
            .await;
        assert_eq!(result, GroundingResult::ungrounded());
    }

    #[test]
    fn context_is_capped_on_char_boundary() {
        let scorer = GroundingScorer::new(0.55, 5);
        let mut evidence = vec![reranked("D0", 0.9, Intent::Fact)];
        evidence[0].candidate.chunk.text = "héllo wörld".to_string();
        assert_eq!(scorer.build_context(&evidence), "héllo");
    }
}

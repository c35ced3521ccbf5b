use crate::types::RerankedCandidate;
use reelqa_protocol::SourceDoc;

const SNIPPET_CHARS: usize = 200;

/// One [`SourceDoc`] per evidence passage, in evidence order.
#[must_use]
pub fn build_citations(evidence: &[RerankedCandidate]) -> Vec<SourceDoc> {
    evidence
        .iter()
        .map(|c| {
            let chunk = c.chunk();
            SourceDoc {
                id: chunk.chunk_id.clone(),
                title: chunk.title.clone(),
                source: chunk.source.clone(),
                section: display_section(&chunk.section),
                snippet: chunk.text.chars().take(SNIPPET_CHARS).collect(),
                score: c.rerank_score.min(1.0),
            }
        })
        .collect()
}

/// `plot_build_up` → `Plot Build Up`
fn display_section(section: &str) -> String {
    section
        .split(|ch: char| ch == '_' || ch.is_whitespace())
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect()
            })
        })
        .collect::<Vec<_>>()
        .join(" ")
}

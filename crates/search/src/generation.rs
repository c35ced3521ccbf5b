use crate::grounding::ABSTENTION_ANSWER;
use crate::intent::Intent;
use crate::types::RerankedCandidate;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Movie label used when no evidence names a title.
pub const UNKNOWN_MOVIE: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            max_tokens: 256,
            temperature: 0.2,
        }
    }
}

/// Text generator that turns a fully built prompt into an answer.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> anyhow::Result<String>;
}

const REFUSAL_RULE: &str = "If the context does not state the answer, reply with exactly:\n\
I don't know based on the given context.\n\
Stop right after the answer.";

const NO_STRUCTURE_RULE: &str =
    "Never mention chunks, chunk numbers, sources or how the context is organised.";

fn instruction(intent: Intent) -> &'static str {
    match intent {
        Intent::Fact => {
            "Extract the answer from the context below and nothing else.\n\
             Copy exact words or short phrases from the context; ignore anything you know otherwise.\n\
             Give one short sentence or a single name, with no explanation or comparison."
        }
        Intent::Director => {
            "Extract the director's full name exactly as the context writes it.\n\
             Add no titles or extra words, and do not infer it from other films."
        }
        Intent::Plot => {
            "Retell the plot using only events the context states.\n\
             Write four to six short sentences about concrete actions of named characters, \
             in the order the context gives them.\n\
             Leave out motives, themes and events the context does not mention.\n\
             With fewer than four stated events, treat the answer as missing."
        }
        Intent::Ending => {
            "Describe only how the film ends, as the context states it.\n\
             Read all of the context first, then write two or three short sentences, each naming \
             a concrete final outcome such as an escape, a death, an arrest or a reunion.\n\
             Do not recap earlier events or justify the answer."
        }
        Intent::Explanation => {
            "Explain the cause and effect the context states.\n\
             Write three to five short sentences, each tied to a concrete action or event, and \
             include at least one cause and its effect as stated.\n\
             Add no reasoning of your own."
        }
        Intent::Summary => {
            "Summarise the main events the context states.\n\
             Write three to five concise sentences, each naming a concrete event or character.\n\
             Leave out themes, symbolism and outcomes the context does not state."
        }
        Intent::Character | Intent::General => {
            "Answer using only what the context states explicitly.\n\
             Be brief and factual and do not discuss uncertainty."
        }
    }
}

/// Assemble the generation prompt: intent instruction, annotated evidence blocks,
/// question, movie and intent label.
#[must_use]
pub fn build_prompt(
    query: &str,
    evidence: &[RerankedCandidate],
    intent: Intent,
    movie: &str,
) -> String {
    let context = evidence
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let chunk = c.chunk();
            format!(
                "[Chunk {} | score={:.3} | source={} | movie: {} | section={}]\n{}",
                i + 1,
                c.rerank_score,
                chunk.source,
                chunk.title,
                chunk.section,
                chunk.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "{}\n{NO_STRUCTURE_RULE}\n{REFUSAL_RULE}\n\n\
         Context:\n{context}\n\n\
         Question:\n{query}\n\n\
         movie:\n{movie}\n\n\
         query intent:\n{intent}\n\n\
         Answer:",
        instruction(intent)
    )
}

/// Title of the top-ranked evidence, or [`UNKNOWN_MOVIE`].
#[must_use]
pub fn movie_of(reranked: &[RerankedCandidate]) -> String {
    reranked
        .first()
        .map(|c| c.chunk().title.trim())
        .filter(|title| !title.is_empty())
        .unwrap_or(UNKNOWN_MOVIE)
        .to_string()
}

/// Trim generator output; an empty answer becomes the abstention sentence.
#[must_use]
pub fn postprocess_answer(raw: &str) -> String {
    let answer = raw.trim();
    if answer.is_empty() {
        ABSTENTION_ANSWER.to_string()
    } else {
        answer.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::reranked;
    use pretty_assertions::assert_eq;

    #[test]
    fn prompt_annotates_each_passage() {
        let evidence = vec![
            reranked("DOC_1", 0.8123, Intent::Ending),
            reranked("DOC_2", 0.5, Intent::Ending),
        ];
        let prompt = build_prompt("How does Heat end?", &evidence, Intent::Ending, "Heat");

        assert!(prompt.starts_with("Describe only how the film ends"));
        assert!(prompt.contains(
            "[Chunk 1 | score=0.812 | source=wiki | movie: Heat | section=plot_setup]\ntext of DOC_1\n\n[Chunk 2 | score=0.500"
        ));
        assert!(prompt.contains("Question:\nHow does Heat end?\n\nmovie:\nHeat\n\nquery intent:\nending\n\nAnswer:"));
        assert!(prompt.ends_with("Answer:"));
        assert!(prompt.contains(ABSTENTION_ANSWER));
    }

    #[test]
    fn character_questions_use_general_instruction() {
        assert_eq!(instruction(Intent::Character), instruction(Intent::General));
        assert_ne!(instruction(Intent::Fact), instruction(Intent::General));
    }

    #[test]
    fn movie_falls_back_to_unknown() {
        assert_eq!(movie_of(&[]), "unknown");
        assert_eq!(movie_of(&[reranked("DOC_1", 0.5, Intent::Plot)]), "Heat");
    }

    #[test]
    fn empty_output_becomes_abstention() {
        assert_eq!(postprocess_answer("  \n"), ABSTENTION_ANSWER);
        assert_eq!(postprocess_answer("  Michael Mann. "), "Michael Mann.");
    }
}

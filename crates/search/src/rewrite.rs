use crate::intent::{contains_any, Intent};

struct Expansion {
    keywords: &'static [&'static str],
    suffix: &'static str,
}

const fn expansion(intent: Intent) -> Option<Expansion> {
    let expansion = match intent {
        Intent::Fact => Expansion {
            keywords: &["fact", "release", "year", "cast", "details"],
            suffix: "film facts release year cast details",
        },
        Intent::Director => Expansion {
            keywords: &["director", "directed", "filmmaker"],
            suffix: "director directed by filmmaker",
        },
        Intent::Plot => Expansion {
            keywords: &["plot", "story", "narrative", "summary"],
            suffix: "plot story narrative summary",
        },
        Intent::Ending => Expansion {
            keywords: &["ending", "final", "conclusion", "resolution"],
            suffix: "ending final scene conclusion resolution",
        },
        Intent::Character => Expansion {
            keywords: &["character", "protagonist", "role", "motivation"],
            suffix: "character protagonist role motivation arc",
        },
        Intent::Explanation => Expansion {
            keywords: &["explanation", "reason", "cause", "motivation"],
            suffix: "explanation reason cause motivation",
        },
        Intent::Summary => Expansion {
            keywords: &["summary", "overview", "synopsis"],
            suffix: "summary overview synopsis",
        },
        Intent::General => return None,
    };
    Some(expansion)
}

/// Augments the query text used for the rerank embedding with intent keywords.
pub struct QueryRewriter;

impl QueryRewriter {
    /// Append the intent's keyword suffix unless the query already mentions one of
    /// its keywords. Applying it twice yields the same text.
    #[must_use]
    pub fn rewrite(query: &str, intent: Intent) -> String {
        let Some(expansion) = expansion(intent) else {
            return query.to_string();
        };
        if contains_any(&query.to_lowercase(), expansion.keywords) {
            return query.to_string();
        }
        let trimmed = query.trim_end();
        if trimmed.is_empty() {
            return expansion.suffix.to_string();
        }
        format!("{trimmed} {}", expansion.suffix)
    }
}

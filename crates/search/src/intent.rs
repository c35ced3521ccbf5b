use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Coarse question shape that drives every per-intent policy downstream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Fact,
    Director,
    Plot,
    Ending,
    Character,
    Explanation,
    Summary,
    #[default]
    General,
}

impl Intent {
    pub const ALL: [Self; 8] = [
        Self::Fact,
        Self::Director,
        Self::Plot,
        Self::Ending,
        Self::Character,
        Self::Explanation,
        Self::Summary,
        Self::General,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fact => "fact",
            Self::Director => "director",
            Self::Plot => "plot",
            Self::Ending => "ending",
            Self::Character => "character",
            Self::Explanation => "explanation",
            Self::Summary => "summary",
            Self::General => "general",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Intent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|intent| intent.as_str() == needle)
            .ok_or_else(|| format!("unknown intent '{s}'"))
    }
}

/// Exhaustive per-intent table. Deserializing requires every intent key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IntentTable<T> {
    pub fact: T,
    pub director: T,
    pub plot: T,
    pub ending: T,
    pub character: T,
    pub explanation: T,
    pub summary: T,
    pub general: T,
}

impl<T> IntentTable<T> {
    #[must_use]
    pub const fn get(&self, intent: Intent) -> &T {
        match intent {
            Intent::Fact => &self.fact,
            Intent::Director => &self.director,
            Intent::Plot => &self.plot,
            Intent::Ending => &self.ending,
            Intent::Character => &self.character,
            Intent::Explanation => &self.explanation,
            Intent::Summary => &self.summary,
            Intent::General => &self.general,
        }
    }

    pub fn map<U>(&self, f: impl Fn(&T) -> U) -> IntentTable<U> {
        IntentTable {
            fact: f(&self.fact),
            director: f(&self.director),
            plot: f(&self.plot),
            ending: f(&self.ending),
            character: f(&self.character),
            explanation: f(&self.explanation),
            summary: f(&self.summary),
            general: f(&self.general),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Intent, &T)> {
        Intent::ALL.into_iter().map(move |intent| (intent, self.get(intent)))
    }
}

const ENDING_TERMS: &[&str] = &["ending", "end", "final", "conclusion", "last scene"];
const DIRECTOR_TERMS: &[&str] = &["who directed", "director", "directed by", "filmmaker"];
const SUMMARY_TERMS: &[&str] = &[
    "summary",
    "summarize",
    "overview",
    "brief",
    "short summary",
    "in short",
];
const EXPLANATION_PREFIXES: &[&str] = &["how", "why", "explain"];
const FACT_PREFIXES: &[&str] = &["who", "when", "where", "which"];
const CHARACTER_TERMS: &[&str] = &[
    "character",
    "protagonist",
    "antagonist",
    "hero",
    "villain",
    "role",
];
const ACTION_TERMS: &[&str] = &[
    "do", "does", "did", "kill", "save", "escape", "want", "become", "became", "feel", "felt",
    "fight", "betray", "love",
];
const FACT_METADATA_TERMS: &[&str] = &[
    "release",
    "year",
    "runtime",
    "rating",
    "box office",
    "budget",
    "award",
];
const PLOT_TERMS: &[&str] = &["plot", "story", "what happens"];

pub struct IntentClassifier;

impl IntentClassifier {
    /// Ordered cascade over the lower-cased query; the first matching rule wins.
    #[must_use]
    pub fn classify(query: &str) -> Intent {
        let q = query.trim().to_lowercase();

        if contains_any(&q, ENDING_TERMS) {
            return Intent::Ending;
        }
        if contains_any(&q, DIRECTOR_TERMS) {
            return Intent::Director;
        }
        if contains_any(&q, SUMMARY_TERMS) {
            return Intent::Summary;
        }
        if starts_with_any(&q, EXPLANATION_PREFIXES) {
            return Intent::Explanation;
        }
        if starts_with_any(&q, FACT_PREFIXES) {
            return Intent::Fact;
        }
        if contains_any(&q, CHARACTER_TERMS) && contains_any(&q, ACTION_TERMS) {
            return Intent::Character;
        }
        if contains_any(&q, FACT_METADATA_TERMS) {
            return Intent::Fact;
        }
        if contains_any(&q, PLOT_TERMS) {
            return Intent::Plot;
        }
        Intent::General
    }
}

pub(crate) fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

fn starts_with_any(haystack: &str, prefixes: &[&str]) -> bool {
    prefixes.iter().any(|prefix| haystack.starts_with(prefix))
}

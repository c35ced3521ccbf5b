use crate::intent::{Intent, IntentTable};
use crate::types::ScoredCandidate;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

/// Allowed section names for one intent; `null` in a profile disables filtering.
///
/// Unlike a bare `Option`, a missing key is a deserialization error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SectionSet(pub Option<Vec<String>>);

impl SectionSet {
    pub fn names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(Some(names.into_iter().map(Into::into).collect()))
    }

    #[must_use]
    pub const fn unfiltered() -> Self {
        Self(None)
    }
}

impl<'de> Deserialize<'de> for SectionSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Names(Vec<String>),
            Unfiltered,
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Names(names) => Self(Some(names)),
            Raw::Unfiltered => Self(None),
        })
    }
}

/// Restricts candidates to the sections that usually answer a given intent.
///
/// Filtering never starves the pipeline: whenever a step would leave nothing,
/// the list from before that step is returned instead.
#[derive(Debug, Clone)]
pub struct SectionFilter {
    sections: IntentTable<Option<Vec<String>>>,
}

impl SectionFilter {
    /// An unfiltered set disables filtering for that intent. Names are matched lower-cased.
    #[must_use]
    pub fn new(sections: &IntentTable<SectionSet>) -> Self {
        Self {
            sections: sections.map(|set| {
                set.0
                    .as_ref()
                    .map(|names| names.iter().map(|n| n.to_lowercase()).collect())
            }),
        }
    }

    #[must_use]
    pub fn has_filter(&self, intent: Intent) -> bool {
        self.sections.get(intent).is_some()
    }

    #[must_use]
    pub fn apply(&self, candidates: Vec<ScoredCandidate>, intent: Intent) -> Vec<ScoredCandidate> {
        let Some(allowed) = self.sections.get(intent) else {
            return candidates;
        };

        let filtered = keep_or_fallback(candidates, |c| {
            let section = c.chunk.section.to_lowercase();
            allowed.iter().any(|name| section.contains(name.as_str()))
        });

        if intent != Intent::Summary {
            return filtered;
        }
        match majority_title(&filtered) {
            Some(title) => keep_or_fallback(filtered, |c| c.chunk.title == title),
            None => filtered,
        }
    }
}

fn keep_or_fallback(
    candidates: Vec<ScoredCandidate>,
    keep: impl Fn(&ScoredCandidate) -> bool,
) -> Vec<ScoredCandidate> {
    if !candidates.iter().any(&keep) {
        log::debug!("Section filter matched nothing, keeping {} candidates", candidates.len());
        return candidates;
    }
    candidates.into_iter().filter(|c| keep(c)).collect()
}

/// Most frequent title; ties go to the title seen first in rank order.
fn majority_title(candidates: &[ScoredCandidate]) -> Option<String> {
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for (rank, candidate) in candidates.iter().enumerate() {
        counts
            .entry(candidate.chunk.title.as_str())
            .or_insert((0, rank))
            .0 += 1;
    }
    counts
        .into_iter()
        .max_by(|(_, (count_a, first_a)), (_, (count_b, first_b))| {
            count_a.cmp(count_b).then_with(|| first_b.cmp(first_a))
        })
        .map(|(title, _)| title.to_string())
}

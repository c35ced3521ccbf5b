use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::intent::{Intent, IntentTable};
use crate::section_filter::SectionSet;

const BUILTIN_DEFAULT: &str = include_str!("../../../profiles/default.json");
const PROFILE_ENV: &str = "REELQA_PROFILE";
const MAX_RETRIEVAL_K: usize = 1000;
const MAX_FILTER_HEADROOM: usize = 10;

/// Every tunable of the retrieval, rerank, selection and grounding stages.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PipelineProfile {
    pub name: String,
    pub description: Option<String>,
    pub retrieval: RetrievalConfig,
    pub rerank: RerankConfig,
    pub fusion: FusionConfig,
    pub selection: SelectionConfig,
    pub sections: IntentTable<SectionSet>,
    pub grounding: GroundingConfig,
    pub generation: GenerationConfig,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct RetrievalConfig {
    pub k: usize,
    /// Multiplier on `k` when the intent has a section filter
    pub filter_headroom: usize,
}

impl RetrievalConfig {
    #[must_use]
    pub const fn candidate_count(&self, filtered: bool) -> usize {
        if filtered {
            self.k.saturating_mul(self.filter_headroom)
        } else {
            self.k
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RerankConfig {
    pub top_k: usize,
    pub min_score: f32,
    pub intent_weights: IntentTable<f32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct FusionConfig {
    pub alpha: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SelectionConfig {
    pub max_k: usize,
    pub score_drop_threshold: f32,
    pub base_k: IntentTable<usize>,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct GroundingConfig {
    pub threshold: f32,
    pub context_max_chars: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct GenerationConfig {
    pub deadline_ms: u64,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawProfile {
    schema_version: Option<u32>,
    name: Option<String>,
    description: Option<String>,
    #[serde(default)]
    retrieval: RawRetrieval,
    #[serde(default)]
    rerank: RawRerank,
    #[serde(default)]
    fusion: RawFusion,
    #[serde(default)]
    selection: RawSelection,
    sections: Option<IntentTable<SectionSet>>,
    #[serde(default)]
    grounding: RawGrounding,
    #[serde(default)]
    generation: RawGeneration,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRetrieval {
    k: Option<usize>,
    filter_headroom: Option<usize>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRerank {
    top_k: Option<usize>,
    min_score: Option<f32>,
    intent_weights: Option<IntentTable<f32>>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawFusion {
    alpha: Option<f32>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSelection {
    max_k: Option<usize>,
    score_drop_threshold: Option<f32>,
    base_k: Option<IntentTable<usize>>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawGrounding {
    threshold: Option<f32>,
    context_max_chars: Option<usize>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawGeneration {
    deadline_ms: Option<u64>,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
}

impl PipelineProfile {
    /// The bundled `profiles/default.json`.
    pub fn builtin() -> Result<Self> {
        Self::from_bytes("default", BUILTIN_DEFAULT.as_bytes(), false)
    }

    /// Load `path`, else `$REELQA_PROFILE`, else the bundled default. Missing keys in a
    /// user profile are taken from the bundled default.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(PROFILE_ENV).map(PathBuf::from));
        match path {
            Some(path) => Self::from_file(&path),
            None => Self::builtin(),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read profile file {}", path.display()))?;
        let fallback_name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("custom");
        let profile = Self::from_bytes(fallback_name, &bytes, true)?;
        log::info!("Loaded profile '{}' from {}", profile.name, path.display());
        Ok(profile)
    }

    pub fn from_bytes(profile_name: &str, bytes: &[u8], merge_builtin: bool) -> Result<Self> {
        let raw = parse_raw(bytes)
            .with_context(|| format!("Profile '{profile_name}' is not a valid profile"))?;
        let raw = if merge_builtin {
            merge_raw_profiles(parse_raw(BUILTIN_DEFAULT.as_bytes())?, raw)
        } else {
            raw
        };
        Self::from_raw(raw, profile_name)
    }

    fn from_raw(raw: RawProfile, fallback_name: &str) -> Result<Self> {
        if let Some(schema_version) = raw.schema_version {
            if schema_version != 1 {
                return Err(anyhow!(
                    "profile.schema_version {schema_version} is not supported (expected 1)"
                ));
            }
        }

        let name = raw
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| fallback_name.to_string());

        let profile = Self {
            name,
            description: raw.description,
            retrieval: RetrievalConfig {
                k: required(raw.retrieval.k, "retrieval.k")?,
                filter_headroom: required(
                    raw.retrieval.filter_headroom,
                    "retrieval.filter_headroom",
                )?,
            },
            rerank: RerankConfig {
                top_k: required(raw.rerank.top_k, "rerank.top_k")?,
                min_score: required(raw.rerank.min_score, "rerank.min_score")?,
                intent_weights: required(raw.rerank.intent_weights, "rerank.intent_weights")?,
            },
            fusion: FusionConfig {
                alpha: required(raw.fusion.alpha, "fusion.alpha")?,
            },
            selection: SelectionConfig {
                max_k: required(raw.selection.max_k, "selection.max_k")?,
                score_drop_threshold: required(
                    raw.selection.score_drop_threshold,
                    "selection.score_drop_threshold",
                )?,
                base_k: required(raw.selection.base_k, "selection.base_k")?,
            },
            sections: required(raw.sections, "sections")?,
            grounding: GroundingConfig {
                threshold: required(raw.grounding.threshold, "grounding.threshold")?,
                context_max_chars: required(
                    raw.grounding.context_max_chars,
                    "grounding.context_max_chars",
                )?,
            },
            generation: GenerationConfig {
                deadline_ms: required(raw.generation.deadline_ms, "generation.deadline_ms")?,
                max_tokens: required(raw.generation.max_tokens, "generation.max_tokens")?,
                temperature: required(raw.generation.temperature, "generation.temperature")?,
            },
        };
        profile
            .validate()
            .with_context(|| format!("Invalid profile '{}'", profile.name))?;
        Ok(profile)
    }

    fn validate(&self) -> Result<()> {
        ensure(
            (1..=MAX_RETRIEVAL_K).contains(&self.retrieval.k),
            &format!("retrieval.k must be in [1, {MAX_RETRIEVAL_K}]"),
        )?;
        ensure(
            (1..=MAX_FILTER_HEADROOM).contains(&self.retrieval.filter_headroom),
            &format!("retrieval.filter_headroom must be in [1, {MAX_FILTER_HEADROOM}]"),
        )?;
        ensure(self.rerank.top_k >= 1, "rerank.top_k must be >= 1")?;
        ensure(
            self.rerank.min_score.is_finite(),
            "rerank.min_score must be finite",
        )?;
        for (intent, weight) in self.rerank.intent_weights.iter() {
            ensure(
                weight.is_finite() && *weight > 0.0,
                &format!("rerank.intent_weights.{intent} must be a positive number"),
            )?;
        }
        ensure(
            (0.0..=1.0).contains(&self.fusion.alpha),
            "fusion.alpha must be in [0.0, 1.0]",
        )?;
        ensure(self.selection.max_k >= 1, "selection.max_k must be >= 1")?;
        ensure(
            self.selection.score_drop_threshold >= 0.0,
            "selection.score_drop_threshold must be >= 0",
        )?;
        for (intent, base_k) in self.selection.base_k.iter() {
            ensure(
                (1..=self.selection.max_k).contains(base_k),
                &format!(
                    "selection.base_k.{intent} must be in [1, {}] (got {base_k})",
                    self.selection.max_k
                ),
            )?;
        }
        ensure(
            (0.0..=1.0).contains(&self.grounding.threshold),
            "grounding.threshold must be in [0.0, 1.0]",
        )?;
        ensure(
            self.grounding.context_max_chars >= 1,
            "grounding.context_max_chars must be >= 1",
        )?;
        ensure(
            self.generation.deadline_ms >= 1,
            "generation.deadline_ms must be >= 1",
        )?;
        Ok(())
    }

    #[must_use]
    pub fn base_k(&self, intent: Intent) -> usize {
        *self.selection.base_k.get(intent)
    }
}

fn required<T>(value: Option<T>, path: &str) -> Result<T> {
    value.ok_or_else(|| anyhow!("{path} is required"))
}

fn ensure(condition: bool, message: &str) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(anyhow!("{message}"))
    }
}

fn parse_raw(bytes: &[u8]) -> Result<RawProfile> {
    serde_json::from_slice(bytes).map_err(|err| anyhow!("Profile parse error: {err}"))
}

fn merge_raw_profiles(base: RawProfile, overlay: RawProfile) -> RawProfile {
    RawProfile {
        schema_version: overlay.schema_version.or(base.schema_version),
        name: overlay.name.or(base.name),
        description: overlay.description.or(base.description),
        retrieval: RawRetrieval {
            k: overlay.retrieval.k.or(base.retrieval.k),
            filter_headroom: overlay
                .retrieval
                .filter_headroom
                .or(base.retrieval.filter_headroom),
        },
        rerank: RawRerank {
            top_k: overlay.rerank.top_k.or(base.rerank.top_k),
            min_score: overlay.rerank.min_score.or(base.rerank.min_score),
            intent_weights: overlay.rerank.intent_weights.or(base.rerank.intent_weights),
        },
        fusion: RawFusion {
            alpha: overlay.fusion.alpha.or(base.fusion.alpha),
        },
        selection: RawSelection {
            max_k: overlay.selection.max_k.or(base.selection.max_k),
            score_drop_threshold: overlay
                .selection
                .score_drop_threshold
                .or(base.selection.score_drop_threshold),
            base_k: overlay.selection.base_k.or(base.selection.base_k),
        },
        sections: overlay.sections.or(base.sections),
        grounding: RawGrounding {
            threshold: overlay.grounding.threshold.or(base.grounding.threshold),
            context_max_chars: overlay
                .grounding
                .context_max_chars
                .or(base.grounding.context_max_chars),
        },
        generation: RawGeneration {
            deadline_ms: overlay.generation.deadline_ms.or(base.generation.deadline_ms),
            max_tokens: overlay.generation.max_tokens.or(base.generation.max_tokens),
            temperature: overlay.generation.temperature.or(base.generation.temperature),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn builtin_matches_documented_defaults() {
        let profile = PipelineProfile::builtin().unwrap();
        assert_eq!(profile.name, "default");
        assert_eq!(profile.retrieval.k, 15);
        assert_eq!(profile.retrieval.candidate_count(true), 45);
        assert_eq!(profile.retrieval.candidate_count(false), 15);
        assert_eq!(profile.rerank.top_k, 9);
        assert!((profile.rerank.min_score - 0.15).abs() < 1e-6);
        assert!((*profile.rerank.intent_weights.get(Intent::Ending) - 1.2).abs() < 1e-6);
        assert!((profile.fusion.alpha - 0.6).abs() < 1e-6);
        assert_eq!(profile.selection.max_k, 8);
        assert_eq!(profile.base_k(Intent::Fact), 2);
        assert_eq!(profile.base_k(Intent::Summary), 6);
        assert_eq!(profile.sections.general, SectionSet::unfiltered());
        assert_eq!(
            profile.sections.ending,
            SectionSet::names(["plot_ending", "summaries"])
        );
        assert_eq!(profile.grounding.context_max_chars, 4000);
        assert_eq!(profile.generation.deadline_ms, 16_000);
    }

    #[test]
    fn builtin_sections_are_ingested_section_names() {
        let profile = PipelineProfile::builtin().unwrap();
        for (intent, set) in profile.sections.iter() {
            for name in set.0.iter().flatten() {
                assert!(
                    reelqa_corpus::sections::ALL.contains(&name.as_str()),
                    "{intent} filters on unknown section '{name}'"
                );
            }
        }
    }

    #[test]
    fn user_profile_overrides_single_fields() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("strict.json");
        std::fs::write(
            &path,
            r#"{"schema_version": 1, "grounding": {"threshold": 0.7}, "rerank": {"top_k": 4}}"#,
        )
        .unwrap();

        let profile = PipelineProfile::load(Some(&path)).unwrap();
        assert_eq!(profile.name, "default");
        assert!((profile.grounding.threshold - 0.7).abs() < 1e-6);
        assert_eq!(profile.grounding.context_max_chars, 4000);
        assert_eq!(profile.rerank.top_k, 4);
        assert!((profile.rerank.min_score - 0.15).abs() < 1e-6);
    }

    #[test]
    fn rejects_unknown_keys_and_bad_values() {
        assert!(PipelineProfile::from_bytes("x", br#"{"retrieval": {"kk": 3}}"#, true).is_err());
        assert!(PipelineProfile::from_bytes("x", br#"{"schema_version": 2}"#, true).is_err());
        assert!(PipelineProfile::from_bytes("x", br#"{"fusion": {"alpha": 1.5}}"#, true).is_err());
        assert!(
            PipelineProfile::from_bytes("x", br#"{"selection": {"max_k": 1}}"#, true).is_err(),
            "base_k above max_k must be rejected"
        );
    }

    #[test]
    fn oversized_candidate_pools_are_rejected() {
        let huge_k = br#"{"retrieval": {"k": 18446744073709551615}}"#;
        let err = PipelineProfile::from_bytes("x", huge_k, true).unwrap_err();
        assert!(format!("{err:#}").contains("retrieval.k must be in [1, 1000]"));
        assert!(
            PipelineProfile::from_bytes("x", br#"{"retrieval": {"filter_headroom": 11}}"#, true)
                .is_err()
        );
        let widest = br#"{"retrieval": {"k": 1000, "filter_headroom": 10}}"#;
        let profile = PipelineProfile::from_bytes("x", widest, true).unwrap();
        assert_eq!(profile.retrieval.candidate_count(true), 10_000);
    }

    #[test]
    fn incomplete_intent_table_is_rejected() {
        let raw = br#"{"selection": {"base_k": {"fact": 2, "director": 2, "plot": 6, "ending": 5, "character": 5, "explanation": 5, "summary": 6}}}"#;
        assert!(PipelineProfile::from_bytes("x", raw, true).is_err());
    }
}

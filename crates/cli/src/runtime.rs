use anyhow::{Context as AnyhowContext, Result};
use reelqa_corpus::{JsonMetadataStore, MetadataStore};
use reelqa_search::{PipelineProfile, ServiceContext};
use reelqa_vector_store::{
    CrossEncoderJudge, Embedder, EmbeddingModel, FlatIndex, Judge, VectorIndex,
};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub(crate) const INDEX_PATH_ENV: &str = "REELQA_INDEX_PATH";
pub(crate) const METADATA_PATH_ENV: &str = "REELQA_METADATA_PATH";
const DEFAULT_INDEX_PATH: &str = "data/index.json";
const DEFAULT_METADATA_PATH: &str = "data/metadata.json";

/// Where the pre-built artifacts and the profile live.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct RuntimePaths {
    pub(crate) index: PathBuf,
    pub(crate) metadata: PathBuf,
    pub(crate) profile: Option<PathBuf>,
}

impl RuntimePaths {
    /// Flags win over the environment, which wins over `data/`.
    pub(crate) fn resolve(
        index: Option<PathBuf>,
        metadata: Option<PathBuf>,
        profile: Option<PathBuf>,
    ) -> Self {
        Self {
            index: index
                .or_else(|| env::var_os(INDEX_PATH_ENV).map(PathBuf::from))
                .unwrap_or_else(|| PathBuf::from(DEFAULT_INDEX_PATH)),
            metadata: metadata
                .or_else(|| env::var_os(METADATA_PATH_ENV).map(PathBuf::from))
                .unwrap_or_else(|| PathBuf::from(DEFAULT_METADATA_PATH)),
            profile,
        }
    }

    pub(crate) fn load_profile(&self) -> Result<PipelineProfile> {
        PipelineProfile::load(self.profile.as_deref())
    }
}

/// Build the shared context. Models and artifacts load on first use.
pub(crate) fn build_context(paths: &RuntimePaths) -> Result<ServiceContext> {
    let profile = paths.load_profile()?;
    log::debug!(
        "Profile '{}', index {}, metadata {}",
        profile.name,
        paths.index.display(),
        paths.metadata.display()
    );

    let index_path = paths.index.clone();
    let metadata_path = paths.metadata.clone();

    Ok(ServiceContext::builder(profile)
        .embedder_loader(|| {
            let model = EmbeddingModel::from_env().context("Failed to load embedding model")?;
            log::info!("Embedding model '{}' ({} dims)", model.model_id(), model.dimension());
            Ok(Arc::new(model) as Arc<dyn Embedder>)
        })
        .index_loader(move || {
            let index = load_index(&index_path)?;
            Ok(Arc::new(index) as Arc<dyn VectorIndex>)
        })
        .store_loader(move || {
            let store = JsonMetadataStore::load(&metadata_path)
                .with_context(|| format!("Failed to load metadata {}", metadata_path.display()))?;
            Ok(Arc::new(store) as Arc<dyn MetadataStore>)
        })
        .judge_loader(|| {
            let judge = CrossEncoderJudge::from_env().context("Failed to load judge model")?;
            log::info!("Judge model '{}'", judge.model_id());
            Ok(Arc::new(judge) as Arc<dyn Judge>)
        })
        .build())
}

fn load_index(path: &Path) -> Result<FlatIndex> {
    FlatIndex::load(path).with_context(|| format!("Failed to load vector index {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn flags_override_defaults() {
        let paths = RuntimePaths::resolve(
            Some(PathBuf::from("/srv/films/index.json")),
            Some(PathBuf::from("/srv/films/metadata.json")),
            None,
        );
        assert_eq!(paths.index, PathBuf::from("/srv/films/index.json"));
        assert_eq!(paths.metadata, PathBuf::from("/srv/films/metadata.json"));
        assert_eq!(paths.profile, None);
    }

    #[test]
    fn missing_artifacts_surface_as_model_unavailable() {
        let temp = TempDir::new().unwrap();
        let paths = RuntimePaths {
            index: temp.path().join("index.json"),
            metadata: temp.path().join("metadata.json"),
            profile: None,
        };
        let context = build_context(&paths).unwrap();

        let err = context.index().err().unwrap();
        assert_eq!(err.code(), "MODEL_UNAVAILABLE");
        assert!(err.to_string().contains("index.json"));
        assert!(context.store().is_err());
    }

    #[test]
    fn saved_artifacts_load() {
        let temp = TempDir::new().unwrap();
        let index_path = temp.path().join("index.json");
        let mut index = FlatIndex::new(3);
        index.add(0, &[1.0, 0.0, 0.0]).unwrap();
        index.save(&index_path).unwrap();
        let metadata_path = temp.path().join("metadata.json");
        JsonMetadataStore::new().save(&metadata_path).unwrap();

        let context = build_context(&RuntimePaths {
            index: index_path,
            metadata: metadata_path,
            profile: None,
        })
        .unwrap();
        assert_eq!(context.index().unwrap().len(), 1);
        assert!(context.store().unwrap().fetch_by_vector_ids(&[0]).unwrap().is_empty());
    }
}

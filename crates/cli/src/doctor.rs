use crate::llm::ChatCompletionsGenerator;
use crate::runtime::RuntimePaths;
use anyhow::Result;
use reelqa_vector_store::{model_dir, InferenceMode, ModelKind, ModelSpec};
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Serialize)]
pub(crate) struct DoctorReport {
    pub model_dir: String,
    pub profile: String,
    pub profile_error: Option<String>,
    pub embedding: ModelDoctorItem,
    pub judge: ModelDoctorItem,
    pub index: ArtifactDoctorItem,
    pub metadata: ArtifactDoctorItem,
    pub llm_endpoint: String,
    pub llm_model: String,
    pub llm_api_key_set: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct ModelDoctorItem {
    pub mode: String,
    pub model: String,
    pub ok: bool,
    pub error: Option<String>,
    pub missing_assets: Vec<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ArtifactDoctorItem {
    pub path: String,
    pub exists: bool,
}

impl DoctorReport {
    pub(crate) fn ok(&self) -> bool {
        self.profile_error.is_none()
            && self.embedding.ok
            && self.judge.ok
            && self.index.exists
            && self.metadata.exists
    }
}

pub(crate) fn doctor(paths: &RuntimePaths) -> Result<DoctorReport> {
    let dir = model_dir();
    let (profile, profile_error) = match paths.load_profile() {
        Ok(profile) => (profile.name, None),
        Err(err) => ("n/a".to_string(), Some(format!("{err:#}"))),
    };
    let llm = ChatCompletionsGenerator::from_env()?;

    Ok(DoctorReport {
        model_dir: dir.display().to_string(),
        profile,
        profile_error,
        embedding: check_model(ModelKind::Embedding, &dir),
        judge: check_model(ModelKind::Judge, &dir),
        index: check_artifact(&paths.index),
        metadata: check_artifact(&paths.metadata),
        llm_endpoint: llm.endpoint().to_string(),
        llm_model: llm.model().to_string(),
        llm_api_key_set: llm.has_api_key(),
    })
}

fn check_model(kind: ModelKind, dir: &Path) -> ModelDoctorItem {
    let mode = match InferenceMode::from_env(kind) {
        Ok(mode) => mode,
        Err(err) => return failed_item("n/a", "n/a", err.to_string()),
    };
    let spec = match ModelSpec::from_env(kind) {
        Ok(spec) => spec,
        Err(err) => return failed_item(mode.as_str(), "n/a", err.to_string()),
    };

    // Stubs never touch the model directory.
    let missing_assets = if mode == InferenceMode::Stub {
        Vec::new()
    } else {
        let assets = spec.assets_in(dir);
        [assets.model_path, assets.tokenizer_path]
            .into_iter()
            .filter(|path| !path.is_file())
            .map(|path| path.display().to_string())
            .collect()
    };

    ModelDoctorItem {
        mode: mode.as_str().to_string(),
        model: spec.id,
        ok: missing_assets.is_empty(),
        error: None,
        missing_assets,
    }
}

fn failed_item(mode: &str, model: &str, error: String) -> ModelDoctorItem {
    ModelDoctorItem {
        mode: mode.to_string(),
        model: model.to_string(),
        ok: false,
        error: Some(error),
        missing_assets: Vec::new(),
    }
}

fn check_artifact(path: &Path) -> ArtifactDoctorItem {
    ArtifactDoctorItem {
        path: path.display().to_string(),
        exists: path.is_file(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn artifacts_report_presence() {
        let temp = TempDir::new().unwrap();
        let present = temp.path().join("metadata.json");
        std::fs::write(&present, "{}").unwrap();

        assert!(check_artifact(&present).exists);
        let missing = check_artifact(&temp.path().join("index.json"));
        assert!(!missing.exists);
        assert!(missing.path.ends_with("index.json"));
    }

    #[test]
    fn failed_model_check_is_not_ok() {
        let item = failed_item("fast", "n/a", "Unknown model 'gpt'".to_string());
        assert!(!item.ok);
        assert_eq!(item.error.as_deref(), Some("Unknown model 'gpt'"));
    }
}

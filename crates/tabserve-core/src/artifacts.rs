//! Loading the model artifact and model card at startup

use crate::manifest::Manifest;
use crate::model::{ModelArtifact, ModelError};
use std::path::{Path, PathBuf};
use tracing::info;

/// Default artifact directory, relative to the working directory.
pub const DEFAULT_ARTIFACTS_DIR: &str = "artifacts";
/// Default model file name inside the artifact directory.
pub const MODEL_FILE: &str = "model.json";
/// Default model card file name inside the artifact directory.
pub const MANIFEST_FILE: &str = "model_card.json";

/// Fatal errors while loading artifacts. The server does not start.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("missing artifacts: {}. Run the model serialization step first", join_paths(.0))]
    MissingArtifacts(Vec<PathBuf>),

    #[error("failed to read {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("failed to parse {0}: {1}")]
    Parse(PathBuf, #[source] serde_json::Error),

    #[error("model artifact {0} is invalid: {1}")]
    InvalidModel(PathBuf, #[source] ModelError),

    #[error("model was fitted on features {model:?} but the model card declares {declared:?}")]
    FeatureMismatch {
        model: Vec<String>,
        declared: Vec<String>,
    },
}

/// Where the model and its card live on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub model: PathBuf,
    pub manifest: PathBuf,
}

impl ArtifactPaths {
    /// `<dir>/model.json` and `<dir>/model_card.json`.
    pub fn in_dir<P: AsRef<Path>>(dir: P) -> Self {
        let dir = dir.as_ref();
        Self {
            model: dir.join(MODEL_FILE),
            manifest: dir.join(MANIFEST_FILE),
        }
    }

    pub fn new(model: impl Into<PathBuf>, manifest: impl Into<PathBuf>) -> Self {
        Self {
            model: model.into(),
            manifest: manifest.into(),
        }
    }

    /// Every configured path that does not exist.
    pub fn missing(&self) -> Vec<PathBuf> {
        [&self.model, &self.manifest]
            .into_iter()
            .filter(|p| !p.exists())
            .cloned()
            .collect()
    }
}

impl Default for ArtifactPaths {
    fn default() -> Self {
        Self::in_dir(DEFAULT_ARTIFACTS_DIR)
    }
}

/// Read and validate the model artifact.
pub fn load_model(path: &Path) -> Result<ModelArtifact, LoadError> {
    let content = read(path)?;
    let model =
        ModelArtifact::from_json(&content).map_err(|e| LoadError::Parse(path.to_path_buf(), e))?;
    model
        .validate()
        .map_err(|e| LoadError::InvalidModel(path.to_path_buf(), e))?;
    info!("Loaded {} model from {}", model.kind(), path.display());
    Ok(model)
}

/// Read the model card.
pub fn load_manifest(path: &Path) -> Result<Manifest, LoadError> {
    let content = read(path)?;
    let manifest =
        Manifest::from_json(&content).map_err(|e| LoadError::Parse(path.to_path_buf(), e))?;
    let name = match &manifest.name {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => "<unnamed>".to_string(),
    };
    info!("Loaded model card '{}' from {}", name, path.display());
    Ok(manifest)
}

fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn read(path: &Path) -> Result<String, LoadError> {
    std::fs::read_to_string(path).map_err(|e| LoadError::Io(path.to_path_buf(), e))
}

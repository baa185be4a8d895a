//! Process-wide serving state and the predict chain

use crate::artifacts::{self, ArtifactPaths, LoadError};
use crate::decode::decode_payload;
use crate::inference::{Capabilities, InferenceEngine, InferenceError, Prediction};
use crate::manifest::Manifest;
use crate::model::{Classifier, ModelArtifact};
use crate::record::RecordSet;
use crate::schema::{FeatureSchema, ValidationError};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::info;

/// Name of the label column added to every output row.
pub const PREDICTION_COLUMN: &str = "prediction";
/// Name of the positive-class probability column.
pub const PROBABILITY_COLUMN: &str = "p1";

/// Anything that can go wrong serving one predict request.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PredictError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Inference(#[from] InferenceError),
}

/// Everything loaded at startup. Read-only for the rest of the process.
#[derive(Debug)]
pub struct ServingState {
    model: ModelArtifact,
    manifest: Manifest,
    schema: FeatureSchema,
    capabilities: Capabilities,
    model_path: PathBuf,
}

impl ServingState {
    /// Load both artifacts and derive the feature schema.
    ///
    /// Fails if either file is missing, unreadable or invalid, or if the
    /// model records feature names that disagree with the card.
    pub fn load(paths: &ArtifactPaths) -> Result<Self, LoadError> {
        let missing = paths.missing();
        if !missing.is_empty() {
            return Err(LoadError::MissingArtifacts(missing));
        }

        let model = artifacts::load_model(&paths.model)?;
        let manifest = artifacts::load_manifest(&paths.manifest)?;
        let model_path = std::fs::canonicalize(&paths.model)
            .map_err(|e| LoadError::Io(paths.model.clone(), e))?;

        let state = Self::new(model, manifest, model_path)?;
        info!(
            "Serving {} model over {} features (probabilities: {})",
            state.model.kind(),
            state.schema.len(),
            if state.capabilities.predict_proba {
                "yes"
            } else {
                "no"
            }
        );
        Ok(state)
    }

    /// Assemble state from already-loaded parts.
    pub fn new(
        model: ModelArtifact,
        manifest: Manifest,
        model_path: PathBuf,
    ) -> Result<Self, LoadError> {
        let schema = FeatureSchema::from_manifest(&manifest);

        let mismatch = match &model.feature_names {
            Some(names) => names.as_slice() != schema.features(),
            None => model.n_features() != schema.len(),
        };
        if mismatch {
            return Err(LoadError::FeatureMismatch {
                model: model
                    .feature_names
                    .clone()
                    .unwrap_or_else(|| vec![format!("<{} unnamed>", model.n_features())]),
                declared: schema.features().to_vec(),
            });
        }

        let capabilities = Capabilities::detect(&model);
        Ok(Self {
            model,
            manifest,
            schema,
            capabilities,
            model_path,
        })
    }

    pub fn model(&self) -> &ModelArtifact {
        &self.model
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    pub fn engine(&self) -> InferenceEngine<'_> {
        InferenceEngine::new(&self.model, self.capabilities)
    }

    /// Decode, validate, score and assemble output rows for a request body.
    pub fn predict_payload(
        &self,
        payload: &Value,
    ) -> Result<Vec<Map<String, Value>>, PredictError> {
        let records = decode_payload(payload, &self.schema)?;
        let features = self.schema.validate(&records)?;
        let prediction = self.engine().predict(&features)?;
        Ok(assemble_rows(&records, &prediction))
    }
}

/// Input columns, then `prediction`, then `p1` when a positive-class
/// probability is available.
pub fn assemble_rows(records: &RecordSet, prediction: &Prediction) -> Vec<Map<String, Value>> {
    let p1 = prediction.positive_class_probabilities();

    records
        .to_objects()
        .into_iter()
        .zip(&prediction.labels)
        .enumerate()
        .map(|(i, (mut row, label))| {
            row.insert(PREDICTION_COLUMN.to_string(), label.clone());
            if let Some(p1) = &p1 {
                row.insert(PROBABILITY_COLUMN.to_string(), Value::from(p1[i]));
            }
            row
        })
        .collect()
}

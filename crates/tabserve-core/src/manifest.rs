//! Model card metadata written alongside the model artifact

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Metadata describing a trained model.
///
/// Every field is optional. Only `features` is interpreted; everything else
/// is kept as raw JSON and echoed back unchanged, whatever its type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Manifest {
    pub name: Option<Value>,
    pub created_at: Option<Value>,
    pub framework: Option<Value>,
    /// Version of the training library used to fit the model
    pub sklearn_version: Option<Value>,
    /// Version of the runtime the training process ran under
    pub python_version: Option<Value>,
    /// Declared features, in the order the model expects them
    pub features: Option<Vec<String>>,
    pub target: Option<Value>,
    pub model_type: Option<Value>,
    pub model_params: Option<Value>,
    pub dataset: Option<Value>,
    pub metrics: Option<Value>,
    pub artifact_path: Option<Value>,
    pub dependencies: Option<Value>,
}

impl Manifest {
    pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }
}

//! # tabserve Core
//!
//! Everything needed to serve a pre-trained tabular classifier, minus the
//! HTTP layer.
//!
//! ## Modules
//!
//! - [`artifacts`]: Loading the model artifact and model card at startup
//! - [`manifest`]: Model card metadata
//! - [`model`]: Supported estimator families and the [`Classifier`] trait
//! - [`record`]: Per-request tabular record sets
//! - [`decode`]: JSON payload to [`RecordSet`] conversion
//! - [`schema`]: Declared-feature validation
//! - [`inference`]: Running label and probability prediction
//! - [`serving`]: Process-wide state and the full predict chain
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tabserve_core::{ArtifactPaths, ServingState};
//!
//! let state = ServingState::load(&ArtifactPaths::in_dir("artifacts"))?;
//! let payload = serde_json::json!([{ "radius_worst": 20.5 /* ... */ }]);
//! let rows = state.predict_payload(&payload)?;
//! ```

pub mod artifacts;
pub mod decode;
pub mod inference;
pub mod manifest;
pub mod model;
pub mod record;
pub mod schema;
pub mod serving;

pub use artifacts::{ArtifactPaths, LoadError};
pub use decode::decode_payload;
pub use inference::{Capabilities, InferenceEngine, InferenceError, Prediction};
pub use manifest::Manifest;
pub use model::{Classifier, Label, ModelArtifact};
pub use record::RecordSet;
pub use schema::{FeatureSchema, ValidationError, FALLBACK_FEATURES};
pub use serving::{PredictError, ServingState};

//! Declared-feature schema and record set validation

use crate::manifest::Manifest;
use crate::record::RecordSet;

/// Features used when the model card declares none.
pub const FALLBACK_FEATURES: [&str; 5] = [
    "radius_worst",
    "perimeter_worst",
    "area_worst",
    "concavity_worst",
    "concave points_worst",
];

/// Client input errors raised while turning a payload into model input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("payload must be a list of objects")]
    NotAListOfObjects,

    #[error("missing required columns: {missing:?}. expected: {expected:?}")]
    MissingColumns {
        missing: Vec<String>,
        expected: Vec<String>,
    },
}

impl ValidationError {
    /// Declared columns the payload lacked, if that is what went wrong.
    pub fn missing_columns(&self) -> &[String] {
        match self {
            ValidationError::MissingColumns { missing, .. } => missing,
            ValidationError::NotAListOfObjects => &[],
        }
    }
}

/// The ordered list of columns the model was trained on.
///
/// Fixed once at startup and shared read-only by every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureSchema {
    features: Vec<String>,
}

impl FeatureSchema {
    /// Build a schema from a feature list, dropping repeated names.
    pub fn new<I, S>(features: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = std::collections::HashSet::new();
        let features = features
            .into_iter()
            .map(Into::into)
            .filter(|f: &String| seen.insert(f.clone()))
            .collect();
        Self { features }
    }

    /// Derive the schema from a model card, falling back to
    /// [`FALLBACK_FEATURES`] when the card lists no features.
    pub fn from_manifest(manifest: &Manifest) -> Self {
        match manifest.features.as_deref() {
            Some(features) if !features.is_empty() => Self::new(features.iter().cloned()),
            _ => {
                tracing::warn!("Model card declares no features, using fallback feature list");
                Self::new(FALLBACK_FEATURES)
            }
        }
    }

    pub fn features(&self) -> &[String] {
        &self.features
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Check that every declared feature is present and return a copy
    /// restricted to the declared features, in declared order.
    ///
    /// A set with no rows has nothing to score and always validates.
    pub fn validate(&self, records: &RecordSet) -> Result<RecordSet, ValidationError> {
        if records.is_empty() {
            return Ok(RecordSet::new());
        }

        let missing: Vec<String> = self
            .features
            .iter()
            .filter(|f| !records.has_column(f))
            .cloned()
            .collect();

        if !missing.is_empty() {
            return Err(ValidationError::MissingColumns {
                missing,
                expected: self.features.clone(),
            });
        }

        records
            .select(&self.features)
            .ok_or_else(|| ValidationError::MissingColumns {
                missing: Vec::new(),
                expected: self.features.clone(),
            })
    }
}

//! Label and probability prediction over validated record sets

use crate::model::{Classifier, Label, ModelArtifact};
use crate::record::RecordSet;
use serde_json::Value;

/// Optional capabilities of the loaded model, detected once at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub predict_proba: bool,
}

impl Capabilities {
    pub fn detect<C: Classifier + ?Sized>(model: &C) -> Self {
        Self {
            predict_proba: model.supports_proba(),
        }
    }
}

/// Errors raised while turning cells into model input.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InferenceError {
    #[error("could not convert string to float: '{value}' (column '{column}')")]
    NonNumeric { column: String, value: String },

    #[error("input contains a missing or non-scalar value in column '{column}' at row {row}")]
    MissingValue { column: String, row: usize },
}

/// Model output for a record set.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    /// One label per input row, in row order
    pub labels: Vec<Label>,
    /// Rows x classes, present only when the model estimates probabilities
    pub probabilities: Option<Vec<Vec<f64>>>,
}

impl Prediction {
    /// Probability of the last class for each row.
    ///
    /// Classes are stored in the order the training library reported them
    /// (ascending label order), so for a binary problem the last column is
    /// the positive class. `None` when there are no probabilities or fewer
    /// than two classes.
    pub fn positive_class_probabilities(&self) -> Option<Vec<f64>> {
        let proba = self.probabilities.as_ref()?;
        let width = proba.first().map_or(0, Vec::len);
        if !proba.is_empty() && width < 2 {
            return None;
        }
        Some(proba.iter().filter_map(|row| row.last().copied()).collect())
    }
}

/// Runs a loaded model over record sets that already match the declared
/// features.
#[derive(Debug, Clone, Copy)]
pub struct InferenceEngine<'a> {
    model: &'a ModelArtifact,
    capabilities: Capabilities,
}

impl<'a> InferenceEngine<'a> {
    pub fn new(model: &'a ModelArtifact, capabilities: Capabilities) -> Self {
        Self {
            model,
            capabilities,
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Predict a label for every row and, when supported, class probabilities.
    ///
    /// The record set must hold exactly the model's features in training
    /// order; no schema checks happen here.
    pub fn predict(&self, records: &RecordSet) -> Result<Prediction, InferenceError> {
        let matrix = to_matrix(records)?;
        let classes = self.model.classes();

        let labels = matrix
            .iter()
            .map(|row| classes[self.model.predict_index(row)].clone())
            .collect();

        let probabilities = if self.capabilities.predict_proba {
            matrix
                .iter()
                .map(|row| self.model.predict_proba(row))
                .collect::<Option<Vec<_>>>()
        } else {
            None
        };

        Ok(Prediction {
            labels,
            probabilities,
        })
    }
}

fn to_matrix(records: &RecordSet) -> Result<Vec<Vec<f64>>, InferenceError> {
    let columns: Vec<&str> = records.columns().collect();
    records
        .rows()
        .iter()
        .enumerate()
        .map(|(r, row)| {
            row.iter()
                .zip(&columns)
                .map(|(cell, column)| cell_to_f64(cell, column, r))
                .collect()
        })
        .collect()
}

fn cell_to_f64(cell: &Value, column: &str, row: usize) -> Result<f64, InferenceError> {
    let missing = || InferenceError::MissingValue {
        column: column.to_string(),
        row,
    };

    match cell {
        Value::Number(n) => n.as_f64().ok_or_else(missing),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| InferenceError::NonNumeric {
                column: column.to_string(),
                value: s.clone(),
            }),
        Value::Null | Value::Array(_) | Value::Object(_) => Err(missing()),
    }
}

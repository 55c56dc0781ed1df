//! Linear regression model loaded from a JSON weights file.
//!
//! ```json
//! { "features": ["heartWaveform_0", "breathWaveform_0"], "weights": [1.5, -0.2], "intercept": 60.0 }
//! ```

use super::{InferenceError, InferenceModel};
use crate::core::features::{FeatureSchema, FeatureVector};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

/// Errors while loading or validating a model file.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("IO error reading model: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid model file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid model: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ModelFile {
    features: Vec<String>,
    weights: Vec<f64>,
    #[serde(default)]
    intercept: f64,
}

/// `prediction = intercept + Σ weight_i * feature_i`
#[derive(Debug, Clone)]
pub struct LinearModel {
    schema: FeatureSchema,
    weights: Vec<f64>,
    intercept: f64,
}

impl LinearModel {
    /// Build a model from feature names and matching weights.
    pub fn new(
        features: Vec<String>,
        weights: Vec<f64>,
        intercept: f64,
    ) -> Result<Self, ModelError> {
        if features.is_empty() {
            return Err(ModelError::Invalid("model has no features".to_string()));
        }
        if features.len() != weights.len() {
            return Err(ModelError::Invalid(format!(
                "{} features but {} weights",
                features.len(),
                weights.len()
            )));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = features.iter().find(|f| !seen.insert(f.as_str())) {
            return Err(ModelError::Invalid(format!("duplicate feature `{dup}`")));
        }
        if !intercept.is_finite() || weights.iter().any(|w| !w.is_finite()) {
            return Err(ModelError::Invalid("non-finite coefficient".to_string()));
        }

        Ok(Self {
            schema: FeatureSchema::new(features),
            weights,
            intercept,
        })
    }

    /// Parse a model from its JSON representation.
    pub fn from_json(json: &str) -> Result<Self, ModelError> {
        let file: ModelFile = serde_json::from_str(json)?;
        Self::new(file.features, file.weights, file.intercept)
    }

    /// Load a model from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Serialize the model back to JSON.
    pub fn to_json(&self) -> Result<String, ModelError> {
        let file = ModelFile {
            features: self.schema.names().to_vec(),
            weights: self.weights.clone(),
            intercept: self.intercept,
        };
        Ok(serde_json::to_string_pretty(&file)?)
    }
}

impl InferenceModel for LinearModel {
    fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    fn predict(&self, features: &FeatureVector) -> Result<f64, InferenceError> {
        if !features.matches(&self.schema) {
            return Err(InferenceError::SchemaMismatch {
                expected: self.schema.len(),
                actual: features.len(),
            });
        }

        let prediction = self.intercept
            + features
                .values()
                .iter()
                .zip(&self.weights)
                .map(|(x, w)| x * w)
                .sum::<f64>();

        if prediction.is_finite() {
            Ok(prediction)
        } else {
            Err(InferenceError::NonFinite(prediction))
        }
    }
}

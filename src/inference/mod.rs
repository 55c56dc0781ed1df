//! Inference adapter boundary.
//!
//! The pipeline only needs two things from a model: the ordered list of
//! feature names it was trained on, and a scalar prediction for a vector laid
//! out in that order. How the model was trained or stored is not its concern.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use synheart_vitals_agent::inference::{InferenceModel, LinearModel};
//!
//! let model: Arc<dyn InferenceModel> =
//!     Arc::new(LinearModel::load("vitals_model.json").expect("model"));
//! println!("{} features", model.schema().len());
//! ```

mod linear;

pub use linear::{LinearModel, ModelError};

use crate::core::features::{FeatureSchema, FeatureVector};
use thiserror::Error;

/// Errors returned by a model for a single prediction.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("feature vector does not match the model schema ({expected} features expected, {actual} given)")]
    SchemaMismatch { expected: usize, actual: usize },

    #[error("model produced a non-finite prediction: {0}")]
    NonFinite(f64),

    #[error("model failure: {0}")]
    Model(String),
}

/// A regression model producing one scalar per feature vector.
pub trait InferenceModel: Send + Sync {
    /// Feature names the model expects, in order.
    fn schema(&self) -> &FeatureSchema;

    /// Predict from a vector built against [`InferenceModel::schema`].
    fn predict(&self, features: &FeatureVector) -> Result<f64, InferenceError>;
}

//! Prediction results handed from file processors to the display layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Model output for one vitals frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Heart rate predicted by the model (bpm)
    pub predicted_heart_rate: f64,
    /// Heart rate the sensor reported for the same frame, 0.0 when absent
    pub reference_heart_rate: f64,
    /// Breath rate the sensor reported, 0.0 when absent
    pub breath_rate: f64,
    /// File the frame was read from
    pub source: PathBuf,
    /// Index of the frame's entry inside the file
    pub frame_index: usize,
    /// When the prediction was made
    pub produced_at: DateTime<Utc>,
}

impl PredictionResult {
    /// Absolute gap between predicted and sensor-reported heart rate.
    pub fn difference(&self) -> f64 {
        (self.predicted_heart_rate - self.reference_heart_rate).abs()
    }
}

//! Core data model of the vitals agent.
//!
//! This module contains:
//! - Vitals frame extraction from parsed sensor output
//! - Feature vectorization against a model schema
//! - Prediction results produced per frame

pub mod features;
pub mod frames;
pub mod prediction;

// Re-export commonly used types
pub use features::{vectorize, FeatureSchema, FeatureVector};
pub use frames::{extract_frames, ExtractError, ExtractedFrame, Frames, VitalsFrame};
pub use prediction::PredictionResult;

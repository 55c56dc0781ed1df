//! Feature vectorization of vitals frames.
//!
//! The model consumes a fixed, ordered list of named features. Waveforms are
//! flattened into indexed scalars (`heartWaveform_0`, `heartWaveform_1`, ...)
//! and the frame's own rates map to `heartRate` / `breathRate`. Every schema
//! key the frame cannot supply is set to 0.0, and frame values the schema does
//! not name are dropped, so the output always has exactly the schema's keys.

use crate::core::frames::VitalsFrame;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::sync::Arc;

/// Feature name for the sensor-reported heart rate.
pub const HEART_RATE: &str = "heartRate";
/// Feature name for the sensor-reported breath rate.
pub const BREATH_RATE: &str = "breathRate";
/// Prefix of flattened heart waveform features.
pub const HEART_WAVEFORM_PREFIX: &str = "heartWaveform_";
/// Prefix of flattened breath waveform features.
pub const BREATH_WAVEFORM_PREFIX: &str = "breathWaveform_";

/// Ordered list of feature names expected by a model.
///
/// Cheap to clone; vectors built against a schema share its name list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureSchema {
    names: Arc<[String]>,
}

impl FeatureSchema {
    pub fn new(names: Vec<String>) -> Self {
        Self {
            names: names.into(),
        }
    }

    /// Feature names in model order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }
}

impl<S: Into<String>> FromIterator<S> for FeatureSchema {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter.into_iter().map(Into::into).collect())
    }
}

/// A frame's values laid out in schema order.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    schema: FeatureSchema,
    values: Vec<f64>,
}

impl FeatureVector {
    /// The schema this vector was built against.
    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// Feature names, in schema order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.schema.names().iter().map(String::as_str)
    }

    /// Feature values, in schema order.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Value of a named feature, if the schema contains it.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.schema
            .names()
            .iter()
            .position(|n| n == name)
            .map(|i| self.values[i])
    }

    /// `(name, value)` pairs in schema order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.keys().zip(self.values.iter().copied())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Whether this vector's keys are exactly `schema`, in the same order.
    pub fn matches(&self, schema: &FeatureSchema) -> bool {
        Arc::ptr_eq(&self.schema.names, &schema.names) || self.schema == *schema
    }
}

impl Serialize for FeatureVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (name, value) in self.iter() {
            map.serialize_entry(name, &value)?;
        }
        map.end()
    }
}

/// Where a schema key takes its value from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FeatureSource {
    HeartRate,
    BreathRate,
    HeartWaveform(usize),
    BreathWaveform(usize),
    Absent,
}

impl FeatureSource {
    fn resolve(name: &str) -> Self {
        if name == HEART_RATE {
            return FeatureSource::HeartRate;
        }
        if name == BREATH_RATE {
            return FeatureSource::BreathRate;
        }
        if let Some(i) = name.strip_prefix(HEART_WAVEFORM_PREFIX).and_then(parse_index) {
            return FeatureSource::HeartWaveform(i);
        }
        if let Some(i) = name.strip_prefix(BREATH_WAVEFORM_PREFIX).and_then(parse_index) {
            return FeatureSource::BreathWaveform(i);
        }
        FeatureSource::Absent
    }

    fn read(self, frame: &VitalsFrame) -> Option<f64> {
        match self {
            FeatureSource::HeartRate => frame.heart_rate,
            FeatureSource::BreathRate => frame.breath_rate,
            FeatureSource::HeartWaveform(i) => frame.heart_waveform.get(i).copied(),
            FeatureSource::BreathWaveform(i) => frame.breath_waveform.get(i).copied(),
            FeatureSource::Absent => None,
        }
    }
}

/// Parse a canonical decimal index (`"7"`, not `"07"` or `"+7"`).
fn parse_index(digits: &str) -> Option<usize> {
    let canonical = digits == "0" || (!digits.starts_with('0') && !digits.is_empty());
    if !canonical || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Lay a frame out against the model schema.
pub fn vectorize(frame: &VitalsFrame, schema: &FeatureSchema) -> FeatureVector {
    let values = schema
        .names()
        .iter()
        .map(|name| FeatureSource::resolve(name).read(frame).unwrap_or(0.0))
        .collect();

    FeatureVector {
        schema: schema.clone(),
        values,
    }
}

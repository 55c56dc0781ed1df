//! Vitals frame extraction from parsed sensor output.
//!
//! A sensor output file is a JSON object with a `data` array. Each entry may
//! carry a `frameData.vitals` record; entries without one are skipped.
//!
//! ```text
//! { "data": [ { "frameData": { "vitals": { "heartRate": 71.2, ... } } }, ... ] }
//! ```

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

/// One biometric reading taken from a sensor output entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VitalsFrame {
    /// Heart rate reported by the sensor itself (bpm)
    #[serde(default)]
    pub heart_rate: Option<f64>,
    /// Breath rate reported by the sensor (breaths/min)
    #[serde(default)]
    pub breath_rate: Option<f64>,
    /// Heart waveform samples, in capture order
    #[serde(default, deserialize_with = "null_as_empty")]
    pub heart_waveform: Vec<f64>,
    /// Breath waveform samples, in capture order
    #[serde(default, deserialize_with = "null_as_empty")]
    pub breath_waveform: Vec<f64>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<f64>>::deserialize(deserializer)?.unwrap_or_default())
}

/// A frame together with the position of the entry it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedFrame {
    /// Index of the entry inside the `data` array
    pub entry_index: usize,
    pub frame: VitalsFrame,
}

/// Errors raised while walking a parsed sensor document.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The document itself does not have the expected layout.
    #[error("unexpected document shape: {0}")]
    DocumentShape(String),

    /// A single entry of the `data` array has the wrong layout.
    #[error("entry {index}: unexpected shape: {reason}")]
    EntryShape { index: usize, reason: String },

    /// A vitals record could not be decoded.
    #[error("entry {index}: malformed vitals record: {source}")]
    MalformedVitals {
        index: usize,
        #[source]
        source: serde_json::Error,
    },
}

impl ExtractError {
    /// Whether the error invalidates the whole file rather than one entry.
    pub fn is_fatal_for_file(&self) -> bool {
        matches!(self, ExtractError::DocumentShape(_))
    }
}

/// Lazy, single-pass iterator over the vitals frames of a document.
pub struct Frames<'a> {
    entries: std::iter::Enumerate<std::slice::Iter<'a, Value>>,
}

impl<'a> Iterator for Frames<'a> {
    type Item = Result<ExtractedFrame, ExtractError>;

    fn next(&mut self) -> Option<Self::Item> {
        for (index, entry) in self.entries.by_ref() {
            match vitals_of(index, entry) {
                Ok(None) => continue,
                Ok(Some(vitals)) => {
                    return Some(
                        VitalsFrame::deserialize(vitals)
                            .map(|frame| ExtractedFrame {
                                entry_index: index,
                                frame,
                            })
                            .map_err(|source| ExtractError::MalformedVitals { index, source }),
                    );
                }
                Err(e) => return Some(Err(e)),
            }
        }
        None
    }
}

/// Start walking a parsed document.
///
/// Only the top-level layout is checked here. Entries are inspected as the
/// returned iterator is advanced, so per-entry problems surface as `Err`
/// items without stopping the entries that follow.
pub fn extract_frames(document: &Value) -> Result<Frames<'_>, ExtractError> {
    let root = document.as_object().ok_or_else(|| {
        ExtractError::DocumentShape(format!(
            "expected a JSON object at the top level, found {}",
            kind_of(document)
        ))
    })?;

    static EMPTY: [Value; 0] = [];
    let entries: &[Value] = match root.get("data") {
        None => &EMPTY,
        Some(Value::Array(items)) => items,
        Some(other) => {
            return Err(ExtractError::DocumentShape(format!(
                "`data` must be an array, found {}",
                kind_of(other)
            )))
        }
    };

    Ok(Frames {
        entries: entries.iter().enumerate(),
    })
}

/// Locate the vitals record of one entry, if it has a usable one.
fn vitals_of(index: usize, entry: &Value) -> Result<Option<&Value>, ExtractError> {
    let entry = entry.as_object().ok_or_else(|| ExtractError::EntryShape {
        index,
        reason: format!("expected an object, found {}", kind_of(entry)),
    })?;

    let frame_data = match entry.get("frameData") {
        None => return Ok(None),
        Some(Value::Object(frame_data)) => frame_data,
        Some(other) => {
            return Err(ExtractError::EntryShape {
                index,
                reason: format!("`frameData` must be an object, found {}", kind_of(other)),
            })
        }
    };

    match frame_data.get("vitals") {
        Some(vitals) if !is_falsy(vitals) => Ok(Some(vitals)),
        _ => Ok(None),
    }
}

/// Null, `false`, zero, and empty strings, arrays or objects.
fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(record) => record.is_empty(),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

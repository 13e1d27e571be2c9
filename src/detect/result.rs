use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::geometry::BoundingBox;

/// A normalized object detection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    pub bbox: BoundingBox,
    /// Confidence in `[0, 1]`, rounded to two decimals on normalization.
    pub score: f32,
    /// Estimated distance in centimeters. `None` until the pipeline annotates it.
    pub distance_cm: Option<f64>,
}

impl Detection {
    pub fn new(label: impl Into<String>, bbox: BoundingBox, score: f32) -> Self {
        Self {
            label: label.into(),
            bbox,
            score,
            distance_cm: None,
        }
    }
}

/// Identity/liveness status of a face. Only `Unknown` is produced today.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaceStatus {
    #[default]
    Unknown,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceDetection {
    pub bbox: BoundingBox,
    pub status: FaceStatus,
}

/// Recognized text. Serialized as a bare string.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TextResult {
    pub text: String,
}

impl From<String> for TextResult {
    fn from(text: String) -> Self {
        Self { text }
    }
}

/// Scene description for a single frame.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameResult {
    pub objects: Vec<Detection>,
    pub texts: Vec<TextResult>,
    pub faces: Vec<FaceDetection>,
    /// Distance in meters keyed by label, serialized with keys sorted. When
    /// several objects share a label the last one processed wins; per-object
    /// values live on `objects`.
    pub distances: BTreeMap<String, f64>,
}

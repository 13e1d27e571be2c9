//! Fusion pipeline: one frame in, one [`FrameResult`] out.
//!
//! The three collaborators run independently on the same frame. Their
//! outputs are normalized, objects are deduplicated and annotated with
//! distances. A collaborator error fails the whole frame; a bad distance
//! estimate never does (see [`crate::distance`]).

use anyhow::{Context, Result};
use image::RgbImage;
use std::collections::BTreeMap;

use crate::config::SceneConfig;
use crate::dedup::deduplicate;
use crate::detect::backends;
use crate::detect::{
    Detection, FaceDetection, FaceDetector, FaceRect, FaceStatus, FrameResult, ObjectDetector,
    RawDetection, TextRecognizer, TextResult,
};
use crate::distance::{round_to, DistanceEstimator};
use crate::frame::{decode_frame, grayscale};
use crate::geometry::BoundingBox;

pub const DEFAULT_INFERENCE_SIZE: u32 = 640;

pub struct FusionPipeline {
    detector: Box<dyn ObjectDetector>,
    recognizer: Box<dyn TextRecognizer>,
    faces: Box<dyn FaceDetector>,
    estimator: DistanceEstimator,
    inference_size: u32,
}

impl FusionPipeline {
    pub fn new(
        detector: Box<dyn ObjectDetector>,
        recognizer: Box<dyn TextRecognizer>,
        faces: Box<dyn FaceDetector>,
        estimator: DistanceEstimator,
    ) -> Self {
        Self {
            detector,
            recognizer,
            faces,
            estimator,
            inference_size: DEFAULT_INFERENCE_SIZE,
        }
    }

    /// Build collaborators and estimator from configuration.
    pub fn from_config(cfg: &SceneConfig) -> Result<Self> {
        let estimator = DistanceEstimator::new(cfg.reference_table()?, cfg.focal_length_px);
        log::info!(
            "distance estimator: {} reference widths, focal length {} px",
            estimator.table().len(),
            estimator.focal_length_px()
        );
        let pipeline = Self::new(
            backends::object_detector(&cfg.detector)?,
            backends::text_recognizer(),
            backends::face_detector(&cfg.faces)?,
            estimator,
        )
        .with_inference_size(cfg.detector.inference_size);
        Ok(pipeline)
    }

    pub fn with_inference_size(mut self, size: u32) -> Self {
        self.inference_size = size;
        self
    }

    pub fn estimator(&self) -> &DistanceEstimator {
        &self.estimator
    }

    /// Decode an encoded image and process it.
    pub fn process_encoded(&mut self, bytes: &[u8]) -> Result<FrameResult> {
        let frame = decode_frame(bytes)?;
        self.process(&frame)
    }

    /// Run all collaborators on `image` and fuse their outputs.
    pub fn process(&mut self, image: &RgbImage) -> Result<FrameResult> {
        let raw = self
            .detector
            .detect(image, self.inference_size)
            .with_context(|| format!("object detector '{}' failed", self.detector.name()))?;
        let mut objects = deduplicate(normalize_detections(raw));

        let texts: Vec<TextResult> = self
            .recognizer
            .read(image)
            .with_context(|| format!("text recognizer '{}' failed", self.recognizer.name()))?
            .into_iter()
            .map(TextResult::from)
            .collect();

        let gray = grayscale(image);
        let faces = normalize_faces(
            self.faces
                .detect(&gray)
                .with_context(|| format!("face detector '{}' failed", self.faces.name()))?,
        );

        let mut distances = BTreeMap::new();
        for object in &mut objects {
            let estimate = self
                .estimator
                .estimate(&object.label, &object.bbox, image.height());
            object.distance_cm = Some(estimate.cm);
            distances.insert(object.label.clone(), estimate.meters());
        }

        log::debug!(
            "frame {}x{}: {} objects, {} texts, {} faces",
            image.width(),
            image.height(),
            objects.len(),
            texts.len(),
            faces.len()
        );

        Ok(FrameResult {
            objects,
            texts,
            faces,
            distances,
        })
    }
}

/// Raw detector triples → [`Detection`] records in detector order.
///
/// Float corners truncate to integer pixels; scores clamp to `[0, 1]` and
/// round to two decimals.
pub fn normalize_detections(raw: Vec<RawDetection>) -> Vec<Detection> {
    raw.into_iter()
        .map(|det| {
            let score = if det.score.is_finite() {
                round_to(det.score.clamp(0.0, 1.0) as f64, 2) as f32
            } else {
                0.0
            };
            Detection::new(det.label, BoundingBox::from_f32(det.bbox), score)
        })
        .collect()
}

/// `(x, y, w, h)` rectangles → `[x1, y1, x2, y2]` faces with unknown status.
pub fn normalize_faces(rects: Vec<FaceRect>) -> Vec<FaceDetection> {
    rects
        .into_iter()
        .map(|r| FaceDetection {
            bbox: BoundingBox::from_xywh(r.x, r.y, r.w, r.h),
            status: FaceStatus::Unknown,
        })
        .collect()
}

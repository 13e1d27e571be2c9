pub mod stub;

#[cfg(feature = "backend-tract")]
pub mod tract;

pub use stub::{StubFaceDetector, StubObjectDetector, StubTextRecognizer};

#[cfg(feature = "backend-tract")]
pub use tract::{TractFaceDetector, TractObjectDetector};

use anyhow::Result;

use crate::config::{DetectorSettings, FaceSettings};
use crate::detect::backend::{FaceDetector, ObjectDetector, TextRecognizer};

/// Build the configured object detector. No model path yields an empty stub.
pub fn object_detector(settings: &DetectorSettings) -> Result<Box<dyn ObjectDetector>> {
    let Some(model_path) = &settings.model_path else {
        log::warn!("no detector model configured; object detection disabled");
        return Ok(Box::new(StubObjectDetector::default()));
    };
    load_object_detector(settings, model_path)
}

#[cfg(feature = "backend-tract")]
fn load_object_detector(
    settings: &DetectorSettings,
    model_path: &std::path::Path,
) -> Result<Box<dyn ObjectDetector>> {
    let class_names = match &settings.class_names_path {
        Some(path) => tract::load_class_names(path)?,
        None => tract::COCO_CLASS_NAMES.iter().map(|s| s.to_string()).collect(),
    };
    let mut detector = TractObjectDetector::new(model_path, settings.inference_size, class_names)?
        .with_threshold(settings.confidence_threshold);
    detector.warm_up()?;
    log::info!("object detector loaded from {}", model_path.display());
    Ok(Box::new(detector))
}

#[cfg(not(feature = "backend-tract"))]
fn load_object_detector(
    _settings: &DetectorSettings,
    model_path: &std::path::Path,
) -> Result<Box<dyn ObjectDetector>> {
    Err(anyhow::anyhow!(
        "detector model {} configured but built without the backend-tract feature",
        model_path.display()
    ))
}

/// Build the configured face detector. No model path yields an empty stub.
pub fn face_detector(settings: &FaceSettings) -> Result<Box<dyn FaceDetector>> {
    let Some(model_path) = &settings.model_path else {
        log::warn!("no face model configured; face detection disabled");
        return Ok(Box::new(StubFaceDetector::default()));
    };
    load_face_detector(settings, model_path)
}

#[cfg(feature = "backend-tract")]
fn load_face_detector(
    settings: &FaceSettings,
    model_path: &std::path::Path,
) -> Result<Box<dyn FaceDetector>> {
    let detector =
        TractFaceDetector::new(model_path)?.with_threshold(settings.confidence_threshold);
    log::info!("face detector loaded from {}", model_path.display());
    Ok(Box::new(detector))
}

#[cfg(not(feature = "backend-tract"))]
fn load_face_detector(
    _settings: &FaceSettings,
    model_path: &std::path::Path,
) -> Result<Box<dyn FaceDetector>> {
    Err(anyhow::anyhow!(
        "face model {} configured but built without the backend-tract feature",
        model_path.display()
    ))
}

/// Text recognition has no model backend; frames report no text.
pub fn text_recognizer() -> Box<dyn TextRecognizer> {
    log::warn!("no text recognizer available; text recognition disabled");
    Box::new(StubTextRecognizer::default())
}

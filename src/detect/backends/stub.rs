use anyhow::Result;
use image::{GrayImage, RgbImage};

use crate::detect::backend::{FaceDetector, FaceRect, ObjectDetector, RawDetection, TextRecognizer};

/// Stub object detector. Returns the same detections for every frame.
#[derive(Clone, Debug, Default)]
pub struct StubObjectDetector {
    detections: Vec<RawDetection>,
}

impl StubObjectDetector {
    pub fn new(detections: Vec<RawDetection>) -> Self {
        Self { detections }
    }
}

impl ObjectDetector for StubObjectDetector {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, _image: &RgbImage, _inference_size: u32) -> Result<Vec<RawDetection>> {
        Ok(self.detections.clone())
    }
}

/// Stub text recognizer. Returns the same strings for every frame.
#[derive(Clone, Debug, Default)]
pub struct StubTextRecognizer {
    texts: Vec<String>,
}

impl StubTextRecognizer {
    pub fn new<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            texts: texts.into_iter().map(Into::into).collect(),
        }
    }
}

impl TextRecognizer for StubTextRecognizer {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn read(&mut self, _image: &RgbImage) -> Result<Vec<String>> {
        Ok(self.texts.clone())
    }
}

/// Stub face detector. Returns the same rectangles for every frame.
#[derive(Clone, Debug, Default)]
pub struct StubFaceDetector {
    faces: Vec<FaceRect>,
}

impl StubFaceDetector {
    pub fn new(faces: Vec<FaceRect>) -> Self {
        Self { faces }
    }
}

impl FaceDetector for StubFaceDetector {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, _image: &GrayImage) -> Result<Vec<FaceRect>> {
        Ok(self.faces.clone())
    }
}

use anyhow::Result;
use image::{GrayImage, RgbImage};

/// Raw detector output before normalization.
#[derive(Clone, Debug, PartialEq)]
pub struct RawDetection {
    pub label: String,
    /// `[x1, y1, x2, y2]` in frame pixels.
    pub bbox: [f32; 4],
    pub score: f32,
}

impl RawDetection {
    pub fn new(label: impl Into<String>, bbox: [f32; 4], score: f32) -> Self {
        Self {
            label: label.into(),
            bbox,
            score,
        }
    }
}

/// Raw face rectangle in frame pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FaceRect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl FaceRect {
    pub fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }
}

/// Object detector collaborator.
///
/// Returns zero or more detections in frame pixel coordinates, in no
/// particular order. Models are loaded once and reused across frames; the
/// pipeline holds `&mut` access, so implementations need not be reentrant.
pub trait ObjectDetector: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on an RGB frame. `inference_size` is the long-edge
    /// resolution the model should see.
    fn detect(&mut self, image: &RgbImage, inference_size: u32) -> Result<Vec<RawDetection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Text recognizer collaborator. Returns recognized strings in reading order.
pub trait TextRecognizer: Send {
    fn name(&self) -> &'static str;

    fn read(&mut self, image: &RgbImage) -> Result<Vec<String>>;
}

/// Face detector collaborator. Operates on the grayscale frame.
pub trait FaceDetector: Send {
    fn name(&self) -> &'static str;

    fn detect(&mut self, image: &GrayImage) -> Result<Vec<FaceRect>>;
}

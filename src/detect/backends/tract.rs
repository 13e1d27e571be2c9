#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::FilterType;
use image::{GrayImage, Rgb, RgbImage};
use tract_onnx::prelude::*;

use crate::detect::backend::{FaceDetector, FaceRect, ObjectDetector, RawDetection};
use crate::geometry::iou;

type Plan = TypedRunnableModel<TypedModel>;

const LETTERBOX_FILL: u8 = 114;
const DETECTOR_NMS_IOU: f64 = 0.45;
const FACE_NMS_IOU: f64 = 0.3;
const FACE_INPUT_WIDTH: u32 = 320;
const FACE_INPUT_HEIGHT: u32 = 240;

/// Class vocabulary of the stock YOLOv8 COCO checkpoints, in model order.
pub const COCO_CLASS_NAMES: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich",
    "orange", "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch",
    "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote",
    "keyboard", "cell phone", "microwave", "oven", "toaster", "sink", "refrigerator", "book",
    "clock", "vase", "scissors", "teddy bear", "hair drier", "toothbrush",
];

/// Read class names, one per line. Blank lines are skipped.
pub fn load_class_names(path: &Path) -> Result<Vec<String>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read class names from {}", path.display()))?;
    let names: Vec<String> = raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();
    if names.is_empty() {
        return Err(anyhow!("class names file {} is empty", path.display()));
    }
    Ok(names)
}

fn load_plan(model_path: &Path, width: u32, height: u32) -> Result<Plan> {
    tract_onnx::onnx()
        .model_for_path(model_path)
        .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
        .with_input_fact(
            0,
            InferenceFact::dt_shape(
                f32::datum_type(),
                tvec!(1, 3, height as usize, width as usize),
            ),
        )
        .context("failed to set input fact")?
        .into_optimized()
        .context("failed to optimize ONNX model")?
        .into_runnable()
        .context("failed to build runnable ONNX model")
}

fn rgb_tensor(image: &RgbImage, normalize: impl Fn(u8) -> f32) -> Tensor {
    let (width, height) = image.dimensions();
    tract_ndarray::Array4::from_shape_fn(
        (1, 3, height as usize, width as usize),
        |(_, channel, y, x)| normalize(image.get_pixel(x as u32, y as u32)[channel]),
    )
    .into_tensor()
}

/// Scale so the long edge fits `size`, pad right and bottom.
/// Returns the padded square and the scale ratio applied.
fn letterbox(image: &RgbImage, size: u32) -> (RgbImage, f32) {
    let (width, height) = image.dimensions();
    let ratio = (size as f32 / width.max(1) as f32).min(size as f32 / height.max(1) as f32);
    let new_w = ((width as f32 * ratio).round() as u32).clamp(1, size);
    let new_h = ((height as f32 * ratio).round() as u32).clamp(1, size);
    let resized = image::imageops::resize(image, new_w, new_h, FilterType::Triangle);
    let mut canvas = RgbImage::from_pixel(size, size, Rgb([LETTERBOX_FILL; 3]));
    image::imageops::replace(&mut canvas, &resized, 0, 0);
    (canvas, ratio)
}

#[derive(Clone, Copy, Debug)]
struct Candidate {
    class_id: usize,
    bbox: [f32; 4],
    score: f32,
}

/// Class-wise non-maximum suppression, highest score first.
fn non_max_suppression(mut candidates: Vec<Candidate>, iou_threshold: f64) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
    let mut kept: Vec<Candidate> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let suppressed = kept.iter().any(|k| {
            k.class_id == candidate.class_id
                && iou(k.bbox.map(f64::from), candidate.bbox.map(f64::from)) > iou_threshold
        });
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}

/// YOLOv8 ONNX object detector.
///
/// Expects the stock export layout `[1, 4 + classes, anchors]` with
/// `cx, cy, w, h` followed by per-class scores; the transposed
/// `[1, anchors, 4 + classes]` layout is accepted too.
pub struct TractObjectDetector {
    plan: Plan,
    size: u32,
    class_names: Vec<String>,
    confidence_threshold: f32,
}

impl TractObjectDetector {
    pub fn new<P: AsRef<Path>>(model_path: P, size: u32, class_names: Vec<String>) -> Result<Self> {
        let plan = load_plan(model_path.as_ref(), size, size)?;
        Ok(Self {
            plan,
            size,
            class_names,
            confidence_threshold: 0.25,
        })
    }

    /// Override the default confidence threshold.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    fn label(&self, class_id: usize) -> String {
        self.class_names
            .get(class_id)
            .cloned()
            .unwrap_or_else(|| format!("class_{class_id}"))
    }

    fn decode(&self, output: &Tensor, ratio: f32, frame_w: u32, frame_h: u32) -> Result<Vec<Candidate>> {
        let view = output
            .to_array_view::<f32>()
            .context("detector output tensor was not f32")?;
        let shape = view.shape().to_vec();
        if shape.len() != 3 || shape[0] != 1 {
            return Err(anyhow!("unexpected detector output shape {:?}", shape));
        }
        // Anchors outnumber fields in every real export.
        let transposed = shape[1] > shape[2];
        let (fields, anchors) = if transposed {
            (shape[2], shape[1])
        } else {
            (shape[1], shape[2])
        };
        if fields < 5 {
            return Err(anyhow!("detector output has {} fields per anchor", fields));
        }
        let at = |field: usize, anchor: usize| {
            if transposed {
                view[[0, anchor, field]]
            } else {
                view[[0, field, anchor]]
            }
        };

        let ratio = ratio.max(f32::EPSILON);
        let max_x = frame_w as f32;
        let max_y = frame_h as f32;
        let mut candidates = Vec::new();
        for anchor in 0..anchors {
            let (class_id, score) = (0..fields - 4)
                .map(|c| (c, at(4 + c, anchor)))
                .fold((0, f32::NEG_INFINITY), |best, cur| {
                    if cur.1 > best.1 {
                        cur
                    } else {
                        best
                    }
                });
            if !(score >= self.confidence_threshold) {
                continue;
            }
            let (cx, cy, w, h) = (at(0, anchor), at(1, anchor), at(2, anchor), at(3, anchor));
            let bbox = [
                ((cx - w / 2.0) / ratio).clamp(0.0, max_x),
                ((cy - h / 2.0) / ratio).clamp(0.0, max_y),
                ((cx + w / 2.0) / ratio).clamp(0.0, max_x),
                ((cy + h / 2.0) / ratio).clamp(0.0, max_y),
            ];
            candidates.push(Candidate {
                class_id,
                bbox,
                score,
            });
        }
        Ok(candidates)
    }
}

impl ObjectDetector for TractObjectDetector {
    fn name(&self) -> &'static str {
        "tract-yolov8"
    }

    fn detect(&mut self, image: &RgbImage, inference_size: u32) -> Result<Vec<RawDetection>> {
        if inference_size != self.size {
            return Err(anyhow!(
                "inference size {} does not match model input {}",
                inference_size,
                self.size
            ));
        }
        let (frame_w, frame_h) = image.dimensions();
        let (input, ratio) = letterbox(image, self.size);
        let tensor = rgb_tensor(&input, |v| v as f32 / 255.0);
        let outputs = self
            .plan
            .run(tvec!(tensor.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let candidates = self.decode(output, ratio, frame_w, frame_h)?;
        Ok(non_max_suppression(candidates, DETECTOR_NMS_IOU)
            .into_iter()
            .map(|c| RawDetection::new(self.label(c.class_id), c.bbox, c.score))
            .collect())
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = RgbImage::new(self.size, self.size);
        let size = self.size;
        self.detect(&blank, size).map(|_| ())
    }
}

/// UltraFace-style ONNX face detector (320x240 input).
///
/// Outputs are `scores [1, N, 2]` (background, face) and `boxes [1, N, 4]`
/// as normalized corners.
pub struct TractFaceDetector {
    plan: Plan,
    confidence_threshold: f32,
}

impl TractFaceDetector {
    pub fn new<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        let plan = load_plan(model_path.as_ref(), FACE_INPUT_WIDTH, FACE_INPUT_HEIGHT)?;
        Ok(Self {
            plan,
            confidence_threshold: 0.7,
        })
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }
}

impl FaceDetector for TractFaceDetector {
    fn name(&self) -> &'static str {
        "tract-ultraface"
    }

    fn detect(&mut self, image: &GrayImage) -> Result<Vec<FaceRect>> {
        let (frame_w, frame_h) = image.dimensions();
        let rgb = RgbImage::from_fn(frame_w, frame_h, |x, y| {
            let v = image.get_pixel(x, y)[0];
            Rgb([v, v, v])
        });
        let input = image::imageops::resize(&rgb, FACE_INPUT_WIDTH, FACE_INPUT_HEIGHT, FilterType::Triangle);
        let tensor = rgb_tensor(&input, |v| (v as f32 - 127.0) / 128.0);
        let outputs = self
            .plan
            .run(tvec!(tensor.into()))
            .context("ONNX inference failed")?;

        let mut scores = None;
        let mut boxes = None;
        for output in outputs.iter() {
            let view = output
                .to_array_view::<f32>()
                .context("face output tensor was not f32")?;
            match view.shape() {
                [1, _, 2] => scores = Some(view),
                [1, _, 4] => boxes = Some(view),
                other => return Err(anyhow!("unexpected face output shape {:?}", other)),
            }
        }
        let scores = scores.ok_or_else(|| anyhow!("face model produced no scores"))?;
        let boxes = boxes.ok_or_else(|| anyhow!("face model produced no boxes"))?;
        if scores.shape()[1] != boxes.shape()[1] {
            return Err(anyhow!("face scores and boxes disagree on anchor count"));
        }

        let (fw, fh) = (frame_w as f32, frame_h as f32);
        let candidates = (0..scores.shape()[1])
            .filter(|&i| scores[[0, i, 1]] >= self.confidence_threshold)
            .map(|i| Candidate {
                class_id: 0,
                bbox: [
                    (boxes[[0, i, 0]] * fw).clamp(0.0, fw),
                    (boxes[[0, i, 1]] * fh).clamp(0.0, fh),
                    (boxes[[0, i, 2]] * fw).clamp(0.0, fw),
                    (boxes[[0, i, 3]] * fh).clamp(0.0, fh),
                ],
                score: scores[[0, i, 1]],
            })
            .collect();

        Ok(non_max_suppression(candidates, FACE_NMS_IOU)
            .into_iter()
            .map(|c| {
                let [x1, y1, x2, y2] = c.bbox.map(|v| v as i32);
                FaceRect::new(x1, y1, x2 - x1, y2 - y1)
            })
            .collect())
    }
}

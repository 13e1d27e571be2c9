//! Scene fusion
//!
//! Turns a single camera frame into a scene description: deduplicated object
//! detections with an estimated distance each, recognized text, and face
//! boxes.
//!
//! # Module Structure
//!
//! - `geometry`: pixel bounding boxes and IoU
//! - `reference`: label → real-world width table
//! - `dedup`: same-label duplicate suppression
//! - `distance`: pinhole / height-proxy distance estimation
//! - `detect`: collaborator traits, result types, stub and model backends
//! - `pipeline`: fusion of detector, text recognizer and face detector output
//! - `frame`: image decoding at the service boundary
//! - `api`: HTTP service around the pipeline
//! - `config`: file + environment configuration

pub mod api;
pub mod config;
pub mod dedup;
pub mod detect;
pub mod distance;
pub mod frame;
pub mod geometry;
pub mod pipeline;
pub mod reference;

pub use dedup::{deduplicate, DUPLICATE_IOU_THRESHOLD};
pub use detect::{
    Detection, FaceDetection, FaceDetector, FaceRect, FaceStatus, FrameResult, ObjectDetector,
    RawDetection, StubFaceDetector, StubObjectDetector, StubTextRecognizer, TextRecognizer,
    TextResult,
};
pub use distance::{DistanceEstimate, DistanceEstimator, EstimateSource, DEFAULT_FOCAL_LENGTH_PX};
pub use geometry::{iou, BoundingBox};
pub use pipeline::FusionPipeline;
pub use reference::ReferenceWidthTable;

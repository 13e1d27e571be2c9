mod backend;
pub mod backends;
mod result;

pub use backend::{FaceDetector, FaceRect, ObjectDetector, RawDetection, TextRecognizer};
pub use backends::{StubFaceDetector, StubObjectDetector, StubTextRecognizer};
pub use result::{Detection, FaceDetection, FaceStatus, FrameResult, TextResult};

use anyhow::{anyhow, Result};
use image::{GrayImage, RgbImage};

use scene_fusion::{
    DistanceEstimator, FaceDetector, FaceRect, FaceStatus, FusionPipeline, ObjectDetector,
    RawDetection, ReferenceWidthTable, StubFaceDetector, StubObjectDetector, StubTextRecognizer,
    TextRecognizer, DEFAULT_FOCAL_LENGTH_PX,
};

fn pipeline_with(
    detections: Vec<RawDetection>,
    texts: Vec<&str>,
    faces: Vec<FaceRect>,
) -> FusionPipeline {
    FusionPipeline::new(
        Box::new(StubObjectDetector::new(detections)),
        Box::new(StubTextRecognizer::new(texts)),
        Box::new(StubFaceDetector::new(faces)),
        DistanceEstimator::default(),
    )
}

struct FailingDetector;

impl ObjectDetector for FailingDetector {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn detect(&mut self, _image: &RgbImage, _inference_size: u32) -> Result<Vec<RawDetection>> {
        Err(anyhow!("model crashed"))
    }
}

struct FailingRecognizer;

impl TextRecognizer for FailingRecognizer {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn read(&mut self, _image: &RgbImage) -> Result<Vec<String>> {
        Err(anyhow!("ocr unavailable"))
    }
}

struct GrayProbe;

impl FaceDetector for GrayProbe {
    fn name(&self) -> &'static str {
        "gray-probe"
    }

    fn detect(&mut self, image: &GrayImage) -> Result<Vec<FaceRect>> {
        // Report the whole frame so the test can check dimensions survive.
        Ok(vec![FaceRect::new(
            0,
            0,
            image.width() as i32,
            image.height() as i32,
        )])
    }
}

#[test]
fn overlapping_pens_collapse_to_one_object() -> Result<()> {
    // pen boxes: IoU = 80*100 / (100*100) = 0.8
    let mut pipeline = pipeline_with(
        vec![
            RawDetection::new("pen", [100.0, 100.0, 200.0, 200.0], 0.91),
            RawDetection::new("pen", [100.0, 100.0, 180.0, 200.0], 0.85),
            RawDetection::new("notebook small", [400.0, 50.0, 570.0, 300.0], 0.77),
        ],
        vec![],
        vec![],
    );
    let frame = RgbImage::new(640, 480);

    let result = pipeline.process(&frame)?;

    assert_eq!(result.objects.len(), 2);
    assert!(result.objects.iter().all(|o| o.distance_cm.is_some()));
    assert_eq!(result.distances.len(), 2);

    let pen = &result.objects[0];
    assert_eq!(pen.label, "pen");
    assert_eq!(pen.score, 0.91);
    // 1.0 cm * 850 px / 100 px
    assert_eq!(pen.distance_cm, Some(8.5));
    assert_eq!(result.distances["pen"], 0.09);

    let notebook = &result.objects[1];
    // 15.0 cm * 850 px / 170 px
    assert_eq!(notebook.distance_cm, Some(75.0));
    assert_eq!(result.distances["notebook small"], 0.75);
    Ok(())
}

#[test]
fn unknown_labels_use_height_proxy() -> Result<()> {
    let mut pipeline = pipeline_with(
        vec![RawDetection::new("person", [10.0, 100.0, 60.0, 200.0], 0.6)],
        vec![],
        vec![],
    );
    let frame = RgbImage::new(800, 1000);

    let result = pipeline.process(&frame)?;
    assert_eq!(result.objects[0].distance_cm, Some(1500.0));
    assert_eq!(result.distances["person"], 15.0);
    Ok(())
}

#[test]
fn empty_collaborators_yield_empty_result() -> Result<()> {
    let mut pipeline = pipeline_with(vec![], vec![], vec![]);
    let result = pipeline.process(&RgbImage::new(32, 32))?;
    assert!(result.objects.is_empty());
    assert!(result.texts.is_empty());
    assert!(result.faces.is_empty());
    assert!(result.distances.is_empty());
    Ok(())
}

#[test]
fn texts_and_faces_are_normalized() -> Result<()> {
    let mut pipeline = pipeline_with(
        vec![],
        vec!["EXIT", "Room 101"],
        vec![FaceRect::new(50, 60, 40, 45)],
    );
    let result = pipeline.process(&RgbImage::new(320, 240))?;

    let texts: Vec<&str> = result.texts.iter().map(|t| t.text.as_str()).collect();
    assert_eq!(texts, vec!["EXIT", "Room 101"]);
    assert_eq!(result.faces.len(), 1);
    assert_eq!(<[i32; 4]>::from(result.faces[0].bbox), [50, 60, 90, 105]);
    assert_eq!(result.faces[0].status, FaceStatus::Unknown);
    Ok(())
}

#[test]
fn face_detector_receives_grayscale_frame() -> Result<()> {
    let mut pipeline = FusionPipeline::new(
        Box::new(StubObjectDetector::default()),
        Box::new(StubTextRecognizer::default()),
        Box::new(GrayProbe),
        DistanceEstimator::default(),
    );
    let result = pipeline.process(&RgbImage::new(64, 48))?;
    assert_eq!(<[i32; 4]>::from(result.faces[0].bbox), [0, 0, 64, 48]);
    Ok(())
}

#[test]
fn degenerate_boxes_never_produce_non_finite_distances() -> Result<()> {
    let mut pipeline = pipeline_with(
        vec![
            RawDetection::new("ruler", [50.0, 50.0, 50.0, 50.0], 0.5),
            RawDetection::new("mystery", [10.0, 10.0, 10.0, 10.0], 0.5),
            RawDetection::new("mystery", [f32::NAN, 0.0, f32::INFINITY, 5.0], 0.5),
        ],
        vec![],
        vec![],
    );
    let result = pipeline.process(&RgbImage::new(16, 16))?;
    for object in &result.objects {
        let cm = object.distance_cm.expect("annotated");
        assert!(cm.is_finite() && cm > 0.0, "{}: {}", object.label, cm);
    }
    assert!(result.distances.values().all(|m| m.is_finite()));
    Ok(())
}

#[test]
fn boxes_spanning_the_coordinate_range_are_handled() -> Result<()> {
    let mut pipeline = pipeline_with(
        vec![
            RawDetection::new("ruler", [-2.0e9, 0.0, 2.0e9, 10.0], 0.9),
            RawDetection::new("mystery", [0.0, -2.0e9, 10.0, 2.0e9], 0.9),
        ],
        vec![],
        vec![],
    );
    let result = pipeline.process(&RgbImage::new(64, 64))?;
    assert_eq!(result.objects.len(), 2);
    // 30 cm * 850 px / 4e9 px rounds to zero.
    assert_eq!(result.objects[0].distance_cm, Some(0.0));
    let proxy = result.objects[1].distance_cm.expect("annotated");
    assert!(proxy.is_finite() && proxy >= 0.0);
    assert!(result.distances.values().all(|m| m.is_finite()));
    Ok(())
}

#[test]
fn collaborator_failures_propagate() {
    let mut pipeline = FusionPipeline::new(
        Box::new(FailingDetector),
        Box::new(StubTextRecognizer::default()),
        Box::new(StubFaceDetector::default()),
        DistanceEstimator::default(),
    );
    let err = pipeline.process(&RgbImage::new(8, 8)).unwrap_err();
    assert!(format!("{err:#}").contains("model crashed"));

    let mut pipeline = FusionPipeline::new(
        Box::new(StubObjectDetector::default()),
        Box::new(FailingRecognizer),
        Box::new(StubFaceDetector::default()),
        DistanceEstimator::default(),
    );
    let err = pipeline.process(&RgbImage::new(8, 8)).unwrap_err();
    assert!(format!("{err:#}").contains("text recognizer 'failing' failed"));
}

#[test]
fn injected_table_and_focal_length_are_used() -> Result<()> {
    let table = ReferenceWidthTable::empty().with_entry("widget", 12.0);
    let mut pipeline = FusionPipeline::new(
        Box::new(StubObjectDetector::new(vec![
            RawDetection::new("widget", [0.0, 0.0, 60.0, 30.0], 0.9),
            RawDetection::new("ruler", [100.0, 0.0, 400.0, 30.0], 0.9),
        ])),
        Box::new(StubTextRecognizer::default()),
        Box::new(StubFaceDetector::default()),
        DistanceEstimator::new(table, 500.0),
    );
    let result = pipeline.process(&RgbImage::new(640, 300))?;
    // 12 * 500 / 60
    assert_eq!(result.objects[0].distance_cm, Some(100.0));
    // "ruler" is not in the injected table: 3 / (30/300 + 0.1) * 100
    assert_eq!(result.objects[1].distance_cm, Some(1500.0));
    assert_ne!(DEFAULT_FOCAL_LENGTH_PX, 500.0);
    Ok(())
}

#[test]
fn process_encoded_rejects_malformed_images() {
    let mut pipeline = pipeline_with(vec![], vec![], vec![]);
    assert!(pipeline.process_encoded(b"\x89PNG but not really").is_err());
}

//! Same-label duplicate suppression.

use crate::detect::Detection;

/// Overlap above which two same-label detections are treated as one object.
pub const DUPLICATE_IOU_THRESHOLD: f64 = 0.5;

/// Drop detections that duplicate an already accepted detection.
///
/// Single greedy pass in input order: a candidate is dropped when an
/// accepted detection has the same label and IoU above
/// [`DUPLICATE_IOU_THRESHOLD`]. The first detection seen in each overlapping
/// cluster wins, whatever its score; sort by descending score beforehand for
/// highest-confidence-wins. Relative order of kept detections is preserved.
pub fn deduplicate(detections: Vec<Detection>) -> Vec<Detection> {
    let mut accepted: Vec<Detection> = Vec::with_capacity(detections.len());
    for candidate in detections {
        let duplicate = accepted.iter().any(|kept| {
            kept.label == candidate.label
                && kept.bbox.iou(&candidate.bbox) > DUPLICATE_IOU_THRESHOLD
        });
        if duplicate {
            log::debug!(
                "dropping duplicate '{}' at {:?}",
                candidate.label,
                candidate.bbox
            );
            continue;
        }
        accepted.push(candidate);
    }
    accepted
}

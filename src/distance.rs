//! Pixel box → distance estimation.
//!
//! Two branches, chosen explicitly:
//!
//! - **Reference width**: the label has a known real-world width, so the
//!   pinhole relation `distance = width_cm * focal_px / box_width_px` applies.
//!   Assumes the object roughly faces the camera.
//! - **Height proxy**: no usable width. `3 / (box_h / image_h + 0.1)` scaled
//!   to centimeters. This only rank-orders objects (taller on screen reads as
//!   closer); it is not a metric distance.
//!
//! Divisors are clamped to at least one pixel and non-finite intermediate
//! values route to the proxy, so an estimate is always a finite number.

use crate::geometry::BoundingBox;
use crate::reference::ReferenceWidthTable;

/// Default focal length in pixels. A single global calibration constant.
pub const DEFAULT_FOCAL_LENGTH_PX: f64 = 850.0;

const PROXY_HEIGHT_OFFSET: f64 = 0.1;
const PROXY_SCALE: f64 = 3.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EstimateSource {
    ReferenceWidth,
    HeightProxy,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DistanceEstimate {
    /// Distance in centimeters, one decimal place.
    pub cm: f64,
    pub source: EstimateSource,
}

impl DistanceEstimate {
    /// Distance in meters, two decimal places.
    pub fn meters(&self) -> f64 {
        round_to(self.cm / 100.0, 2)
    }
}

#[derive(Clone, Debug)]
pub struct DistanceEstimator {
    table: ReferenceWidthTable,
    focal_length_px: f64,
}

impl DistanceEstimator {
    pub fn new(table: ReferenceWidthTable, focal_length_px: f64) -> Self {
        Self {
            table,
            focal_length_px,
        }
    }

    pub fn focal_length_px(&self) -> f64 {
        self.focal_length_px
    }

    pub fn table(&self) -> &ReferenceWidthTable {
        &self.table
    }

    /// Estimate the distance to an object of `label` framed by `bbox`.
    ///
    /// `image_height` is the frame height in pixels, used by the proxy.
    pub fn estimate(&self, label: &str, bbox: &BoundingBox, image_height: u32) -> DistanceEstimate {
        if let Some(cm) = self.from_reference_width(label, bbox) {
            return DistanceEstimate {
                cm,
                source: EstimateSource::ReferenceWidth,
            };
        }
        log::debug!("no usable reference width for '{}', using height proxy", label);
        DistanceEstimate {
            cm: height_proxy_cm(bbox, image_height),
            source: EstimateSource::HeightProxy,
        }
    }

    fn from_reference_width(&self, label: &str, bbox: &BoundingBox) -> Option<f64> {
        let width_cm = self.table.get(label)?;
        if !width_cm.is_finite() || width_cm <= 0.0 {
            return None;
        }
        if !self.focal_length_px.is_finite() || self.focal_length_px <= 0.0 {
            return None;
        }
        let cm = round_to(
            width_cm * self.focal_length_px / bbox.clamped_width() as f64,
            1,
        );
        cm.is_finite().then_some(cm)
    }
}

impl Default for DistanceEstimator {
    fn default() -> Self {
        Self::new(ReferenceWidthTable::builtin(), DEFAULT_FOCAL_LENGTH_PX)
    }
}

/// Height-based fallback in centimeters. Finite for any box and frame.
pub fn height_proxy_cm(bbox: &BoundingBox, image_height: u32) -> f64 {
    let ratio = bbox.clamped_height() as f64 / image_height.max(1) as f64;
    let proxy = (1.0 / (ratio + PROXY_HEIGHT_OFFSET)) * PROXY_SCALE;
    round_to(proxy * 100.0, 1)
}

/// Round to `decimals` places, ties to even on the exact binary value.
///
/// `residual` is the exact error of `value * factor`, so a product that only
/// lands on `.5` after rounding is pushed to the side its true value lies on.
pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    let scaled = value * factor;
    let residual = value.mul_add(factor, -scaled);
    let rounded = if (scaled - scaled.trunc()).abs() == 0.5 && residual != 0.0 {
        if residual > 0.0 {
            scaled.ceil()
        } else {
            scaled.floor()
        }
    } else {
        scaled.round_ties_even()
    };
    rounded / factor
}

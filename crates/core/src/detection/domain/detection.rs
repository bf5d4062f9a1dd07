use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::shared::bounding_box::BoundingBox;

/// One face found by the detector in one frame. No identity attached.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(flatten)]
    pub bbox: BoundingBox,
    pub confidence: f64,
}

/// Why a detection was rejected before reaching the motion estimator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MalformedDetection {
    #[error("box has non-finite coordinates: {0:?}")]
    NonFiniteBox([f64; 4]),
    #[error("box has negative size: {width}x{height}")]
    NegativeSize { width: f64, height: f64 },
    #[error("confidence {0} is outside [0, 1]")]
    ConfidenceOutOfRange(f64),
}

impl Detection {
    pub fn new(bbox: BoundingBox, confidence: f64) -> Self {
        Self { bbox, confidence }
    }

    pub fn validate(&self) -> Result<(), MalformedDetection> {
        if !self.bbox.is_finite() {
            return Err(MalformedDetection::NonFiniteBox(self.bbox.as_array()));
        }
        if self.bbox.width < 0.0 || self.bbox.height < 0.0 {
            return Err(MalformedDetection::NegativeSize {
                width: self.bbox.width,
                height: self.bbox.height,
            });
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(MalformedDetection::ConfidenceOutOfRange(self.confidence));
        }
        Ok(())
    }
}

use chrono::{DateTime, Utc};

use crate::shared::bounding_box::BoundingBox;
use crate::shared::face_id::FaceId;
use crate::shared::face_image::FaceImage;

/// One detection routed to an identity, ready to be persisted.
#[derive(Clone, Copy, Debug)]
pub struct Observation<'a> {
    pub face_id: FaceId,
    pub timestamp: DateTime<Utc>,
    pub image: &'a FaceImage,
    pub confidence: f64,
    pub bbox: BoundingBox,
}

/// Lifetime summary of one identity.
#[derive(Clone, Debug, PartialEq)]
pub struct FaceRecord {
    pub face_id: FaceId,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub best_image: FaceImage,
    pub best_confidence: f64,
}

/// One persisted observation. Append-only.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectionRecord {
    pub detection_id: i64,
    pub face_id: FaceId,
    pub timestamp: DateTime<Utc>,
    pub image: FaceImage,
    pub confidence: f64,
    pub bbox: BoundingBox,
}

/// What an update did to the identity's summary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub best_replaced: bool,
}

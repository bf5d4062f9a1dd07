use thiserror::Error;

use crate::detection::domain::detection::MalformedDetection;
use crate::persistence::domain::face_repository::StoreError;
use crate::shared::face_id::FaceId;

/// Everything that can go wrong while tracking a frame sequence.
///
/// Only `StorageFailure`, `DetectionFailure` and `UnknownIdentity` escape
/// a run. Malformed detections are skipped and reported, and a failed
/// frame read ends the run early without an error.
#[derive(Error, Debug)]
pub enum TrackingError {
    #[error("malformed detection: {0}")]
    MalformedDetection(#[from] MalformedDetection),

    #[error("storage failure: {0}")]
    StorageFailure(#[from] StoreError),

    #[error("frame acquisition failed: {0}")]
    AcquisitionFailure(String),

    #[error("face detection failed on frame {frame_index}: {message}")]
    DetectionFailure { frame_index: usize, message: String },

    #[error("face {0} is not a live identity")]
    UnknownIdentity(FaceId),
}

impl TrackingError {
    /// Whether the run must stop with a failure status.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            TrackingError::MalformedDetection(_) | TrackingError::AcquisitionFailure(_)
        )
    }
}
